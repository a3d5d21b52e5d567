//! Medium over a memory-mapped CTF stream file group (§4.E).

use super::{Error, Medium, Status, StreamHandle};
use crate::trace_ir::StreamClassId;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::{Path, PathBuf};

const DEFAULT_WINDOW_PACKETS: u64 = 2048;

struct MappedFile {
    path: PathBuf,
    file: File,
    size: u64,
    mmap: Option<Mmap>,
    window_start: u64,
}

impl MappedFile {
    fn open(path: PathBuf) -> Result<Self, Error> {
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        Ok(MappedFile {
            path,
            file,
            size,
            mmap: None,
            window_start: 0,
        })
    }

    /// Remaps so the window covers `offset`, floored to `alignment`
    /// (§4.E: "remapping picks the alignment-floor of the requested
    /// offset"). Drops the previous mapping before creating the new one.
    fn ensure_window(&mut self, offset: u64, alignment: u64, window_bytes: u64) -> Result<(), Error> {
        let needs_remap = match &self.mmap {
            Some(m) => offset < self.window_start || offset >= self.window_start + m.len() as u64,
            None => true,
        };
        if !needs_remap {
            return Ok(());
        }
        self.mmap = None;
        let floor = (offset / alignment) * alignment;
        let remaining = self.size.saturating_sub(floor);
        let len = remaining.min(window_bytes).max(1) as usize;
        let mmap = unsafe { MmapOptions::new().offset(floor).len(len).map(&self.file)? };
        self.mmap = Some(mmap);
        self.window_start = floor;
        Ok(())
    }

    fn slice_from(&self, offset: u64, max: usize) -> &[u8] {
        let mmap = self.mmap.as_ref().expect("ensure_window called first");
        let local = (offset - self.window_start) as usize;
        let end = (local + max).min(mmap.len());
        &mmap[local..end]
    }
}

/// Wraps an ordered group of stream files belonging to the same logical
/// CTF data stream (single file in the common case, multiple when LTTng
/// rotates files). Invariants from §4.E: the current mapping always
/// contains the current read offset; EOF when `offset == size` and no
/// next file exists.
pub struct FileMedium {
    files: Vec<MappedFile>,
    current: usize,
    offset: u64,
    alignment: u64,
    window_packets: u64,
    bound: Option<StreamHandle>,
    buf_start: u64,
    buf_len: usize,
}

impl FileMedium {
    pub fn open(paths: impl IntoIterator<Item = impl AsRef<Path>>) -> Result<Self, Error> {
        Self::open_with_window(paths, DEFAULT_WINDOW_PACKETS)
    }

    pub fn open_with_window(
        paths: impl IntoIterator<Item = impl AsRef<Path>>,
        window_packets: u64,
    ) -> Result<Self, Error> {
        let files = paths
            .into_iter()
            .map(|p| MappedFile::open(p.as_ref().to_path_buf()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FileMedium {
            files,
            current: 0,
            offset: 0,
            alignment: page_alignment(),
            window_packets,
            bound: None,
            buf_start: 0,
            buf_len: 0,
        })
    }

    pub fn current_path(&self) -> &Path {
        &self.files[self.current].path
    }

    pub fn current_file_size(&self) -> u64 {
        self.files[self.current].size
    }

    fn window_bytes(&self) -> u64 {
        self.window_packets * self.alignment
    }

    fn at_eof_of_group(&self) -> bool {
        let cur = &self.files[self.current];
        self.offset >= cur.size && self.current + 1 >= self.files.len()
    }
}

fn page_alignment() -> u64 {
    4096
}

impl Medium for FileMedium {
    fn request_bytes(&mut self, max: usize) -> Result<Status, Error> {
        loop {
            let cur = &self.files[self.current];
            if self.offset >= cur.size {
                if self.current + 1 < self.files.len() {
                    self.current += 1;
                    self.offset = 0;
                    continue;
                }
                self.buf_len = 0;
                return Ok(Status::Eof);
            }
            let window_bytes = self.window_bytes();
            let alignment = self.alignment;
            let offset = self.offset;
            let file = &mut self.files[self.current];
            file.ensure_window(offset, alignment, window_bytes)?;
            let slice = file.slice_from(offset, max);
            self.buf_start = offset;
            self.buf_len = slice.len();
            self.offset += slice.len() as u64;
            return Ok(Status::Ok);
        }
    }

    fn buffer(&self) -> &[u8] {
        self.files[self.current].slice_from(self.buf_start, self.buf_len)
    }

    fn seek(&mut self, absolute_offset: u64) -> Result<Status, Error> {
        let mut remaining = absolute_offset;
        for (idx, f) in self.files.iter().enumerate() {
            if remaining <= f.size {
                self.current = idx;
                self.offset = remaining;
                self.buf_len = 0;
                return Ok(Status::Ok);
            }
            remaining -= f.size;
        }
        Err(Error::SeekOutOfRange(absolute_offset))
    }

    fn switch_packet(&mut self) -> Result<Status, Error> {
        if self.at_eof_of_group() {
            return Ok(Status::Eof);
        }
        if self.offset >= self.files[self.current].size && self.current + 1 < self.files.len() {
            self.current += 1;
            self.offset = 0;
        }
        Ok(Status::Ok)
    }

    fn borrow_stream(
        &mut self,
        stream_class: StreamClassId,
        stream_id: u64,
    ) -> Result<StreamHandle, Error> {
        match &self.bound {
            Some(h) if h.stream_class != stream_class => {
                Err(Error::StreamClassMismatch {
                    bound: h.stream_class,
                    requested: stream_class,
                })
            }
            Some(h) => Ok(*h),
            None => {
                let h = StreamHandle {
                    stream_class,
                    stream_id,
                };
                self.bound = Some(h);
                Ok(h)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(bytes: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn reads_across_full_file() {
        let data = vec![0xABu8; 10_000];
        let f = file_with(&data);
        let mut medium = FileMedium::open([f.path()]).unwrap();
        let mut total = 0;
        loop {
            match medium.request_bytes(4096).unwrap() {
                Status::Ok => total += medium.buffer().len(),
                Status::Eof => break,
                Status::Again => unreachable!(),
            }
        }
        assert_eq!(total, data.len());
    }

    #[test]
    fn eof_on_empty_remaining() {
        let f = file_with(&[1, 2, 3]);
        let mut medium = FileMedium::open([f.path()]).unwrap();
        medium.request_bytes(3).unwrap();
        assert_eq!(medium.request_bytes(3).unwrap(), Status::Eof);
    }

    #[test]
    fn seek_then_read() {
        let data: Vec<u8> = (0..=255u8).collect();
        let f = file_with(&data);
        let mut medium = FileMedium::open([f.path()]).unwrap();
        medium.seek(10).unwrap();
        medium.request_bytes(5).unwrap();
        assert_eq!(medium.buffer(), &data[10..15]);
    }

    #[test]
    fn borrow_stream_rejects_mismatched_class() {
        let f = file_with(&[0; 16]);
        let mut medium = FileMedium::open([f.path()]).unwrap();
        medium.borrow_stream(StreamClassId(0), 1).unwrap();
        assert!(matches!(
            medium.borrow_stream(StreamClassId(1), 1),
            Err(Error::StreamClassMismatch { .. })
        ));
    }

    #[test]
    fn advances_across_multiple_files_in_group() {
        let a = file_with(&[1, 2, 3]);
        let b = file_with(&[4, 5]);
        let mut medium = FileMedium::open([a.path(), b.path()]).unwrap();
        medium.request_bytes(3).unwrap();
        assert_eq!(medium.buffer(), &[1, 2, 3]);
        medium.request_bytes(2).unwrap();
        assert_eq!(medium.buffer(), &[4, 5]);
        assert_eq!(medium.request_bytes(1).unwrap(), Status::Eof);
    }
}
