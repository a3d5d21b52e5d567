//! Packet index entries and the `.idx` binary format (§3, §4.E).
//!
//! Layout (all fields big-endian, matching the on-disk format the
//! upstream LTTng/Babeltrace tooling produces): a fixed 56-byte header
//! (`magic: u32, version_major: u32, version_minor: u32,
//! index_entry_size: u32, content_size: u64` padded to 56 bytes) followed
//! by a run of fixed-stride entries.

use crate::error::ErrorKind;

pub const MAGIC: u32 = 0xC1F1_DCC1;
pub const HEADER_LEN: usize = 56;
pub const MIN_ENTRY_LEN: usize = 56;
const SUPPORTED_VERSION_MAJOR: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic number {found:#010x}, expected {MAGIC:#010x}")]
    BadMagic { found: u32 },

    #[error("unsupported index version {major}.{minor}")]
    UnsupportedVersion { major: u32, minor: u32 },

    #[error("index entry stride {0} is smaller than the minimum {MIN_ENTRY_LEN}")]
    EntryTooSmall(usize),

    #[error("truncated index: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("index entry {index} offset {offset} is not monotonically increasing from the previous entry's end")]
    OffsetNotMonotonic { index: usize, offset: u64 },

    #[error("index entry {index} has ts_end ({ts_end}) < ts_begin ({ts_begin})")]
    TsEndBeforeTsBegin {
        index: usize,
        ts_begin: u64,
        ts_end: u64,
    },

    #[error("index entry {index} packet_size {packet_size} is not a multiple of 8 bits")]
    PacketSizeNotByteAligned { index: usize, packet_size: u64 },

    #[error(
        "index entries' total packet size ({total_bytes} bytes) does not match the stream file size ({file_size} bytes)"
    )]
    SizeMismatch { total_bytes: u64, file_size: u64 },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::BadMagic { .. }
            | Error::UnsupportedVersion { .. }
            | Error::EntryTooSmall(_)
            | Error::Truncated { .. }
            | Error::OffsetNotMonotonic { .. }
            | Error::TsEndBeforeTsBegin { .. }
            | Error::PacketSizeNotByteAligned { .. }
            | Error::SizeMismatch { .. } => ErrorKind::DecodeMalformed,
        }
    }
}

/// One data-stream packet index entry (§3). `packet_size`/`content_size`
/// are in bits, per the on-disk format; `offset` and sizes are validated
/// to be mutually consistent by [`parse`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PacketIndexEntry {
    pub offset: u64,
    pub packet_size: u64,
    pub content_size: u64,
    pub ts_begin_cycles: u64,
    pub ts_end_cycles: u64,
    pub ts_begin_ns: i64,
    pub ts_end_ns: i64,
    pub packet_seq_num: Option<u64>,
    pub events_discarded: Option<u64>,
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn u32(&mut self) -> Result<u32, Error> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, Error> {
        let bytes = self.take(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
    }

    fn i64(&mut self) -> Result<i64, Error> {
        Ok(self.u64()? as i64)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.pos + n > self.buf.len() {
            return Err(Error::Truncated {
                expected: self.pos + n,
                found: self.buf.len(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> Result<(), Error> {
        self.take(n).map(|_| ())
    }
}

/// Parses and validates a complete `.idx` file, per the rules in §4.E
/// point 1: offset-monotonic entries, `ts_end ≥ ts_begin`, `packet_size`
/// a multiple of 8, and the sum of `packet_size/8` across entries equal
/// to `stream_file_size`.
pub fn parse(bytes: &[u8], stream_file_size: u64) -> Result<Vec<PacketIndexEntry>, Error> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::Truncated {
            expected: HEADER_LEN,
            found: bytes.len(),
        });
    }
    let mut r = Reader::new(bytes);
    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(Error::BadMagic { found: magic });
    }
    let version_major = r.u32()?;
    let version_minor = r.u32()?;
    if version_major != SUPPORTED_VERSION_MAJOR {
        return Err(Error::UnsupportedVersion {
            major: version_major,
            minor: version_minor,
        });
    }
    let entry_len = r.u32()? as usize;
    if entry_len < MIN_ENTRY_LEN {
        return Err(Error::EntryTooSmall(entry_len));
    }
    // content_size field + reserved padding out to HEADER_LEN.
    let _content_size = r.u64()?;
    r.skip(HEADER_LEN - r.pos)?;

    let remaining = bytes.len() - HEADER_LEN;
    if remaining % entry_len != 0 {
        return Err(Error::Truncated {
            expected: (remaining / entry_len + 1) * entry_len + HEADER_LEN,
            found: bytes.len(),
        });
    }
    let count = remaining / entry_len;

    let mut entries = Vec::with_capacity(count);
    let mut expected_offset = 0u64;
    let mut total_bits = 0u64;

    for i in 0..count {
        let entry_start = HEADER_LEN + i * entry_len;
        let mut er = Reader::new(&bytes[entry_start..entry_start + entry_len]);
        let offset_bits = er.u64()?;
        let packet_size = er.u64()?;
        let content_size = er.u64()?;
        let ts_begin_cycles = er.u64()?;
        let ts_end_cycles = er.u64()?;
        let events_discarded = er.u64()?;

        let offset = offset_bits / 8;
        if offset != expected_offset {
            return Err(Error::OffsetNotMonotonic { index: i, offset });
        }
        if packet_size % 8 != 0 {
            return Err(Error::PacketSizeNotByteAligned { index: i, packet_size });
        }
        if ts_end_cycles < ts_begin_cycles {
            return Err(Error::TsEndBeforeTsBegin {
                index: i,
                ts_begin: ts_begin_cycles,
                ts_end: ts_end_cycles,
            });
        }

        total_bits += packet_size;
        expected_offset = offset + packet_size / 8;

        entries.push(PacketIndexEntry {
            offset,
            packet_size,
            content_size,
            ts_begin_cycles,
            ts_end_cycles,
            ts_begin_ns: 0,
            ts_end_ns: 0,
            packet_seq_num: Some(i as u64),
            events_discarded: Some(events_discarded),
        });
    }

    let total_bytes = total_bits / 8;
    if total_bytes != stream_file_size {
        return Err(Error::SizeMismatch {
            total_bytes,
            file_size: stream_file_size,
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_index(entries: &[(u64, u64, u64, u64, u64, u64)]) -> Vec<u8> {
        let entry_len = MIN_ENTRY_LEN as u32;
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&entry_len.to_be_bytes());
        buf.extend_from_slice(&0u64.to_be_bytes());
        buf.resize(HEADER_LEN, 0);
        for &(offset_bits, packet_size, content_size, ts_begin, ts_end, discarded) in entries {
            let start = buf.len();
            buf.extend_from_slice(&offset_bits.to_be_bytes());
            buf.extend_from_slice(&packet_size.to_be_bytes());
            buf.extend_from_slice(&content_size.to_be_bytes());
            buf.extend_from_slice(&ts_begin.to_be_bytes());
            buf.extend_from_slice(&ts_end.to_be_bytes());
            buf.extend_from_slice(&discarded.to_be_bytes());
            buf.resize(start + MIN_ENTRY_LEN, 0);
        }
        buf
    }

    #[test]
    fn parses_valid_index() {
        let bytes = build_index(&[(0, 4096 * 8, 4000 * 8, 0, 100, 0), (4096 * 8, 4096 * 8, 4096 * 8, 100, 200, 2)]);
        let entries = parse(&bytes, 8192).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].offset, 4096);
        assert_eq!(entries[1].events_discarded, Some(2));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = build_index(&[(0, 8, 8, 0, 1, 0)]);
        bytes[0] = 0;
        assert!(matches!(parse(&bytes, 1), Err(Error::BadMagic { .. })));
    }

    #[test]
    fn rejects_offset_gap() {
        let bytes = build_index(&[(0, 4096 * 8, 4096 * 8, 0, 1, 0), (8192 * 8, 4096 * 8, 4096 * 8, 1, 2, 0)]);
        assert!(matches!(
            parse(&bytes, 12288),
            Err(Error::OffsetNotMonotonic { .. })
        ));
    }

    #[test]
    fn rejects_ts_end_before_ts_begin() {
        let bytes = build_index(&[(0, 4096 * 8, 4096 * 8, 100, 50, 0)]);
        assert!(matches!(
            parse(&bytes, 4096),
            Err(Error::TsEndBeforeTsBegin { .. })
        ));
    }

    #[test]
    fn rejects_size_mismatch() {
        let bytes = build_index(&[(0, 4096 * 8, 4096 * 8, 0, 1, 0)]);
        assert!(matches!(parse(&bytes, 9999), Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn rejects_non_byte_aligned_packet_size() {
        let bytes = build_index(&[(0, 4095, 4095, 0, 1, 0)]);
        assert!(matches!(
            parse(&bytes, 0),
            Err(Error::PacketSizeNotByteAligned { .. })
        ));
    }
}
