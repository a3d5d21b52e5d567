//! Reads one or more CTF trace directories from disk, muxes their streams
//! into timestamp order, optionally trims to a begin/end window, and
//! prints the resulting message sequence — a native stand-in for the
//! teacher's `importer.rs`, driving [`babeltrace_core::graph::Graph`]
//! instead of libbabeltrace2 FFI.

use babeltrace_core::clock::ClockClassId;
use babeltrace_core::config::RuntimeConfig;
use babeltrace_core::ctf::metadata;
use babeltrace_core::ctf::msg_iter::MsgIter;
use babeltrace_core::ctf::stream_iter::StreamIter;
use babeltrace_core::error::{Error as CoreError, Result as CoreResult};
use babeltrace_core::graph::component::{ComponentKind, RunStatus, SinkComponent};
use babeltrace_core::graph::port::MessageIterator;
use babeltrace_core::graph::Graph;
use babeltrace_core::medium::file::FileMedium;
use babeltrace_core::message::{Message, StreamId};
use babeltrace_core::muxer::Muxer;
use babeltrace_core::trace_ir::StreamClassId;
use babeltrace_core::tracing::try_init_tracing_subscriber;
use babeltrace_core::trimmer::{parse_bound, Bound, Trimmer};
use babeltrace_core::types::Interruptor;
use babeltrace_core::value::Value;
use clap::Parser;
use std::collections::VecDeque;
use std::error::Error as StdError;
use std::path::PathBuf;
use thiserror::Error;

/// Dump a CTF trace directory in timestamp order
#[derive(Parser, Debug, Clone)]
#[clap(version)]
pub struct Opts {
    /// Path to the layered TOML config file (falls back to
    /// $BABELTRACE_CORE_CONFIG, then built-in defaults)
    #[clap(long, name = "config")]
    pub config: Option<PathBuf>,

    /// Only keep messages at or after this absolute/relative timestamp
    #[clap(long, name = "begin")]
    pub begin: Option<String>,

    /// Only keep messages at or before this absolute/relative timestamp
    #[clap(long, name = "end")]
    pub end: Option<String>,

    /// Interpret naive `begin`/`end` timestamps as GMT rather than local
    #[clap(long)]
    pub gmt: bool,

    /// Trace directories to dump, each containing a `metadata` file plus
    /// one or more CTF data stream files
    #[clap(name = "input", required = true)]
    pub inputs: Vec<PathBuf>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("'{0}' does not contain a metadata file")]
    MissingMetadata(PathBuf),

    #[error("'{0}' contains no CTF data stream files")]
    NoStreamFiles(PathBuf),
}

fn main() {
    match do_main() {
        Ok(()) => (),
        Err(e) => {
            eprintln!("{e}");
            let mut cause = e.source();
            while let Some(err) = cause {
                eprintln!("Caused by: {err}");
                cause = err.source();
            }
            std::process::exit(exitcode::SOFTWARE);
        }
    }
}

/// Adapts a [`Muxer`] to the graph's [`MessageIterator`] capability so a
/// source component's Out port can own it the way the graph expects.
struct MuxerSourceIter {
    muxer: Muxer<StreamIter<FileMedium>>,
}

impl MessageIterator for MuxerSourceIter {
    fn next_message(&mut self) -> CoreResult<Option<Message>> {
        self.muxer.next_message()
    }
}

/// A placeholder the source's Out port holds for the graph's own
/// bookkeeping (naming, type-checking, auto-connect). The real data
/// flow is the muxer [`DumpSink`] owns directly, since `SinkComponent`
/// has no handle back into the graph's port storage.
struct NullSourceIter;

impl MessageIterator for NullSourceIter {
    fn next_message(&mut self) -> CoreResult<Option<Message>> {
        Ok(None)
    }
}

/// A sink that pulls from its own muxed, optionally trimmed source and
/// prints every message it sees. Owning the iterator directly (rather
/// than reaching through the graph's port bookkeeping) matches how the
/// graph's own `CountingSink` test double is written.
struct DumpSink {
    source: MuxerSourceIter,
    trimmer: Option<Trimmer>,
    pending: VecDeque<Message>,
    count: u64,
}

impl DumpSink {
    fn print_message(&mut self, msg: &Message) {
        self.count += 1;
        println!("[{:>6}] stream={} {}", self.count, msg.stream().0, describe(msg));
    }
}

fn describe(msg: &Message) -> String {
    match msg {
        Message::StreamBeginning { stream_class, .. } => {
            format!("stream-beginning (stream-class={})", stream_class.0)
        }
        Message::PacketBeginning { ts, .. } => format!("packet-beginning ts={:?}", ts.map(|t| t.ts_ns)),
        Message::Event { payload, .. } => {
            format!("event class={} ts={:?}", payload.event_class.0, payload.ts.map(|t| t.ts_ns))
        }
        Message::DiscardedEvents { count, .. } => format!("discarded-events count={count:?}"),
        Message::DiscardedPackets { count, .. } => format!("discarded-packets count={count:?}"),
        Message::MsgIteratorInactivity { ts, .. } => format!("inactivity ts={}", ts.ts_ns),
        Message::PacketEnd { ts, .. } => format!("packet-end ts={:?}", ts.map(|t| t.ts_ns)),
        Message::StreamEnd { .. } => "stream-end".to_string(),
    }
}

impl SinkComponent for DumpSink {
    fn consume(&mut self) -> CoreResult<RunStatus> {
        if let Some(msg) = self.pending.pop_front() {
            self.print_message(&msg);
            return Ok(RunStatus::Ok);
        }

        match self.source.next_message() {
            Ok(Some(msg)) => {
                let mut out = match self.trimmer.as_mut() {
                    Some(t) => t.process(msg).into_iter(),
                    None => vec![msg].into_iter(),
                };
                match out.next() {
                    Some(first) => {
                        self.pending.extend(out);
                        self.print_message(&first);
                        Ok(RunStatus::Ok)
                    }
                    None => Ok(RunStatus::Again),
                }
            }
            Ok(None) => {
                if let Some(t) = self.trimmer.as_mut() {
                    self.pending.extend(t.finalize());
                }
                match self.pending.pop_front() {
                    Some(msg) => {
                        self.print_message(&msg);
                        Ok(RunStatus::Ok)
                    }
                    None => Ok(RunStatus::End),
                }
            }
            Err(CoreError::Again) => Ok(RunStatus::Again),
            Err(e) => Err(e),
        }
    }
}

fn do_main() -> Result<(), Box<dyn StdError>> {
    let opts = Opts::parse();

    try_init_tracing_subscriber()?;

    let intr = Interruptor::new();
    let interruptor = intr.clone();
    ctrlc::set_handler(move || {
        if intr.is_set() {
            std::process::exit(130);
        } else {
            intr.set();
        }
    })?;

    let cfg = RuntimeConfig::load(opts.config.as_deref())?;

    let mut all_stream_iters = Vec::new();
    for input in &opts.inputs {
        let metadata_path = input.join("metadata");
        if !metadata_path.exists() {
            return Err(Error::MissingMetadata(input.clone()).into());
        }
        let metadata_src = std::fs::read_to_string(&metadata_path)?;
        let trace = metadata::parse(&metadata_src)?;

        let mut data_files: Vec<PathBuf> = std::fs::read_dir(input)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.file_name().and_then(|n| n.to_str()) != Some("metadata"))
            .filter(|p| p.is_file())
            .collect();
        data_files.sort();
        if data_files.is_empty() {
            return Err(Error::NoStreamFiles(input.clone()).into());
        }

        for (idx, path) in data_files.into_iter().enumerate() {
            let medium = FileMedium::open_with_window([&path], cfg.mmap_window_packets)?;
            let stream_id = StreamId(all_stream_iters.len() as u64);
            let stream_class_id = StreamClassId(0);
            let msg_iter = MsgIter::new(medium, trace.clone(), stream_id, stream_class_id);
            all_stream_iters.push(StreamIter::new(msg_iter, stream_class_id, None));
            tracing::debug!(stream = idx, path = %path.display(), "opened CTF stream file");
        }
    }

    let muxer = Muxer::new(all_stream_iters);

    let trimmer = if opts.begin.is_some() || opts.end.is_some() {
        let begin_ns = opts
            .begin
            .as_deref()
            .map(|s| resolve_bound(s, opts.gmt))
            .transpose()?;
        let end_ns = opts
            .end
            .as_deref()
            .map(|s| resolve_bound(s, opts.gmt))
            .transpose()?;
        Some(Trimmer::new(begin_ns, end_ns, ClockClassId(0))?)
    } else {
        None
    };

    let mut graph = Graph::new();
    graph.add_interrupter(interruptor.clone());

    let source = graph.add_component(
        ComponentKind::Source,
        "ctf.fs",
        "source",
        cfg.log_level,
        Value::null(),
    )?;
    let sink = graph.add_component(ComponentKind::Sink, "dump", "sink", cfg.log_level, Value::null())?;

    let out_port = graph.add_out_port(source, "out", Box::new(NullSourceIter))?;
    let in_port = graph.add_in_port(sink, "in")?;
    graph.connect(out_port, in_port)?;

    graph.set_sink(
        sink,
        Box::new(DumpSink {
            source: MuxerSourceIter { muxer },
            trimmer,
            pending: VecDeque::new(),
            count: 0,
        }),
    )?;

    loop {
        if interruptor.is_set() {
            break;
        }
        match graph.run()? {
            RunStatus::Ok | RunStatus::Again => continue,
            RunStatus::End => break,
        }
    }

    Ok(())
}

fn resolve_bound(s: &str, gmt: bool) -> Result<i64, Box<dyn StdError>> {
    match parse_bound(s, gmt)? {
        Bound::AbsoluteNs(ns) => Ok(ns),
        Bound::RelativeSeconds(secs) => Ok((secs * 1_000_000_000.0) as i64),
    }
}
