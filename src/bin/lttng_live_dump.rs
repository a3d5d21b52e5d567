//! Connects to an LTTng relay daemon's viewer port, attaches to every
//! matching session, and dumps the packet index/payload stream — a
//! native stand-in for the teacher's `lttng_live_collector.rs`, driving
//! [`babeltrace_core::live`] directly instead of libbabeltrace2 FFI.

use babeltrace_core::config::RuntimeConfig;
use babeltrace_core::live::session_manager::{MetadataStreamState, SessionManager, Trace};
use babeltrace_core::live::viewer_client::ViewerClient;
use babeltrace_core::live::wire::{self, IndexStatus, MetadataStatus};
use babeltrace_core::tracing::try_init_tracing_subscriber;
use babeltrace_core::types::{Interruptor, RetryDurationUs, SessionNotFoundAction};
use clap::Parser;
use socket2::{Domain, SockAddr, Socket, Type};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::net::{self, ToSocketAddrs};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const RELAYD_QUICK_PING_CONNECT_TIMEOUT: Duration = Duration::from_millis(100);

/// Dump an LTTng-live trace pulled from a relay daemon
#[derive(Parser, Debug, Clone)]
#[clap(version)]
pub struct Opts {
    /// Path to the layered TOML config file (falls back to
    /// $BABELTRACE_CORE_CONFIG, then built-in defaults)
    #[clap(long, name = "config")]
    pub config: Option<PathBuf>,

    /// When the relay can't serve a packet yet, retry after this many
    /// microseconds (default: 100000)
    #[clap(long, name = "duration-us")]
    pub retry_duration_us: Option<RetryDurationUs>,

    /// What to do when no session matches the requested target:
    /// continue (default), fail, or end
    #[clap(long, name = "action")]
    pub session_not_found_action: Option<SessionNotFoundAction>,

    /// Format: net\[4\]://RDHOST\[:RDPORT\]/host/TGTHOST/SESSION
    #[clap(verbatim_doc_comment, name = "url")]
    pub url: Url,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("url '{0}' has no host component")]
    MissingHost(Url),

    #[error("the relay reported status {0} for viewer stream {1}")]
    BadIndexStatus(u32, u64),
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

/// `/host/TGTHOST/SESSION` path segments, resolved into an optional
/// target hostname/session-name filter (absent segments match anything).
fn parse_target(url: &Url) -> (Option<String>, Option<String>) {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    match segments.as_slice() {
        ["host", host, session] => (Some((*host).to_string()), Some((*session).to_string())),
        ["host", host] => (Some((*host).to_string()), None),
        _ => (None, None),
    }
}

fn matches_target(entry: &wire::SessionListEntry, target_host: &Option<String>, target_session: &Option<String>) -> bool {
    target_host.as_deref().map(|h| h == entry.hostname).unwrap_or(true)
        && target_session.as_deref().map(|s| s == entry.session_name).unwrap_or(true)
}

/// A short, fire-and-forget TCP connect used only to give the user a
/// better diagnostic than the relay's own silence when unreachable
/// (same reasoning the teacher binary's quick-ping loop applies before
/// handing off to the real blocking connection).
fn relay_is_reachable(host: &str, port: u16) -> bool {
    let Ok(mut addrs) = (host, port).to_socket_addrs() else {
        return false;
    };
    let Some(addr) = addrs.next() else {
        return false;
    };
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let Ok(sock) = Socket::new(domain, Type::STREAM, None) else {
        return false;
    };
    let connected = sock
        .connect_timeout(&SockAddr::from(addr), RELAYD_QUICK_PING_CONNECT_TIMEOUT)
        .is_ok();
    let _ = sock.shutdown(net::Shutdown::Both);
    connected
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
    let session_not_found_action = opts.session_not_found_action.unwrap_or(cfg.session_not_found_action);
    let retry_duration_us = opts.retry_duration_us.unwrap_or(cfg.retry_duration_us);
    let retry_duration = Duration::from(retry_duration_us);

    let host = opts.url.host_str().ok_or_else(|| Error::MissingHost(opts.url.clone()))?.to_string();
    let port = opts.url.port().unwrap_or(wire::DEFAULT_NETWORK_VIEWER_PORT);
    let (target_host, target_session) = parse_target(&opts.url);

    'ping: loop {
        if interruptor.is_set() {
            return Ok(());
        }
        if relay_is_reachable(&host, port) {
            break 'ping;
        }
        warn!("Failed to connect to '{}:{}', the relay may not be reachable", host, port);
        if session_not_found_action != SessionNotFoundAction::Continue {
            break 'ping;
        }
        thread::sleep(retry_duration);
    }

    let mut client = ViewerClient::connect(&host, port, Duration::from_secs(5))?;
    debug!(minor = client.negotiated_minor(), "completed viewer handshake");

    let mut mgr = SessionManager::new(session_not_found_action);
    // viewer_stream_id -> owning session, for every non-metadata stream
    // `get_new_streams` reported; polled for index/packet below.
    let mut data_streams: HashMap<u64, Vec<u64>> = HashMap::new();
    // (session_id, ctf_trace_id) -> metadata viewer_stream_id, polled via
    // `get_metadata` until the relay reports no new metadata left.
    let mut metadata_streams: Vec<(u64, u64, u64)> = Vec::new();

    'discover: loop {
        if interruptor.is_set() {
            return Ok(());
        }
        let sessions = client.list_sessions()?;
        let matches: Vec<_> = sessions
            .into_iter()
            .filter(|s| matches_target(s, &target_host, &target_session))
            .collect();

        if matches.is_empty() {
            if !mgr.on_zero_sessions_found()? {
                return Ok(());
            }
            thread::sleep(retry_duration);
            continue 'discover;
        }

        for entry in matches {
            let attach = client.attach_session(entry.id)?;
            let session = mgr.add_session(entry.id, entry.hostname.clone(), entry.session_name.clone());
            session.attached = true;
            debug!(
                session = entry.id,
                streams = attach.stream_count,
                "attached to live session"
            );

            let new_streams = client.get_new_streams(entry.id)?;
            let mut ids = Vec::new();
            for s in new_streams.streams {
                if s.metadata_flag {
                    session.traces.entry(s.ctf_trace_id).or_insert_with(|| Trace::new(s.ctf_trace_id));
                    metadata_streams.push((entry.id, s.ctf_trace_id, s.id));
                } else {
                    session
                        .traces
                        .entry(s.ctf_trace_id)
                        .or_insert_with(|| Trace::new(s.ctf_trace_id))
                        .stream_iterator_ids
                        .push(s.id);
                    ids.push(s.id);
                }
            }
            data_streams.insert(entry.id, ids);
        }
        break 'discover;
    }

    'poll: loop {
        if interruptor.is_set() {
            break 'poll;
        }

        for &(session_id, ctf_trace_id, metadata_stream_id) in metadata_streams.iter() {
            if interruptor.is_set() {
                break 'poll;
            }
            let Some(session) = mgr.session_mut(session_id) else { continue };
            let Some(trace) = session.traces.get_mut(&ctf_trace_id) else { continue };
            if trace.metadata_stream_state != MetadataStreamState::Needed {
                continue;
            }
            let rep = client.get_metadata(metadata_stream_id)?;
            match rep.status {
                MetadataStatus::Ok => {
                    trace.metadata_accumulated.extend_from_slice(&rep.data);
                    debug!(session = session_id, trace = ctf_trace_id, bytes = rep.data.len(), "accumulated metadata packet");
                }
                MetadataStatus::NoNew => trace.metadata_stream_state = MetadataStreamState::NotNeeded,
                MetadataStatus::Err | MetadataStatus::Unknown(_) => trace.metadata_stream_state = MetadataStreamState::Closed,
            }
        }

        let mut any_active = false;
        for (&session_id, stream_ids) in data_streams.iter() {
            let closed = mgr.session_mut(session_id).map(|s| s.closed).unwrap_or(true);
            if closed {
                continue;
            }
            any_active = true;

            for &viewer_stream_id in stream_ids.iter() {
                if interruptor.is_set() {
                    break 'poll;
                }
                let idx = client.get_next_index(viewer_stream_id)?;
                match idx.status {
                    IndexStatus::Ok => {
                        println!(
                            "session={session_id} stream={viewer_stream_id} packet offset={} size={} ts=[{},{}] discarded={}",
                            idx.offset, idx.packet_size, idx.timestamp_begin, idx.timestamp_end, idx.events_discarded
                        );
                        let packet = client.get_packet(viewer_stream_id, idx.offset, idx.packet_size as u32)?;
                        debug!(bytes = packet.data.len(), "fetched packet payload");
                    }
                    IndexStatus::Retry | IndexStatus::Inactive => {}
                    IndexStatus::Hup => {
                        if let Some(session) = mgr.session_mut(session_id) {
                            session.closed = true;
                        }
                    }
                    IndexStatus::Err => return Err(Error::BadIndexStatus(4, viewer_stream_id).into()),
                    IndexStatus::Unknown(v) => return Err(Error::BadIndexStatus(v, viewer_stream_id).into()),
                }
            }
        }

        let metadata_pending = metadata_streams.iter().any(|&(sid, tid, _)| {
            mgr.session_mut(sid)
                .and_then(|s| s.traces.get(&tid))
                .map(|t| t.metadata_stream_state == MetadataStreamState::Needed)
                .unwrap_or(false)
        });

        if (!any_active && !metadata_pending) || mgr.all_closed() {
            break 'poll;
        }
        thread::sleep(retry_duration);
    }

    let attached_sessions: Vec<u64> = mgr.sessions().filter(|s| s.attached && !s.closed).map(|s| s.id).collect();
    for session_id in attached_sessions {
        match client.detach_session(session_id) {
            Ok(_) => debug!(session = session_id, "detached live session"),
            Err(e) => warn!("failed to detach session {}: {}", session_id, e),
        }
    }

    Ok(())
}
