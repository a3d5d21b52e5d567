//! Blocking TCP client for the LTTng-live viewer protocol, grounded on
//! `viewer-connection.c`'s connect-then-handshake sequence and the
//! teacher binary's quick-ping-before-connect pattern.

use crate::error::{Error as TopError, Result as TopResult};
use crate::live::wire::{
    self, AttachReply, DetachSessionStatus, IndexReply, MetadataReply, NewStreamsReply, PacketReply, SessionListEntry,
};
use socket2::{Domain, SockAddr, Socket, Type};
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

fn io_err(msg: impl Into<String>) -> TopError {
    TopError::Wire(wire::Error::Io(io::Error::new(io::ErrorKind::Other, msg.into())))
}

pub struct ViewerClient {
    stream: TcpStream,
    negotiated_minor: u32,
}

impl ViewerClient {
    /// Connects to `host:port` with a short ping timeout (matching the
    /// demonstration binary's quick-reachability check) before falling
    /// through to a real blocking `TcpStream`, then performs the viewer
    /// handshake.
    pub fn connect(host: &str, port: u16, connect_timeout: Duration) -> TopResult<Self> {
        let addr = format!("{host}:{port}")
            .to_socket_addrs()
            .map_err(|e| io_err(format!("resolving '{host}': {e}")))?
            .next()
            .ok_or_else(|| io_err(format!("no address found for '{host}'")))?;

        let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let sock = Socket::new(domain, Type::STREAM, None).map_err(|e| io_err(e.to_string()))?;
        sock.connect_timeout(&SockAddr::from(addr), connect_timeout)
            .map_err(|e| io_err(format!("connecting to {addr}: {e}")))?;
        let stream: TcpStream = sock.into();
        stream.set_nodelay(true).ok();

        let mut client = ViewerClient {
            stream,
            negotiated_minor: wire::LTTNG_LIVE_MINOR,
        };
        let reply = wire::handshake(&mut client.stream, wire::LTTNG_LIVE_MINOR).map_err(TopError::Wire)?;
        client.negotiated_minor = reply.minor;
        let created = wire::create_session(&mut client.stream).map_err(TopError::Wire)?;
        if !created.ok {
            return Err(TopError::Wire(wire::Error::CreateSessionFailed));
        }
        Ok(client)
    }

    pub fn negotiated_minor(&self) -> u32 {
        self.negotiated_minor
    }

    pub fn list_sessions(&mut self) -> TopResult<Vec<SessionListEntry>> {
        wire::list_sessions(&mut self.stream).map_err(TopError::Wire)
    }

    pub fn attach_session(&mut self, session_id: u64) -> TopResult<AttachReply> {
        wire::attach_session(&mut self.stream, session_id).map_err(TopError::Wire)
    }

    pub fn get_next_index(&mut self, viewer_stream_id: u64) -> TopResult<IndexReply> {
        wire::get_next_index(&mut self.stream, viewer_stream_id).map_err(TopError::Wire)
    }

    pub fn get_packet(&mut self, viewer_stream_id: u64, offset: u64, len: u32) -> TopResult<PacketReply> {
        wire::get_packet(&mut self.stream, viewer_stream_id, offset, len).map_err(TopError::Wire)
    }

    pub fn get_metadata(&mut self, metadata_stream_id: u64) -> TopResult<MetadataReply> {
        wire::get_metadata(&mut self.stream, metadata_stream_id).map_err(TopError::Wire)
    }

    pub fn get_new_streams(&mut self, session_id: u64) -> TopResult<NewStreamsReply> {
        wire::get_new_streams(&mut self.stream, session_id).map_err(TopError::Wire)
    }

    pub fn detach_session(&mut self, session_id: u64) -> TopResult<DetachSessionStatus> {
        wire::detach_session(&mut self.stream, session_id).map_err(TopError::Wire)
    }
}
