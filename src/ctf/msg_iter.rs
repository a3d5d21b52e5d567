//! The CTF packet message iterator (§4.G): decodes packets pulled from a
//! [`Medium`] into [`Message`]s against a [`Trace`]'s field types.

use crate::error::{Error as TopError, ErrorKind, Result as TopResult};
use crate::field_type::{ByteOrder, FieldTypeId, Kind as FtKind};
use crate::medium::Medium;
use crate::message::{ClockSnapshot, EventPayload, Message, StreamId};
use crate::trace_ir::{EventClassId, StreamClassId, Trace};
use crate::value::{Value, ValueMap};
use bitvec::prelude::*;
use std::collections::VecDeque;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid CTF packet or event header: {0}")]
    Decode(String),

    #[error("event id {0} has no matching event class in stream class {1:?}")]
    UnknownEventId(u64, StreamClassId),

    #[error("variant tag value has no matching mapping in its tag enum")]
    UnmatchedVariantTag,

    #[error("string field is not NUL-terminated within the decoded region")]
    UnterminatedString,

    #[error("ran out of bits decoding a field at bit offset {0}")]
    Truncated(usize),

    #[error("field type shape is not supported for decode: {0}")]
    Unsupported(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Decode(_)
            | Error::UnknownEventId(_, _)
            | Error::UnmatchedVariantTag
            | Error::UnterminatedString
            | Error::Truncated(_) => ErrorKind::DecodeMalformed,
            Error::Unsupported(_) => ErrorKind::Unsupported,
        }
    }
}

/// Snapshot published once a packet's header and context have been
/// decoded (§4.G).
#[derive(Clone, Debug, Default)]
pub struct PacketProperties {
    pub total_size_bits: u64,
    pub content_size_bits: u64,
    pub stream_class_id: StreamClassId,
    pub data_stream_id: Option<u64>,
    pub discarded_events: Option<u64>,
    pub packets: Option<u64>,
    pub beginning_clock: Option<ClockSnapshot>,
    pub end_clock: Option<ClockSnapshot>,
}

type BitSlice8 = bitvec::slice::BitSlice<u8, Msb0>;

struct BitCursor<'a> {
    bits: &'a BitSlice8,
    pos: usize,
}

impl<'a> BitCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        BitCursor {
            bits: BitSlice8::from_slice(bytes),
            pos: 0,
        }
    }

    fn remaining_bits(&self) -> usize {
        self.bits.len().saturating_sub(self.pos)
    }

    fn align_to(&mut self, alignment_bits: u32) {
        let a = alignment_bits as usize;
        if a > 1 {
            let rem = self.pos % a;
            if rem != 0 {
                self.pos += a - rem;
            }
        }
    }

    /// Reads `width` (1..=64) bits MSB-first starting at the current
    /// position as an unsigned value, then advances.
    fn read_bits_u64(&mut self, width: u8) -> Result<u64, Error> {
        if width == 0 || width > 64 {
            return Err(Error::Unsupported(format!("integer width {width}")));
        }
        if self.remaining_bits() < width as usize {
            return Err(Error::Truncated(self.pos));
        }
        let slice = &self.bits[self.pos..self.pos + width as usize];
        let value: u64 = slice.load_be();
        self.pos += width as usize;
        Ok(value)
    }

    fn read_bits_i64(&mut self, width: u8) -> Result<i64, Error> {
        let raw = self.read_bits_u64(width)?;
        if width == 64 {
            return Ok(raw as i64);
        }
        let sign_bit = 1u64 << (width - 1);
        Ok(if raw & sign_bit != 0 {
            (raw as i64) - (1i64 << width)
        } else {
            raw as i64
        })
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.pos % 8 != 0 {
            return Err(Error::Decode("byte read at non-byte-aligned bit offset".into()));
        }
        let byte_pos = self.pos / 8;
        let bytes = self.bits.as_raw_slice();
        if byte_pos + n > bytes.len() {
            return Err(Error::Truncated(self.pos));
        }
        self.pos += n * 8;
        Ok(&bytes[byte_pos..byte_pos + n])
    }
}

fn swap_if_needed(byte_order: ByteOrder, width: u8, raw: u64) -> u64 {
    if width % 8 != 0 || width <= 8 {
        return raw;
    }
    match byte_order {
        ByteOrder::Le => {
            let bytes = raw.to_be_bytes();
            let n = (width / 8) as usize;
            let mut swapped = [0u8; 8];
            for i in 0..n {
                swapped[8 - n + i] = bytes[7 - i];
            }
            u64::from_be_bytes(swapped)
        }
        _ => raw,
    }
}

/// Decodes a single field of type `ft` at the cursor's current position,
/// given the currently-accumulated sibling fields in `scope` (used to
/// resolve variant tags and sequence lengths by name, §3).
fn decode_field(
    cursor: &mut BitCursor,
    trace: &Trace,
    ft: FieldTypeId,
    scope: &ValueMap,
) -> Result<Value, Error> {
    let alignment = trace.field_types.alignment(ft).map_err(|e| Error::Decode(e.to_string()))?;
    cursor.align_to(alignment);
    match trace
        .field_types
        .kind(ft)
        .map_err(|e| Error::Decode(e.to_string()))?
    {
        FtKind::Integer(i) => {
            if i.signed {
                let raw = cursor.read_bits_i64(i.size)?;
                Ok(Value::s64(raw))
            } else {
                let raw = cursor.read_bits_u64(i.size)?;
                let byte_order = trace.field_types.byte_order(ft).map_err(|e| Error::Decode(e.to_string()))?;
                Ok(Value::u64(swap_if_needed(byte_order, i.size, raw)))
            }
        }
        FtKind::Float(f) => decode_float(cursor, *f),
        FtKind::String => decode_string(cursor),
        FtKind::Enum(e) => {
            let container_ft = e.container;
            let v = decode_field(cursor, trace, container_ft, scope)?;
            Ok(v)
        }
        FtKind::Struct(s) => {
            let mut map = ValueMap::new();
            for (name, field_ft) in &s.fields {
                let v = decode_field(cursor, trace, *field_ft, &map)?;
                map.insert(name.clone(), v).ok();
            }
            Ok(Value::Map(map))
        }
        FtKind::Variant(v) => {
            let tag_value = scope
                .get(&v.tag_field_name)
                .cloned()
                .ok_or_else(|| Error::Decode(format!("variant tag field '{}' not yet decoded", v.tag_field_name)))?;
            let tag_int = match tag_value {
                Value::SignedInteger(x) => x,
                Value::UnsignedInteger(x) => x as i64,
                _ => return Err(Error::Decode("variant tag field is not an integer".into())),
            };
            let label = match trace
                .field_types
                .kind(v.tag_type)
                .map_err(|e| Error::Decode(e.to_string()))?
            {
                FtKind::Enum(en) => en
                    .mappings
                    .iter()
                    .find(|(_, range)| match range {
                        crate::field_type::EnumRange::Signed(lo, hi) => tag_int >= *lo && tag_int <= *hi,
                        crate::field_type::EnumRange::Unsigned(lo, hi) => {
                            tag_int >= 0 && (tag_int as u64) >= *lo && (tag_int as u64) <= *hi
                        }
                    })
                    .map(|(label, _)| label.clone()),
                _ => None,
            }
            .ok_or(Error::UnmatchedVariantTag)?;
            let arm_ft = v
                .arms
                .iter()
                .find(|(l, _)| *l == label)
                .map(|(_, id)| *id)
                .ok_or(Error::UnmatchedVariantTag)?;
            decode_field(cursor, trace, arm_ft, scope)
        }
        FtKind::Array(a) => {
            let mut items = Vec::with_capacity(a.length as usize);
            for _ in 0..a.length {
                items.push(decode_field(cursor, trace, a.element, scope)?);
            }
            Ok(Value::Array(items))
        }
        FtKind::Sequence(s) => {
            let len_value = scope
                .get(&s.length_field_name)
                .cloned()
                .ok_or_else(|| Error::Decode(format!("sequence length field '{}' not yet decoded", s.length_field_name)))?;
            let len = match len_value {
                Value::UnsignedInteger(x) => x,
                Value::SignedInteger(x) if x >= 0 => x as u64,
                _ => return Err(Error::Decode("sequence length field is not a non-negative integer".into())),
            };
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                items.push(decode_field(cursor, trace, s.element, scope)?);
            }
            Ok(Value::Array(items))
        }
    }
}

fn decode_float(cursor: &mut BitCursor, f: crate::field_type::FloatFt) -> Result<Value, Error> {
    match (f.exp_bits, f.mant_bits) {
        (8, 24) => {
            let bits = cursor.read_bits_u64(32)? as u32;
            Ok(Value::f64(f32::from_bits(bits) as f64))
        }
        (11, 53) => {
            let bits = cursor.read_bits_u64(64)?;
            Ok(Value::f64(f64::from_bits(bits)))
        }
        _ => Err(Error::Unsupported("80-bit extended float decode".into())),
    }
}

fn decode_string(cursor: &mut BitCursor) -> Result<Value, Error> {
    cursor.align_to(8);
    let start_byte = cursor.pos / 8;
    let all = cursor.bits.as_raw_slice();
    let nul_pos = all[start_byte..]
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::UnterminatedString)?;
    let s = String::from_utf8_lossy(&all[start_byte..start_byte + nul_pos]).into_owned();
    cursor.pos += (nul_pos + 1) * 8;
    Ok(Value::string(s))
}

/// Packet decode phases, advanced one packet at a time (§4.G).
enum Phase {
    Header,
    Context,
    Events,
    Done,
}

/// Decodes packets from one bound medium into an ordered queue of
/// messages, matching the emission order in §4.G: `StreamBeginning?` →
/// `PacketBeginning` → events/discarded/inactivity → `PacketEnd` →
/// `StreamEnd?`.
pub struct MsgIter<M: Medium> {
    medium: M,
    trace: Trace,
    stream_id: StreamId,
    stream_class_id: StreamClassId,
    phase: Phase,
    queue: VecDeque<Message>,
    stream_begun: bool,
    last_packet_properties: Option<PacketProperties>,
}

impl<M: Medium> MsgIter<M> {
    pub fn new(medium: M, trace: Trace, stream_id: StreamId, stream_class_id: StreamClassId) -> Self {
        MsgIter {
            medium,
            trace,
            stream_id,
            stream_class_id,
            phase: Phase::Header,
            queue: VecDeque::new(),
            stream_begun: false,
            last_packet_properties: None,
        }
    }

    pub fn last_packet_properties(&self) -> Option<&PacketProperties> {
        self.last_packet_properties.as_ref()
    }

    /// Pulls the next message, decoding a full packet ahead when the
    /// queue runs dry. Returns `Ok(None)` at stream end.
    pub fn next_message(&mut self) -> TopResult<Option<Message>> {
        if let Some(m) = self.queue.pop_front() {
            return Ok(Some(m));
        }
        if matches!(self.phase, Phase::Done) {
            return Ok(None);
        }
        self.decode_next_packet()?;
        Ok(self.queue.pop_front())
    }

    fn decode_next_packet(&mut self) -> TopResult<()> {
        use crate::medium::Status;

        let status = self.medium.request_bytes(16 * 1024 * 1024)?;
        match status {
            Status::Again => return Err(TopError::Again),
            Status::Eof => {
                if self.stream_begun {
                    self.queue.push_back(Message::StreamEnd { stream: self.stream_id });
                }
                self.phase = Phase::Done;
                return Ok(());
            }
            Status::Ok => {}
        }

        let bytes = self.medium.buffer().to_vec();
        let sc = self
            .trace
            .stream_class(self.stream_class_id)
            .ok_or_else(|| Error::Decode("stream class not found in trace".into()))?;

        let mut cursor = BitCursor::new(&bytes);

        let packet_context_ft = sc.packet_context_ft;
        let event_header_ft = sc.event_header_ft;
        let event_common_context_ft = sc.event_common_context_ft;
        let default_clock = sc.default_clock_class;

        let mut props = PacketProperties {
            stream_class_id: self.stream_class_id,
            ..Default::default()
        };

        let mut packet_scope = ValueMap::new();
        if let Some(ctx_ft) = packet_context_ft {
            let v = decode_field(&mut cursor, &self.trace, ctx_ft, &packet_scope).map_err(ctf_err)?;
            if let Value::Map(m) = &v {
                if let Some(Value::UnsignedInteger(n)) = m.get("content_size") {
                    props.content_size_bits = *n;
                }
                if let Some(Value::UnsignedInteger(n)) = m.get("packet_size") {
                    props.total_size_bits = *n;
                }
                if let Some(Value::UnsignedInteger(n)) = m.get("events_discarded") {
                    props.discarded_events = Some(*n);
                }
            }
            packet_scope.insert("packet.context", v).ok();
        }
        if props.total_size_bits == 0 {
            props.total_size_bits = (bytes.len() as u64) * 8;
        }
        if props.content_size_bits == 0 {
            props.content_size_bits = props.total_size_bits;
        }

        if !self.stream_begun {
            self.queue.push_back(Message::StreamBeginning {
                stream: self.stream_id,
                stream_class: self.stream_class_id,
            });
            self.stream_begun = true;
        }
        self.queue.push_back(Message::PacketBeginning {
            stream: self.stream_id,
            ts: None,
        });

        while (cursor.pos as u64) < props.content_size_bits {
            let mut event_scope = ValueMap::new();
            let mut event_id = 0u64;
            if let Some(hdr_ft) = event_header_ft {
                let v = decode_field(&mut cursor, &self.trace, hdr_ft, &event_scope).map_err(ctf_err)?;
                if let Value::Map(m) = &v {
                    if let Some(id_v) = m.get("id") {
                        event_id = match id_v {
                            Value::UnsignedInteger(n) => *n,
                            Value::SignedInteger(n) => *n as u64,
                            _ => 0,
                        };
                    }
                }
                event_scope.insert("header", v).ok();
            }
            if let Some(common_ctx_ft) = event_common_context_ft {
                let v = decode_field(&mut cursor, &self.trace, common_ctx_ft, &event_scope).map_err(ctf_err)?;
                event_scope.insert("context", v).ok();
            }

            let ec = sc
                .event_class(EventClassId(event_id))
                .ok_or_else(|| ctf_err(Error::UnknownEventId(event_id, self.stream_class_id)))?;

            if let Some(payload_ft) = ec.payload_ft {
                let _ = decode_field(&mut cursor, &self.trace, payload_ft, &event_scope).map_err(ctf_err)?;
            }

            let ts = default_clock.map(|cc| ClockSnapshot {
                clock_class: cc,
                cycles: 0,
                ts_ns: 0,
            });

            self.queue.push_back(Message::Event {
                stream: self.stream_id,
                payload: EventPayload {
                    event_class: EventClassId(event_id),
                    ts,
                },
            });
        }

        self.queue.push_back(Message::PacketEnd {
            stream: self.stream_id,
            ts: None,
        });

        self.last_packet_properties = Some(props);
        let _ = self.medium.switch_packet();
        Ok(())
    }
}

fn ctf_err(e: Error) -> TopError {
    TopError::MsgIter(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field_type::{IntegerBase, IntegerEncoding};
    use crate::medium::file::FileMedium;
    use crate::trace_ir::{EventClass, StreamClass};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn bit_cursor_reads_packed_integers() {
        // 0b1010_1100 => first 4 bits = 0b1010 = 10, next 4 bits = 0b1100 = 12
        let bytes = [0b1010_1100u8];
        let mut c = BitCursor::new(&bytes);
        assert_eq!(c.read_bits_u64(4).unwrap(), 0b1010);
        assert_eq!(c.read_bits_u64(4).unwrap(), 0b1100);
    }

    #[test]
    fn bit_cursor_alignment_pads_to_byte() {
        let bytes = [0xFFu8, 0x00];
        let mut c = BitCursor::new(&bytes);
        let _ = c.read_bits_u64(3).unwrap();
        c.align_to(8);
        assert_eq!(c.pos, 8);
    }

    #[test]
    fn decode_simple_event_stream() {
        let mut trace = Trace::new("t");
        let id_ft = trace
            .field_types
            .integer(8, false, IntegerBase::Dec, IntegerEncoding::None, ByteOrder::Native, None)
            .unwrap();
        let header_struct = trace.field_types.struct_();
        trace.field_types.add_field(header_struct, "id", id_ft).unwrap();

        let payload_field = trace
            .field_types
            .integer(32, false, IntegerBase::Dec, IntegerEncoding::None, ByteOrder::Native, None)
            .unwrap();
        let payload_struct = trace.field_types.struct_();
        trace.field_types.add_field(payload_struct, "pid", payload_field).unwrap();

        let mut sc = StreamClass::new(StreamClassId(0));
        sc.event_header_ft = Some(header_struct);
        sc.add_event_class(EventClass {
            id: EventClassId(0),
            name: "e".into(),
            context_ft: None,
            payload_ft: Some(payload_struct),
        })
        .unwrap();
        trace.add_stream_class(sc).unwrap();

        // one event: header.id = 0 (1 byte), payload.pid = 42 (4 bytes BE)
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(&42u32.to_be_bytes());
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(&bytes).unwrap();
        f.flush().unwrap();

        let medium = FileMedium::open([f.path()]).unwrap();
        let mut iter = MsgIter::new(medium, trace, StreamId(0), StreamClassId(0));

        let mut messages = Vec::new();
        while let Some(m) = iter.next_message().unwrap() {
            messages.push(m);
        }
        assert!(matches!(messages[0], Message::StreamBeginning { .. }));
        assert!(matches!(messages[1], Message::PacketBeginning { .. }));
        assert!(matches!(messages[2], Message::Event { .. }));
        assert!(matches!(messages.last().unwrap(), Message::StreamEnd { .. }));
    }
}
