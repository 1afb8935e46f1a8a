//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Debug Protocol Wire Codec
//!
//! Payload layout: one discriminator byte followed by the message fields.
//! Integers and floats are big-endian, strings are a `u32` byte length
//! followed by UTF-8, lists are a `u32` item count followed by the items and
//! optional values are a presence byte (`0`/`1`) followed by the value.
//!
//! On the stream every payload is prefixed by its `u32` length (see
//! [`DebugCodec`]).

use crate::message::*;
use crate::types::{EntityId, GroupId, NodeId, TreeStatus, Vector3, ZoneId, ZoneState};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Default upper bound for a single frame
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

const DELTA_POSITION: u8 = 1 << 0;
const DELTA_ORIENTATION: u8 = 1 << 1;
const DELTA_STATUS: u8 = 1 << 2;
const DELTA_RUNNING_NODE: u8 = 1 << 3;
const DELTA_GROUP: u8 = 1 << 4;
const DELTA_TARGET: u8 = 1 << 5;
const DELTA_ALL: u8 = (1 << 6) - 1;

/// Errors raised while decoding a message payload.
///
/// All of these are recoverable: the offending frame is discarded and the
/// connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Empty payload")]
    Empty,

    #[error("Unknown message discriminator: {0}")]
    UnknownKind(u8),

    #[error("Payload truncated: needed {needed} more bytes")]
    Truncated { needed: usize },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: u64 },

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
}

/// Smallest payload (after the discriminator) a well-formed message can have
fn minimum_length(discriminator: u8) -> Option<usize> {
    Some(match discriminator {
        DebugMessage::ADD_NODE => 8 + 4 + 12,
        DebugMessage::UPDATE_NODE => 8 + 1,
        DebugMessage::DELETE_NODE => 8,
        DebugMessage::CHARACTER_STATIC => 8 + 4,
        DebugMessage::CHARACTER_DETAILS => 8 + 4 + 4 + 4,
        DebugMessage::NAMES => 4,
        DebugMessage::SELECT => 1,
        DebugMessage::PAUSE => 4 + 1,
        DebugMessage::STEP => 4,
        DebugMessage::STATE => 4 + 1,
        DebugMessage::CHANGE => 1,
        DebugMessage::RESET => 8,
        DebugMessage::SUBSCRIBE => 2,
        DebugMessage::PING => 4,
        DebugMessage::NACK => 1 + 4,
        _ => return None,
    })
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a message payload (discriminator and fields, without the frame length)
pub fn encode(message: &DebugMessage) -> Bytes {
    let mut buffer = BytesMut::with_capacity(64);
    encode_into(message, &mut buffer);
    buffer.freeze()
}

/// Encode a message payload, appending it to `buffer`
pub fn encode_into(message: &DebugMessage, buffer: &mut BytesMut) {
    buffer.put_u8(message.discriminator());
    match message {
        DebugMessage::AddNode(msg) => {
            buffer.put_u64(msg.entity_id.0);
            put_string(buffer, &msg.tree_name);
            put_vector(buffer, &msg.position);
        }
        DebugMessage::UpdateNode(msg) => {
            buffer.put_u64(msg.entity_id.0);
            put_delta(buffer, &msg.delta);
        }
        DebugMessage::DeleteNode(msg) => {
            buffer.put_u64(msg.entity_id.0);
        }
        DebugMessage::CharacterStatic(msg) => {
            buffer.put_u64(msg.entity_id.0);
            put_attributes(buffer, &msg.attributes);
        }
        DebugMessage::CharacterDetails(msg) => {
            buffer.put_u64(msg.entity_id.0);
            put_attributes(buffer, &msg.attributes);
            buffer.put_u32(msg.aggro.len() as u32);
            for entry in &msg.aggro {
                buffer.put_u64(entry.target.0);
                buffer.put_f32(entry.value);
            }
            buffer.put_u32(msg.nodes.len() as u32);
            for node in &msg.nodes {
                buffer.put_u32(node.node_id.0);
                put_string(buffer, &node.name);
                put_string(buffer, &node.kind);
                match node.status {
                    Some(status) => {
                        buffer.put_u8(1);
                        buffer.put_u8(status.to_u8());
                    }
                    None => buffer.put_u8(0),
                }
                buffer.put_u64(node.last_run_millis);
            }
        }
        DebugMessage::Names(msg) => {
            buffer.put_u32(msg.names.len() as u32);
            for entry in &msg.names {
                buffer.put_u32(entry.id);
                put_string(buffer, &entry.name);
            }
        }
        DebugMessage::Select(msg) => match msg.entity_id {
            Some(entity_id) => {
                buffer.put_u8(1);
                buffer.put_u64(entity_id.0);
            }
            None => buffer.put_u8(0),
        },
        DebugMessage::Pause(msg) => {
            buffer.put_u32(msg.zone_id.0);
            buffer.put_u8(msg.paused as u8);
        }
        DebugMessage::Step(msg) => {
            buffer.put_u32(msg.zone_id.0);
        }
        DebugMessage::State(msg) => {
            buffer.put_u32(msg.zone_id.0);
            buffer.put_u8(msg.state.to_u8());
        }
        DebugMessage::Change(msg) => match msg.zone_id {
            Some(zone_id) => {
                buffer.put_u8(1);
                buffer.put_u32(zone_id.0);
            }
            None => buffer.put_u8(0),
        },
        DebugMessage::Reset(msg) => {
            buffer.put_u64(msg.entity_id.0);
        }
        DebugMessage::Subscribe(msg) => {
            buffer.put_u16(msg.kinds.bits());
        }
        DebugMessage::Ping(msg) => {
            buffer.put_u32(msg.nonce);
        }
        DebugMessage::Nack(msg) => {
            buffer.put_u8(msg.code.to_u8());
            put_string(buffer, &msg.reason);
        }
    }
}

fn put_string(buffer: &mut BytesMut, value: &str) {
    buffer.put_u32(value.len() as u32);
    buffer.put_slice(value.as_bytes());
}

fn put_vector(buffer: &mut BytesMut, value: &Vector3) {
    buffer.put_f32(value.x);
    buffer.put_f32(value.y);
    buffer.put_f32(value.z);
}

fn put_attributes(buffer: &mut BytesMut, attributes: &[Attribute]) {
    buffer.put_u32(attributes.len() as u32);
    for attribute in attributes {
        put_string(buffer, &attribute.key);
        put_string(buffer, &attribute.value);
    }
}

fn put_delta(buffer: &mut BytesMut, delta: &NodeDelta) {
    let mut mask = 0u8;
    if delta.position.is_some() {
        mask |= DELTA_POSITION;
    }
    if delta.orientation.is_some() {
        mask |= DELTA_ORIENTATION;
    }
    if delta.status.is_some() {
        mask |= DELTA_STATUS;
    }
    if delta.running_node.is_some() {
        mask |= DELTA_RUNNING_NODE;
    }
    if delta.group.is_some() {
        mask |= DELTA_GROUP;
    }
    if delta.target.is_some() {
        mask |= DELTA_TARGET;
    }
    buffer.put_u8(mask);

    if let Some(position) = &delta.position {
        put_vector(buffer, position);
    }
    if let Some(orientation) = delta.orientation {
        buffer.put_f32(orientation);
    }
    if let Some(status) = delta.status {
        buffer.put_u8(status.to_u8());
    }
    if let Some(running_node) = delta.running_node {
        match running_node {
            Some(node) => {
                buffer.put_u8(1);
                buffer.put_u32(node.0);
            }
            None => buffer.put_u8(0),
        }
    }
    if let Some(group) = delta.group {
        match group {
            Some(group) => {
                buffer.put_u8(1);
                buffer.put_u32(group.0);
            }
            None => buffer.put_u8(0),
        }
    }
    if let Some(target) = delta.target {
        match target {
            Some(target) => {
                buffer.put_u8(1);
                buffer.put_u64(target.0);
            }
            None => buffer.put_u8(0),
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Bounds-checked reader over a payload
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn need(&self, count: usize) -> Result<(), DecodeError> {
        if self.buf.remaining() < count {
            return Err(DecodeError::Truncated {
                needed: count - self.buf.remaining(),
            });
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    fn f32(&mut self) -> Result<f32, DecodeError> {
        self.need(4)?;
        Ok(self.buf.get_f32())
    }

    fn flag(&mut self, field: &'static str) -> Result<bool, DecodeError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(DecodeError::InvalidValue {
                field,
                value: value as u64,
            }),
        }
    }

    fn string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let length = self.u32()? as usize;
        self.need(length)?;
        let (bytes, rest) = self.buf.split_at(length);
        self.buf = rest;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8(field))
    }

    /// Reads a list count, rejecting counts that cannot fit in the remaining payload
    fn count(&mut self, item_size: usize) -> Result<usize, DecodeError> {
        let count = self.u32()? as usize;
        self.need(count.saturating_mul(item_size))?;
        Ok(count)
    }

    fn entity(&mut self) -> Result<EntityId, DecodeError> {
        Ok(EntityId(self.u64()?))
    }

    fn zone(&mut self) -> Result<ZoneId, DecodeError> {
        Ok(ZoneId(self.u32()?))
    }

    fn vector(&mut self) -> Result<Vector3, DecodeError> {
        Ok(Vector3::new(self.f32()?, self.f32()?, self.f32()?))
    }

    fn status(&mut self) -> Result<TreeStatus, DecodeError> {
        let value = self.u8()?;
        TreeStatus::from_u8(value).ok_or(DecodeError::InvalidValue {
            field: "status",
            value: value as u64,
        })
    }

    fn attributes(&mut self) -> Result<Vec<Attribute>, DecodeError> {
        let count = self.count(8)?;
        let mut attributes = Vec::with_capacity(count);
        for _ in 0..count {
            let key = self.string("attribute key")?;
            let value = self.string("attribute value")?;
            attributes.push(Attribute { key, value });
        }
        Ok(attributes)
    }

    fn delta(&mut self) -> Result<NodeDelta, DecodeError> {
        let mask = self.u8()?;
        if mask & !DELTA_ALL != 0 {
            return Err(DecodeError::InvalidValue {
                field: "delta mask",
                value: mask as u64,
            });
        }
        let mut delta = NodeDelta::default();
        if mask & DELTA_POSITION != 0 {
            delta.position = Some(self.vector()?);
        }
        if mask & DELTA_ORIENTATION != 0 {
            delta.orientation = Some(self.f32()?);
        }
        if mask & DELTA_STATUS != 0 {
            delta.status = Some(self.status()?);
        }
        if mask & DELTA_RUNNING_NODE != 0 {
            delta.running_node = Some(match self.flag("running node")? {
                true => Some(NodeId(self.u32()?)),
                false => None,
            });
        }
        if mask & DELTA_GROUP != 0 {
            delta.group = Some(match self.flag("group")? {
                true => Some(GroupId(self.u32()?)),
                false => None,
            });
        }
        if mask & DELTA_TARGET != 0 {
            delta.target = Some(match self.flag("target")? {
                true => Some(self.entity()?),
                false => None,
            });
        }
        Ok(delta)
    }

    fn finish(self) -> Result<(), DecodeError> {
        if self.buf.has_remaining() {
            return Err(DecodeError::TrailingBytes(self.buf.remaining()));
        }
        Ok(())
    }
}

/// Decode a message payload (discriminator and fields, without the frame length)
pub fn decode(payload: &[u8]) -> Result<DebugMessage, DecodeError> {
    let (&discriminator, body) = payload.split_first().ok_or(DecodeError::Empty)?;
    let minimum = minimum_length(discriminator).ok_or(DecodeError::UnknownKind(discriminator))?;
    if body.len() < minimum {
        return Err(DecodeError::Truncated {
            needed: minimum - body.len(),
        });
    }

    let mut reader = Reader::new(body);
    let message = match discriminator {
        DebugMessage::ADD_NODE => DebugMessage::AddNode(AddNode {
            entity_id: reader.entity()?,
            tree_name: reader.string("tree name")?,
            position: reader.vector()?,
        }),
        DebugMessage::UPDATE_NODE => DebugMessage::UpdateNode(UpdateNode {
            entity_id: reader.entity()?,
            delta: reader.delta()?,
        }),
        DebugMessage::DELETE_NODE => DebugMessage::DeleteNode(DeleteNode {
            entity_id: reader.entity()?,
        }),
        DebugMessage::CHARACTER_STATIC => DebugMessage::CharacterStatic(CharacterStatic {
            entity_id: reader.entity()?,
            attributes: reader.attributes()?,
        }),
        DebugMessage::CHARACTER_DETAILS => {
            let entity_id = reader.entity()?;
            let attributes = reader.attributes()?;
            let aggro_count = reader.count(12)?;
            let mut aggro = Vec::with_capacity(aggro_count);
            for _ in 0..aggro_count {
                aggro.push(AggroState {
                    target: reader.entity()?,
                    value: reader.f32()?,
                });
            }
            let node_count = reader.count(4 + 4 + 4 + 1 + 8)?;
            let mut nodes = Vec::with_capacity(node_count);
            for _ in 0..node_count {
                let node_id = NodeId(reader.u32()?);
                let name = reader.string("node name")?;
                let kind = reader.string("node kind")?;
                let status = match reader.flag("node status")? {
                    true => Some(reader.status()?),
                    false => None,
                };
                let last_run_millis = reader.u64()?;
                nodes.push(NodeState {
                    node_id,
                    name,
                    kind,
                    status,
                    last_run_millis,
                });
            }
            DebugMessage::CharacterDetails(CharacterDetails {
                entity_id,
                attributes,
                aggro,
                nodes,
            })
        }
        DebugMessage::NAMES => {
            let count = reader.count(8)?;
            let mut names = Vec::with_capacity(count);
            for _ in 0..count {
                names.push(NameEntry {
                    id: reader.u32()?,
                    name: reader.string("name")?,
                });
            }
            DebugMessage::Names(Names { names })
        }
        DebugMessage::SELECT => DebugMessage::Select(Select {
            entity_id: match reader.flag("selection")? {
                true => Some(reader.entity()?),
                false => None,
            },
        }),
        DebugMessage::PAUSE => DebugMessage::Pause(Pause {
            zone_id: reader.zone()?,
            paused: reader.flag("paused")?,
        }),
        DebugMessage::STEP => DebugMessage::Step(Step {
            zone_id: reader.zone()?,
        }),
        DebugMessage::STATE => {
            let zone_id = reader.zone()?;
            let value = reader.u8()?;
            let state = ZoneState::from_u8(value).ok_or(DecodeError::InvalidValue {
                field: "zone state",
                value: value as u64,
            })?;
            DebugMessage::State(State { zone_id, state })
        }
        DebugMessage::CHANGE => DebugMessage::Change(Change {
            zone_id: match reader.flag("zone")? {
                true => Some(reader.zone()?),
                false => None,
            },
        }),
        DebugMessage::RESET => DebugMessage::Reset(Reset {
            entity_id: reader.entity()?,
        }),
        DebugMessage::SUBSCRIBE => {
            let bits = reader.u16()?;
            let kinds = MessageKinds::new(bits).map_err(|_| DecodeError::InvalidValue {
                field: "message kinds",
                value: bits as u64,
            })?;
            DebugMessage::Subscribe(Subscribe { kinds })
        }
        DebugMessage::PING => DebugMessage::Ping(Ping {
            nonce: reader.u32()?,
        }),
        DebugMessage::NACK => {
            let value = reader.u8()?;
            let code = NackCode::from_u8(value).ok_or(DecodeError::InvalidValue {
                field: "nack code",
                value: value as u64,
            })?;
            DebugMessage::Nack(Nack {
                code,
                reason: reader.string("reason")?,
            })
        }
        other => return Err(DecodeError::UnknownKind(other)),
    };
    reader.finish()?;
    Ok(message)
}

// ============================================================================
// Stream Framing
// ============================================================================

/// Length-delimited framing of debug messages for `tokio_util::codec::Framed`.
///
/// Each decoded item is a per-frame `Result`: a malformed payload yields
/// `Ok(Some(Err(DecodeError)))` and the stream continues with the next
/// frame. Only I/O and framing errors terminate the stream.
#[derive(Debug)]
pub struct DebugCodec {
    frames: LengthDelimitedCodec,
}

impl DebugCodec {
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            frames: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .max_frame_length(max_frame_length)
                .new_codec(),
        }
    }
}

impl Default for DebugCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LENGTH)
    }
}

impl Decoder for DebugCodec {
    type Item = Result<DebugMessage, DecodeError>;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.frames.decode(src)?.map(|frame| decode(&frame)))
    }
}

impl Encoder<DebugMessage> for DebugCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: DebugMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.frames.encode(encode(&item), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(message: DebugMessage) {
        let bytes = encode(&message);
        assert_eq!(decode(&bytes), Ok(message));
    }

    #[test]
    fn test_round_trip_boundary_payloads() {
        round_trip(DebugMessage::Names(Names::default()));
        round_trip(DebugMessage::UpdateNode(UpdateNode {
            entity_id: EntityId(7),
            delta: NodeDelta::default(),
        }));
        round_trip(DebugMessage::Select(Select { entity_id: None }));
        round_trip(DebugMessage::Change(Change { zone_id: None }));
        round_trip(DebugMessage::CharacterStatic(CharacterStatic {
            entity_id: EntityId(u64::MAX),
            attributes: Vec::new(),
        }));
    }

    #[test]
    fn test_round_trip_full_delta() {
        round_trip(DebugMessage::UpdateNode(UpdateNode {
            entity_id: EntityId(42),
            delta: NodeDelta {
                position: Some(Vector3::new(1.0, -2.5, 3.25)),
                orientation: Some(1.5),
                status: Some(TreeStatus::Running),
                running_node: Some(Some(NodeId(3))),
                group: Some(None),
                target: Some(Some(EntityId(9))),
            },
        }));
    }

    #[test]
    fn test_unknown_discriminator() {
        assert_eq!(decode(&[200, 0, 0]), Err(DecodeError::UnknownKind(200)));
        assert_eq!(decode(&[]), Err(DecodeError::Empty));
    }

    #[test]
    fn test_length_checked_before_payload() {
        // Step needs a four byte zone id
        assert_eq!(
            decode(&[DebugMessage::STEP, 0, 1]),
            Err(DecodeError::Truncated { needed: 2 })
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode(&DebugMessage::Ping(Ping { nonce: 5 })).to_vec();
        bytes.push(0xff);
        assert_eq!(decode(&bytes), Err(DecodeError::TrailingBytes(1)));
    }

    #[test]
    fn test_invalid_enum_values() {
        assert_eq!(
            decode(&[DebugMessage::STATE, 0, 0, 0, 1, 9]),
            Err(DecodeError::InvalidValue {
                field: "zone state",
                value: 9
            })
        );
        assert_eq!(
            decode(&[DebugMessage::PAUSE, 0, 0, 0, 1, 2]),
            Err(DecodeError::InvalidValue {
                field: "paused",
                value: 2
            })
        );
    }

    #[test]
    fn test_oversized_list_count_rejected() {
        // Names claiming u32::MAX entries with no data must not allocate
        let payload = [DebugMessage::NAMES, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(
            decode(&payload),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_codec_recovers_after_bad_frame() {
        let mut codec = DebugCodec::default();
        let mut buffer = BytesMut::new();

        // A frame with an unknown discriminator followed by a valid ping
        buffer.put_u32(1);
        buffer.put_u8(99);
        codec
            .encode(DebugMessage::Ping(Ping { nonce: 11 }), &mut buffer)
            .unwrap();

        let first = codec.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(first, Err(DecodeError::UnknownKind(99)));

        let second = codec.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(second, Ok(DebugMessage::Ping(Ping { nonce: 11 })));

        assert!(codec.decode(&mut buffer).unwrap().is_none());
    }
}
