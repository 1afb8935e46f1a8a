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

//! Integration tests for the debug protocol codec

use futures::{SinkExt, StreamExt};
use proptest::prelude::*;
use thicket_common::message::*;
use thicket_common::{
    DebugCodec, DecodeError, EntityId, GroupId, NodeId, TreeStatus, Vector3, ZoneId, ZoneState,
    decode, encode,
};
use tokio_util::codec::{FramedRead, FramedWrite};

fn arb_vector() -> impl Strategy<Value = Vector3> {
    (-1.0e6f32..1.0e6, -1.0e6f32..1.0e6, -1.0e6f32..1.0e6).prop_map(|(x, y, z)| Vector3::new(x, y, z))
}

fn arb_status() -> impl Strategy<Value = TreeStatus> {
    prop_oneof![
        Just(TreeStatus::Success),
        Just(TreeStatus::Failure),
        Just(TreeStatus::Running),
    ]
}

fn arb_entity() -> impl Strategy<Value = EntityId> {
    any::<u64>().prop_map(EntityId)
}

fn arb_attributes() -> impl Strategy<Value = Vec<Attribute>> {
    prop::collection::vec(("[a-z]{0,8}", ".{0,12}"), 0..4)
        .prop_map(|pairs| pairs.into_iter().map(|(k, v)| Attribute::new(k, v)).collect())
}

fn arb_delta() -> impl Strategy<Value = NodeDelta> {
    (
        prop::option::of(arb_vector()),
        prop::option::of(-10.0f32..10.0),
        prop::option::of(arb_status()),
        prop::option::of(prop::option::of(any::<u32>().prop_map(NodeId))),
        prop::option::of(prop::option::of(any::<u32>().prop_map(GroupId))),
        prop::option::of(prop::option::of(arb_entity())),
    )
        .prop_map(
            |(position, orientation, status, running_node, group, target)| NodeDelta {
                position,
                orientation,
                status,
                running_node,
                group,
                target,
            },
        )
}

fn arb_message() -> impl Strategy<Value = DebugMessage> {
    prop_oneof![
        (arb_entity(), ".{0,16}", arb_vector()).prop_map(|(entity_id, tree_name, position)| {
            DebugMessage::AddNode(AddNode {
                entity_id,
                tree_name,
                position,
            })
        }),
        (arb_entity(), arb_delta())
            .prop_map(|(entity_id, delta)| DebugMessage::UpdateNode(UpdateNode { entity_id, delta })),
        arb_entity().prop_map(|entity_id| DebugMessage::DeleteNode(DeleteNode { entity_id })),
        (arb_entity(), arb_attributes()).prop_map(|(entity_id, attributes)| {
            DebugMessage::CharacterStatic(CharacterStatic {
                entity_id,
                attributes,
            })
        }),
        (
            arb_entity(),
            arb_attributes(),
            prop::collection::vec((arb_entity(), 0.0f32..1000.0), 0..4),
            prop::collection::vec(
                (any::<u32>(), "[A-Za-z]{0,10}", prop::option::of(arb_status()), any::<u64>()),
                0..4
            ),
        )
            .prop_map(|(entity_id, attributes, aggro, nodes)| {
                DebugMessage::CharacterDetails(CharacterDetails {
                    entity_id,
                    attributes,
                    aggro: aggro
                        .into_iter()
                        .map(|(target, value)| AggroState { target, value })
                        .collect(),
                    nodes: nodes
                        .into_iter()
                        .map(|(id, name, status, last_run_millis)| NodeState {
                            node_id: NodeId(id),
                            kind: name.to_lowercase(),
                            name,
                            status,
                            last_run_millis,
                        })
                        .collect(),
                })
            }),
        prop::collection::vec((any::<u32>(), ".{0,10}"), 0..5).prop_map(|entries| {
            DebugMessage::Names(Names {
                names: entries
                    .into_iter()
                    .map(|(id, name)| NameEntry { id, name })
                    .collect(),
            })
        }),
        prop::option::of(arb_entity())
            .prop_map(|entity_id| DebugMessage::Select(Select { entity_id })),
        (any::<u32>(), any::<bool>()).prop_map(|(zone, paused)| DebugMessage::Pause(Pause {
            zone_id: ZoneId(zone),
            paused
        })),
        any::<u32>().prop_map(|zone| DebugMessage::Step(Step {
            zone_id: ZoneId(zone)
        })),
        (
            any::<u32>(),
            prop_oneof![
                Just(ZoneState::Idle),
                Just(ZoneState::Running),
                Just(ZoneState::Paused)
            ]
        )
            .prop_map(|(zone, state)| DebugMessage::State(State {
                zone_id: ZoneId(zone),
                state
            })),
        prop::option::of(any::<u32>().prop_map(ZoneId))
            .prop_map(|zone_id| DebugMessage::Change(Change { zone_id })),
        arb_entity().prop_map(|entity_id| DebugMessage::Reset(Reset { entity_id })),
        (0u16..(1 << 15)).prop_map(|bits| DebugMessage::Subscribe(Subscribe {
            kinds: MessageKinds::new_truncated(bits)
        })),
        any::<u32>().prop_map(|nonce| DebugMessage::Ping(Ping { nonce })),
        (
            prop_oneof![
                Just(NackCode::Decode),
                Just(NackCode::State),
                Just(NackCode::NotFound),
                Just(NackCode::Conflict),
                Just(NackCode::Load),
                Just(NackCode::Internal)
            ],
            ".{0,20}"
        )
            .prop_map(|(code, reason)| DebugMessage::Nack(Nack { code, reason })),
    ]
}

proptest! {
    #[test]
    fn prop_decode_inverts_encode(message in arb_message()) {
        let bytes = encode(&message);
        prop_assert_eq!(decode(&bytes), Ok(message));
    }

    #[test]
    fn prop_truncated_payload_never_panics(message in arb_message(), cut in 0usize..64) {
        let bytes = encode(&message);
        let cut = cut.min(bytes.len().saturating_sub(1));
        // Every field is mandatory, so any strict prefix must be rejected
        prop_assert!(decode(&bytes[..cut]).is_err());
    }
}

#[tokio::test]
async fn test_framed_stream_survives_unknown_message() {
    let (client, server) = tokio::io::duplex(4096);
    let mut writer = FramedWrite::new(client, DebugCodec::default());
    let mut reader = FramedRead::new(server, DebugCodec::default());

    writer
        .send(DebugMessage::Pause(Pause {
            zone_id: ZoneId(1),
            paused: true,
        }))
        .await
        .unwrap();

    // Raw frame with an unassigned discriminator
    let inner = writer.get_mut();
    tokio::io::AsyncWriteExt::write_all(inner, &[0, 0, 0, 2, 250, 0])
        .await
        .unwrap();

    writer
        .send(DebugMessage::Step(Step { zone_id: ZoneId(1) }))
        .await
        .unwrap();

    let first = reader.next().await.unwrap().unwrap();
    assert_eq!(
        first,
        Ok(DebugMessage::Pause(Pause {
            zone_id: ZoneId(1),
            paused: true
        }))
    );

    let second = reader.next().await.unwrap().unwrap();
    assert_eq!(second, Err(DecodeError::UnknownKind(250)));

    let third = reader.next().await.unwrap().unwrap();
    assert_eq!(third, Ok(DebugMessage::Step(Step { zone_id: ZoneId(1) })));
}

#[tokio::test]
async fn test_batched_feed_then_flush() {
    let (client, server) = tokio::io::duplex(4096);
    let mut writer = FramedWrite::new(client, DebugCodec::default());
    let mut reader = FramedRead::new(server, DebugCodec::default());

    for nonce in 0..3 {
        writer.feed(DebugMessage::Ping(Ping { nonce })).await.unwrap();
    }
    writer.flush().await.unwrap();

    for nonce in 0..3 {
        let message = reader.next().await.unwrap().unwrap();
        assert_eq!(message, Ok(DebugMessage::Ping(Ping { nonce })));
    }
}
