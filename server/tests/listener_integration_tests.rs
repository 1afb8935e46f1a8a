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

//! End-to-end tests of the debug protocol over TCP

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::thread::JoinHandle;
use std::time::Duration;
use thicket_common::message::{Change, Ping};
use thicket_common::{DebugCodec, DebugMessage, MessageKind, NackCode, ZoneId};
use thicket_server::ai::loader::DefinitionLoader;
use thicket_server::listener::{DebugListener, ListenerSettings};
use thicket_server::{Server, ServerHandle, ServerSettings, TickLoop};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

const TREES: &str = r#"
idle:
  root:
    type: Idle
    params: { millis: 20 }
"#;

struct Harness {
    addr: SocketAddr,
    zone: ZoneId,
    handle: ServerHandle,
    tick_thread: JoinHandle<Server>,
}

async fn start() -> Harness {
    let loader = DefinitionLoader::from_yaml(TREES).unwrap();
    let mut server = Server::new(Box::new(loader), ServerSettings::default());
    let zone = server.add_zone("forest").unwrap();
    server.add_node(zone, "idle").unwrap();
    server.add_node(zone, "idle").unwrap();
    server.start_zone(zone).unwrap();

    let (tick_loop, handle) = TickLoop::new(server, Duration::from_millis(10));
    let tick_thread = tick_loop.spawn().unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let debug_listener = DebugListener::new(handle.clone(), ListenerSettings::default());
    tokio::spawn(debug_listener.serve(listener));

    Harness {
        addr,
        zone,
        handle,
        tick_thread,
    }
}

async fn stop(harness: Harness) {
    harness.handle.shutdown();
    let server = tokio::task::spawn_blocking(move || harness.tick_thread.join().unwrap())
        .await
        .unwrap();
    assert!(server.tick_count() > 0);
}

async fn client(addr: SocketAddr) -> Framed<TcpStream, DebugCodec> {
    let stream = TcpStream::connect(addr).await.unwrap();
    Framed::new(stream, DebugCodec::default())
}

async fn next_message(client: &mut Framed<TcpStream, DebugCodec>) -> DebugMessage {
    tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for a message")
        .expect("connection closed")
        .expect("i/o error")
        .expect("malformed message")
}

/// Read until a message of `kind` arrives, skipping everything else
async fn next_of_kind(client: &mut Framed<TcpStream, DebugCodec>, kind: MessageKind) -> DebugMessage {
    loop {
        let message = next_message(client).await;
        if message.kind() == kind {
            return message;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connect_receives_zone_directory() {
    let harness = start().await;
    let mut client = client(harness.addr).await;

    match next_message(&mut client).await {
        DebugMessage::Names(names) => {
            assert_eq!(names.names.len(), 1);
            assert_eq!(names.names[0].name, "forest");
        }
        other => panic!("expected Names, got {:?}", other),
    }

    stop(harness).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_change_streams_updates() {
    let harness = start().await;
    let mut client = client(harness.addr).await;
    next_of_kind(&mut client, MessageKind::Names).await;

    client
        .send(DebugMessage::Change(Change {
            zone_id: Some(harness.zone),
        }))
        .await
        .unwrap();

    let mut replay = Vec::new();
    for _ in 0..8 {
        replay.push(next_message(&mut client).await.kind());
    }
    assert_eq!(
        &replay[..4],
        &[
            MessageKind::State,
            MessageKind::Names,
            MessageKind::AddNode,
            MessageKind::CharacterStatic,
        ]
    );

    // Subsequent ticks keep sending deltas
    next_of_kind(&mut client, MessageKind::UpdateNode).await;
    next_of_kind(&mut client, MessageKind::UpdateNode).await;

    stop(harness).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_frame_is_nacked() {
    let harness = start().await;
    let mut client = client(harness.addr).await;
    next_of_kind(&mut client, MessageKind::Names).await;

    // One-byte frame carrying an unknown discriminator
    client.get_mut().write_all(&[0, 0, 0, 1, 0xFF]).await.unwrap();
    match next_of_kind(&mut client, MessageKind::Nack).await {
        DebugMessage::Nack(nack) => assert_eq!(nack.code, NackCode::Decode),
        other => panic!("expected Nack, got {:?}", other),
    }

    // The connection survives
    client
        .send(DebugMessage::Ping(Ping { nonce: 5 }))
        .await
        .unwrap();
    assert_eq!(
        next_of_kind(&mut client, MessageKind::Ping).await,
        DebugMessage::Ping(Ping { nonce: 5 })
    );

    stop(harness).await;
}

/// Wait until the published snapshot reports `expected` sessions
async fn wait_for_sessions(handle: &mut ServerHandle, expected: usize) -> usize {
    let mut sessions = usize::MAX;
    for _ in 0..200 {
        sessions = handle.wait_for_tick().await.unwrap().sessions;
        if sessions == expected {
            break;
        }
    }
    sessions
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disconnect_releases_session() {
    let mut harness = start().await;
    let mut client = client(harness.addr).await;
    next_of_kind(&mut client, MessageKind::Names).await;

    assert_eq!(wait_for_sessions(&mut harness.handle, 1).await, 1);
    assert_eq!(harness.handle.snapshot().entity_count(), 2);

    drop(client);
    assert_eq!(wait_for_sessions(&mut harness.handle, 0).await, 0);

    stop(harness).await;
}
