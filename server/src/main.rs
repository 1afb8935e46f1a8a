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

use clap::Parser;
use std::net::SocketAddr;
use thicket_common::GroupId;
use thicket_server::ai::loader::DefinitionLoader;
use thicket_server::config::{Arguments, Configuration};
use thicket_server::listener::DebugListener;
use thicket_server::{Server, TickLoop};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load arguments from the command line
    let arguments: Arguments = Parser::parse();

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .with_ansi(true)
        .init();

    // Load environment variables from .env file if specified
    if let Some(ref env_file) = arguments.env_file {
        if std::path::Path::new(env_file).exists() {
            tracing::debug!("Loading environment variables from file: {}", env_file);
            dotenv::from_filename(env_file).ok();
        }
    } else {
        tracing::debug!("Loading environment variables from default file");
        dotenv::dotenv().ok();
    }

    // Load configuration from a file with environment variable substitution
    let config = Configuration::load(&arguments.config_file)
        .map_err(|e| format!("Unable to load configuration file: {}", e))?;

    tracing::debug!("Configuration loaded: {:?}", config);
    tracing::info!("Starting Thicket AI Server...");

    // Build the world described by the configuration
    let loader = DefinitionLoader::from_definitions(config.trees.clone());
    let mut server = Server::new(Box::new(loader), config.server_settings());
    for zone_config in &config.zones {
        let zone = server.add_zone(&zone_config.name)?;
        for spawn in &zone_config.spawns {
            for _ in 0..spawn.count {
                let entity = server.add_node(zone, &spawn.tree)?;
                if let Some(group) = spawn.group {
                    server.join_group(entity, GroupId(group))?;
                }
            }
        }
        if zone_config.start {
            server.start_zone(zone)?;
        }
        tracing::info!(
            "Zone '{}' ready with {} entities",
            zone_config.name,
            server.zone(zone).map(|z| z.len()).unwrap_or(0)
        );
    }

    // Start the tick thread
    let (tick_loop, handle) = TickLoop::new(server, config.simulation.tick());
    let tick_thread = tick_loop
        .with_idle_timeout(config.debug.idle_timeout_secs as i64)
        .spawn()?;

    // Get Server Address from configuration
    let listen_addr: SocketAddr = config.listener.addr.to_addr();

    tracing::info!("Binding debug listener to {}", listen_addr);
    let listener = TcpListener::bind(listen_addr).await?;

    let debug_listener = DebugListener::new(handle.clone(), config.listener_settings());
    tokio::select! {
        result = debug_listener.serve(listener) => {
            if let Err(e) = result {
                tracing::error!("Debug listener failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
    }

    handle.shutdown();
    match tick_thread.join() {
        Ok(server) => tracing::info!("Server stopped after {} ticks", server.tick_count()),
        Err(_) => tracing::error!("Tick thread panicked"),
    }

    Ok(())
}
