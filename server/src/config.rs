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

use crate::ai::aggro::AggroConfig;
use crate::ai::loader::TreeDefinition;
use crate::listener::ListenerSettings;
use crate::server::ServerSettings;
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_env_field::EnvField;
use std::collections::BTreeMap;
use std::net::{AddrParseError, IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;
use std::time::Duration;
use thicket_common::codec::DEFAULT_MAX_FRAME_LENGTH;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Arguments {
    #[arg(
        short = 'c',
        long = "config",
        help = "Path to configuration file",
        default_value = "server/config.yaml"
    )]
    pub config_file: String,

    #[arg(
        short = 'e',
        long = "env",
        help = "Path to environment file",
        default_value = "server/.env"
    )]
    pub env_file: Option<String>,
}

impl Default for Arguments {
    fn default() -> Self {
        Self {
            config_file: "config.yaml".to_string(),
            env_file: Some(".env".to_string()),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub listener: ListenerConfig,
    pub simulation: SimulationConfig,
    pub aggro: AggroConfig,
    pub debug: DebugConfig,
    /// Tree definitions keyed by tree name
    pub trees: BTreeMap<String, TreeDefinition>,
    /// Zones created at startup
    pub zones: Vec<ZoneConfig>,
}

impl Configuration {
    pub fn load(path: &str) -> Result<Configuration, String> {
        let conf = serde_yaml::from_reader(
            std::fs::File::open(path).map_err(|e| format!("Failed to open config file: {}", e))?,
        )
        .map_err(|e| format!("Failed to parse config file: {}", e))?;

        Ok(conf)
    }

    pub fn server_settings(&self) -> ServerSettings {
        ServerSettings {
            aggro: self.aggro.clone(),
            seed: self.simulation.seed,
        }
    }

    pub fn listener_settings(&self) -> ListenerSettings {
        ListenerSettings {
            max_frame_length: self.listener.max_frame_length,
            idle_timeout: Duration::from_secs(self.debug.idle_timeout_secs),
            outbound_capacity: self.debug.outbound_capacity,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub addr: EnvField<ListenerBinding>,
    pub max_frame_length: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            addr: Default::default(),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed tick period
    pub tick_millis: u64,
    /// Base seed for per-entity random selection
    pub seed: u64,
}

impl SimulationConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_millis: 100,
            seed: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub idle_timeout_secs: u64,
    pub outbound_capacity: usize,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300,
            outbound_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    /// Start ticking as soon as the server is up
    #[serde(default = "default_true")]
    pub start: bool,
    #[serde(default)]
    pub spawns: Vec<SpawnConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnConfig {
    pub tree: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub group: Option<u32>,
}

fn default_true() -> bool {
    true
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListenerBinding(SocketAddr);

impl ListenerBinding {
    pub fn to_addr(&self) -> SocketAddr {
        self.0
    }
    pub fn to_ip(&self) -> IpAddr {
        self.0.ip()
    }
    pub fn to_port(&self) -> u16 {
        self.0.port()
    }
}

impl FromStr for ListenerBinding {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        tracing::debug!("Parsing debug listener binding from string: {}", s);
        Ok(Self(SocketAddr::from_str(s)?))
    }
}

impl Default for ListenerBinding {
    fn default() -> Self {
        Self(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::new(0, 0, 0, 0),
            6006,
        )))
    }
}

impl std::fmt::Display for ListenerBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::aggro::DecayKind;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_arguments_default() {
        let args = Arguments::default();
        assert_eq!(args.config_file, "config.yaml");
        assert_eq!(args.env_file, Some(".env".to_string()));
    }

    #[test]
    fn test_listener_config_default() {
        let config = ListenerConfig::default();
        assert_eq!(config.addr.to_ip(), IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        assert_eq!(config.addr.to_port(), 6006);
        assert_eq!(config.max_frame_length, DEFAULT_MAX_FRAME_LENGTH);
    }

    #[test]
    fn test_configuration_default() {
        let config = Configuration::default();
        assert_eq!(config.listener.addr.to_port(), 6006);
        assert_eq!(config.simulation.tick(), Duration::from_millis(100));
        assert_eq!(config.debug.idle_timeout_secs, 300);
        assert!(config.trees.is_empty());
        assert!(config.zones.is_empty());

        let listener = config.listener_settings();
        assert_eq!(listener.idle_timeout, Duration::from_secs(300));
        assert_eq!(listener.outbound_capacity, 1024);
    }

    #[test]
    fn test_configuration_load_missing_file() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let result = Configuration::load("non_existent.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_configuration_load_from_file() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("config.yaml");
        std::fs::write(
            &file_path,
            r#"
listener:
  addr: "192.168.1.1:7000"
simulation:
  tick_millis: 50
  seed: 99
aggro:
  decay: ratio
  rate: 0.5
trees:
  idle:
    root:
      type: Idle
      params:
        millis: 250
zones:
  - name: forest
    spawns:
      - tree: idle
        count: 3
        group: 1
  - name: cave
    start: false
"#,
        )
        .unwrap();

        let path = file_path.to_str().unwrap();
        let config = Configuration::load(path).unwrap();

        assert_eq!(
            config.listener.addr.to_addr(),
            SocketAddr::from_str("192.168.1.1:7000").unwrap(),
        );
        assert_eq!(config.simulation.tick(), Duration::from_millis(50));
        assert_eq!(config.server_settings().seed, 99);
        assert_eq!(config.aggro.decay, DecayKind::Ratio);
        assert_eq!(config.aggro.rate, 0.5);
        assert!(config.trees.contains_key("idle"));

        assert_eq!(config.zones.len(), 2);
        assert!(config.zones[0].start);
        assert_eq!(
            config.zones[0].spawns,
            vec![SpawnConfig {
                tree: "idle".to_string(),
                count: 3,
                group: Some(1),
            }]
        );
        assert!(!config.zones[1].start);
        assert!(config.zones[1].spawns.is_empty());
    }

    #[test]
    fn test_configuration_load_with_env_address() {
        let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("config.yaml");
        std::fs::write(&file_path, "listener:\n  addr: \"${THICKET_TEST_LISTENER_ADDR}\"\n").unwrap();

        unsafe {
            std::env::set_var("THICKET_TEST_LISTENER_ADDR", "127.0.0.1:8000");
        }
        let config = Configuration::load(file_path.to_str().unwrap());
        unsafe {
            std::env::remove_var("THICKET_TEST_LISTENER_ADDR");
        }

        let config = config.unwrap();
        assert_eq!(config.listener.addr.to_ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.listener.addr.to_port(), 8000);
    }
}
