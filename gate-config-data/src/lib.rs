//! Configuration of the sensor node.
//!
//! The native format is one `key = value` pair per line with `#` comments,
//! split over two files in the config directory: `system.config` (base
//! identity, trigger endpoints, video outputs) and `camera.config` (typed
//! pass-through for the external acquisition pipeline). Unknown keys and
//! malformed values are logged and skipped so a stale config file never
//! takes the sensor down.

use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use gate_types::BaseKind;

pub const SYSTEM_CONFIG_FILE: &str = "system.config";
pub const CAMERA_CONFIG_FILE: &str = "camera.config";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Split config text into trimmed `(key, value)` pairs, preserving file
/// order. Blank lines and `#` comments are skipped.
pub fn parse_key_values(text: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            warn!("ignoring config line without '=': {:?}", line);
            continue;
        };
        pairs.push((key.trim().to_string(), value.trim().to_string()));
    }
    pairs
}

fn parse_bool(value: &str) -> bool {
    value == "yes" || value == "1"
}

fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub base: BaseKind,
    /// Whether inbound pause/resume bytes are dispatched.
    pub remote_control: bool,
    /// Whether hardware switches may override this file. Sampling the
    /// switches themselves is an external collaborator.
    pub hw_switch: bool,
    pub udp_remote_host: Option<Ipv4Addr>,
    pub udp_remote_port: u16,
    pub rtp_remote_host: Option<Ipv4Addr>,
    pub rtp_remote_port: u16,
    pub video_output_screen: bool,
    pub video_output_file: bool,
    pub video_output_rtp: bool,
    pub video_output_result: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            base: BaseKind::A,
            remote_control: false,
            hw_switch: false,
            udp_remote_host: None,
            udp_remote_port: 4999,
            rtp_remote_host: None,
            rtp_remote_port: 5000,
            video_output_screen: false,
            video_output_file: false,
            video_output_rtp: false,
            video_output_result: false,
        }
    }
}

impl SystemConfig {
    pub fn from_str(text: &str) -> Self {
        let mut cfg = Self::default();
        for (key, value) in parse_key_values(text) {
            cfg.apply(&key, &value);
        }
        cfg
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from_str(&read_to_string(path)?))
    }

    pub fn any_video_output(&self) -> bool {
        self.video_output_screen || self.video_output_file || self.video_output_rtp
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "base.type" => {
                self.base = match value {
                    "A" => BaseKind::A,
                    "B" => BaseKind::B,
                    other => {
                        warn!("unknown base.type {:?}", other);
                        BaseKind::Unknown
                    }
                }
            }
            "base.remote.control" => self.remote_control = parse_bool(value),
            "base.hwswitch" => self.hw_switch = parse_bool(value),
            "base.udp.remote.host" => match value.parse() {
                Ok(ip) => self.udp_remote_host = Some(ip),
                Err(_) => warn!("invalid {} = {}", key, value),
            },
            "base.udp.remote.port" => match value.parse() {
                Ok(port) => self.udp_remote_port = port,
                Err(_) => warn!("invalid {} = {}", key, value),
            },
            "base.rtp.remote.host" => match value.parse() {
                Ok(ip) => self.rtp_remote_host = Some(ip),
                Err(_) => warn!("invalid {} = {}", key, value),
            },
            "base.rtp.remote.port" => match value.parse() {
                Ok(port) => self.rtp_remote_port = port,
                Err(_) => warn!("invalid {} = {}", key, value),
            },
            "video.output.screen" => self.video_output_screen = parse_bool(value),
            "video.output.file" => self.video_output_file = parse_bool(value),
            "video.output.rtp" => self.video_output_rtp = parse_bool(value),
            "video.output.result" => self.video_output_result = parse_bool(value),
            _ => warn!("unknown system config key {:?}", key),
        }
    }
}

/// Typed pass-through for the external camera pipeline. The sensor core
/// never interprets these beyond parsing; they parameterize acquisition
/// and the auto-exposure probe outside this process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub wbmode: i32,
    pub tnr_mode: i32,
    pub tnr_strength: i32,
    pub ee_mode: i32,
    pub ee_strength: i32,
    pub gainrange: String,
    pub ispdigitalgainrange: String,
    pub exposuretimerange: String,
    pub exposurecompensation: i32,
    /// Mean-brightness ceiling used by the exposure probe.
    pub exposurethreshold: i32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            wbmode: 0,
            tnr_mode: -1,
            tnr_strength: -1,
            ee_mode: 1,
            ee_strength: -1,
            gainrange: "1 16".to_string(),
            ispdigitalgainrange: "1 8".to_string(),
            exposuretimerange: "5000000 10000000".to_string(),
            exposurecompensation: 0,
            exposurethreshold: 255,
        }
    }
}

impl CameraConfig {
    pub fn from_str(text: &str) -> Self {
        let mut cfg = Self::default();
        for (key, value) in parse_key_values(text) {
            cfg.apply(&key, &value);
        }
        cfg
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::from_str(&read_to_string(path)?))
    }

    fn apply(&mut self, key: &str, value: &str) {
        fn int(key: &str, value: &str, slot: &mut i32) {
            match value.parse() {
                Ok(v) => *slot = v,
                Err(_) => warn!("invalid {} = {}", key, value),
            }
        }
        match key {
            "wbmode" => int(key, value, &mut self.wbmode),
            "tnr-mode" => int(key, value, &mut self.tnr_mode),
            "tnr-strength" => int(key, value, &mut self.tnr_strength),
            "ee-mode" => int(key, value, &mut self.ee_mode),
            "ee-strength" => int(key, value, &mut self.ee_strength),
            "gainrange" => self.gainrange = value.to_string(),
            "ispdigitalgainrange" => self.ispdigitalgainrange = value.to_string(),
            "exposuretimerange" => self.exposuretimerange = value.to_string(),
            "exposurecompensation" => int(key, value, &mut self.exposurecompensation),
            "exposurethreshold" => int(key, value, &mut self.exposurethreshold),
            _ => warn!("unknown camera config key {:?}", key),
        }
    }
}
