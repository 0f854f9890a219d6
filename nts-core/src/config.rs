//! NTS tunables. Parsed from a TOML file into a strongly-typed structure;
//! every field has a default so a missing file (or a partially specified
//! one) still produces a usable configuration.

use serde::Deserialize;
use std::time::Duration;

use crate::error::{NtsError, Result};

/// Default peer id length, `L_id` in the spec. The original P2PSP splitter
/// uses 40-byte ids.
const DEFAULT_PEER_ID_LEN: usize = 40;

/// `K` in the spec: cap on port-prediction fan-out.
const DEFAULT_MAX_PREDICTED_PORTS: u16 = 8;

/// `T_max_arriving`, in seconds: per-entry and per-incorporation timeout.
const DEFAULT_T_MAX_ARRIVING_SECS: u64 = 10;

/// `T_hello_period`, in seconds: ticker wake interval.
const DEFAULT_T_HELLO_PERIOD_SECS: u64 = 1;

/// `T_intra_burst`, in milliseconds: inter-packet pacing within one burst.
const DEFAULT_T_INTRA_BURST_MILLIS: u64 = 1;

/// `N`: LRS chunk ring size.
const DEFAULT_CHUNK_RING_SIZE: usize = 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NtsConfig {
    /// `L_id`: peer id byte length.
    pub peer_id_len: usize,
    /// `K`: cap on predicted-port fan-out.
    pub max_predicted_ports: u16,
    /// `T_max_arriving`, in seconds.
    pub t_max_arriving_secs: u64,
    /// `T_hello_period`, in seconds.
    pub t_hello_period_secs: u64,
    /// `T_intra_burst`, in milliseconds.
    pub t_intra_burst_millis: u64,
    /// `N`: LRS chunk ring size.
    pub chunk_ring_size: usize,
}

impl Default for NtsConfig {
    fn default() -> Self {
        Self {
            peer_id_len: DEFAULT_PEER_ID_LEN,
            max_predicted_ports: DEFAULT_MAX_PREDICTED_PORTS,
            t_max_arriving_secs: DEFAULT_T_MAX_ARRIVING_SECS,
            t_hello_period_secs: DEFAULT_T_HELLO_PERIOD_SECS,
            t_intra_burst_millis: DEFAULT_T_INTRA_BURST_MILLIS,
            chunk_ring_size: DEFAULT_CHUNK_RING_SIZE,
        }
    }
}

impl NtsConfig {
    /// Loads configuration from a TOML file, falling back to defaults for
    /// any field the file omits. A missing file yields `Self::default()`.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(data) => Ok(toml::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(NtsError::Io(e)),
        }
    }

    pub fn t_max_arriving(&self) -> Duration {
        Duration::from_secs(self.t_max_arriving_secs)
    }

    pub fn t_hello_period(&self) -> Duration {
        Duration::from_secs(self.t_hello_period_secs)
    }

    pub fn t_intra_burst(&self) -> Duration {
        Duration::from_millis(self.t_intra_burst_millis)
    }
}
