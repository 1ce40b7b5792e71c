use crate::model::Perspective;
use std::path::PathBuf;

use super::types::PerspectiveSlot;

pub fn default_version() -> u32 {
    1
}

pub fn default_host() -> String {
    "127.0.0.1".to_string()
}

pub fn default_port() -> u16 {
    5780
}

pub fn default_database() -> PathBuf {
    PathBuf::from("crowdwork.db")
}

pub fn default_keepalive_secs() -> u64 {
    15
}

pub fn default_concurrency() -> usize {
    6
}

pub fn default_launch_delay_ms() -> u64 {
    150
}

pub fn default_base_url() -> String {
    "http://127.0.0.1:8900".to_string()
}

pub fn default_model() -> String {
    "improv-1".to_string()
}

pub fn default_timeout_sec() -> u64 {
    120
}

pub fn default_perspectives() -> Vec<PerspectiveSlot> {
    Perspective::ALL
        .iter()
        .map(|&kind| PerspectiveSlot {
            kind,
            enabled: true,
        })
        .collect()
}

pub fn default_true() -> bool {
    true
}
