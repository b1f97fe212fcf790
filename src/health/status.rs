//! Service descriptor and status report bodies.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};

use crate::config::ServiceConfig;
use crate::routing::{AddressingMode, ProxyUrlEncoder};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DESCRIPTION: &str =
    "CORS-relaxing forwarding proxy with HLS (m3u8) playlist rewriting";
const EXAMPLE_TARGET: &str = "https://example.com";
const MIB: f64 = 1024.0 * 1024.0;

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub version: &'static str,
    pub description: &'static str,
    pub usage: Usage,
    /// Path of the status endpoint.
    pub status: String,
}

/// One example proxy URL per addressing mode.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub query_param: String,
    pub path_param: String,
    pub base64: String,
}

impl ServiceDescriptor {
    pub fn new(service: &ServiceConfig, encoder: &ProxyUrlEncoder, base_path: &str) -> Self {
        Self {
            name: service.name.clone(),
            version: VERSION,
            description: DESCRIPTION,
            usage: Usage {
                query_param: encoder.encode_raw(AddressingMode::Query, EXAMPLE_TARGET),
                path_param: encoder.encode_raw(AddressingMode::Path, EXAMPLE_TARGET),
                base64: encoder.encode_raw(AddressingMode::Base64Path, EXAMPLE_TARGET),
            },
            status: format!("{base_path}/status"),
        }
    }
}

/// Body of `GET {base}/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: &'static str,
    pub version: &'static str,
    /// Seconds since the server started.
    pub uptime: f64,
    pub timestamp: String,
    pub environment: String,
    pub memory: MemoryUsage,
}

/// Process memory in MiB, two decimals.
#[derive(Debug, Clone, Copy, Serialize, Default, PartialEq)]
pub struct MemoryUsage {
    pub rss: f64,
    #[serde(rename = "virtual")]
    pub virtual_size: f64,
}

impl StatusReport {
    pub fn collect(service: &ServiceConfig, uptime: Duration) -> Self {
        Self {
            status: "ok",
            version: VERSION,
            uptime: uptime.as_secs_f64(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            environment: service.environment.clone(),
            memory: process_memory(),
        }
    }
}

/// Zeroes when the platform does not expose process statistics.
fn process_memory() -> MemoryUsage {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return MemoryUsage::default();
    };
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .map(|process| MemoryUsage {
            rss: to_mib(process.memory()),
            virtual_size: to_mib(process.virtual_memory()),
        })
        .unwrap_or_default()
}

fn to_mib(bytes: u64) -> f64 {
    (bytes as f64 / MIB * 100.0).round() / 100.0
}
