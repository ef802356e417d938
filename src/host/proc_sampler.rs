// Linux /proc memory sampler — best-effort, absent capability on other hosts.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Result};
use tokio::time::Instant;
use tracing::debug;

use super::traits::{MemorySample, MemorySampler};

/// Reads process and system memory figures from `/proc`.
///
/// `used_bytes` comes from `VmRSS` in `/proc/self/status`, `total_bytes`
/// from `MemTotal` in `/proc/meminfo`, and `limit_bytes` from the cgroup
/// v2 `memory.max` file when one applies (falling back to `MemTotal`).
/// Any parse failure is an error the monitor treats as "no sampler".
pub struct ProcSampler;

impl ProcSampler {
    pub fn new() -> Self {
        Self
    }

    fn read_kb_field(path: &str, field: &str) -> Result<u64> {
        let text = fs::read_to_string(path)?;
        for line in text.lines() {
            if let Some(rest) = line.strip_prefix(field) {
                let kb: u64 = rest
                    .trim_start_matches(':')
                    .trim()
                    .trim_end_matches("kB")
                    .trim()
                    .parse()
                    .map_err(|e| anyhow!("bad {} in {}: {}", field, path, e))?;
                return Ok(kb * 1024);
            }
        }
        Err(anyhow!("{} not found in {}", field, path))
    }

    fn cgroup_limit(total_bytes: u64) -> u64 {
        let path = Path::new("/sys/fs/cgroup/memory.max");
        match fs::read_to_string(path) {
            Ok(text) => {
                let text = text.trim();
                if text == "max" {
                    total_bytes
                } else {
                    text.parse().unwrap_or(total_bytes)
                }
            }
            Err(e) => {
                debug!("cgroup memory.max unreadable: {}", e);
                total_bytes
            }
        }
    }
}

impl Default for ProcSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for ProcSampler {
    fn sample(&self) -> Result<MemorySample> {
        let used_bytes = Self::read_kb_field("/proc/self/status", "VmRSS")?;
        let total_bytes = Self::read_kb_field("/proc/meminfo", "MemTotal")?;
        let limit_bytes = Self::cgroup_limit(total_bytes);

        Ok(MemorySample {
            used_bytes,
            total_bytes,
            limit_bytes,
            at: Instant::now(),
        })
    }
}
