//! src/sampling.rs
//!
//! Reads the local samples an Agent pushes. Grounded on
//! `examples/original_source/metrics.py`'s `UptimeCollector` and
//! `MeminfoCollector`: uptime is a "metrics" (fast-changing) sample,
//! memory totals are "model" (slow-changing) attributes, and
//! `/proc/meminfo`'s free/cached/dirty figures are "metrics" samples.

use crate::codec::MetricsKind;
use std::fs;

/// Produces the named `(metric, value)` pairs an Agent reports for a given
/// [`MetricsKind`]. Implementations must not block the event loop for long;
/// reading `/proc` files is effectively non-blocking on Linux.
pub trait Sampler: Send + Sync {
    fn sample(&self, kind: MetricsKind) -> Vec<(String, f64)>;
}

/// Samples `/proc/uptime` and `/proc/meminfo`.
pub struct ProcSampler;

impl Sampler for ProcSampler {
    fn sample(&self, kind: MetricsKind) -> Vec<(String, f64)> {
        match kind {
            MetricsKind::Metrics => {
                let mut samples = uptime_sample();
                samples.extend(meminfo_samples(METRICS_FIELDS));
                samples
            }
            MetricsKind::Model => meminfo_samples(MODEL_FIELDS),
        }
    }
}

const METRICS_FIELDS: &[(&str, &str)] = &[
    ("MemFree", "mem.free"),
    ("MemAvailable", "mem.avail"),
    ("Buffers", "mem.buffers"),
    ("Cached", "mem.cached"),
    ("Dirty", "mem.dirty"),
    ("Writeback", "mem.writeback"),
    ("SwapFree", "mem.swap.free"),
];

const MODEL_FIELDS: &[(&str, &str)] = &[("MemTotal", "mem.total"), ("SwapTotal", "mem.swap.total")];

fn uptime_sample() -> Vec<(String, f64)> {
    let contents = match fs::read_to_string("/proc/uptime") {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };
    match contents.split_whitespace().next().and_then(|s| s.parse::<f64>().ok()) {
        Some(seconds) => vec![("sys.uptime".to_string(), seconds)],
        None => Vec::new(),
    }
}

fn meminfo_samples(fields: &[(&str, &str)]) -> Vec<(String, f64)> {
    let contents = match fs::read_to_string("/proc/meminfo") {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };
    let mut samples = Vec::new();
    for line in contents.lines() {
        let mut parts = line.split_whitespace();
        let Some(raw_key) = parts.next() else { continue };
        let Some(key) = raw_key.strip_suffix(':') else { continue };
        let Some((_, metric_name)) = fields.iter().find(|(proc_key, _)| *proc_key == key) else {
            continue;
        };
        if let Some(value) = parts.next().and_then(|v| v.parse::<f64>().ok()) {
            samples.push((metric_name.to_string(), value));
        }
    }
    samples
}
