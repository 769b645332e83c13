//! src/codec.rs
//!
//! The wire format: every `Message` is an ordered sequence of opaque byte
//! frames ("multi-part message"); the unit of delivery is the whole sequence.
//! Frame 0 is always an ASCII tag identifying the variant. A frame sequence
//! that does not match any tag exactly, or fails its variant's arity check,
//! decodes to `None` — the caller discards it and keeps the connection open.
//!
//! Grounded on `examples/original_source/zmq_msg_core.py` (`MultiPartMessage`)
//! and `zmq_msg_metrics.py` (`ControlMessage`, `MetricsMessage`,
//! `ClientMetricsMessage`), which define exactly this tag-then-frames shape.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const TAG_CONTROL: &[u8] = b"CTRL";
pub const TAG_METRICS: &[u8] = b"METR";
pub const TAG_CLIENT_METRICS: &[u8] = b"CMET";

/// An opaque, structured per-host metrics payload.
///
/// The core treats this as opaque except for the `hostname`/`kind` flags
/// that travel alongside it on the wire. The shape mirrors
/// `examples/original_source/metrics.py: CollectionGrid.get_grid()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MetricGrid {
    pub metric_names: Vec<String>,
    /// One row per host: a value/timestamp pair per `metric_names` index, in
    /// order, or `None` if that host had no sample for that metric.
    pub hosts: HashMap<String, Vec<Option<(f64, f64)>>>,
}

/// Whether a `Metrics` frame carries slow-changing "model" attributes or
/// fast-changing "metrics" samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricsKind {
    Model,
    Metrics,
}

impl MetricsKind {
    fn as_str(self) -> &'static str {
        match self {
            MetricsKind::Model => "model",
            MetricsKind::Metrics => "metrics",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "model" => Some(MetricsKind::Model),
            "metrics" => Some(MetricsKind::Metrics),
            _ => None,
        }
    }
}

/// The four message shapes exchanged between agents, the collector, and
/// clients. Unknown variants are represented by `decode` simply returning
/// `None` — they are never constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Control {
        kind: String,
    },
    Metrics {
        hostname: String,
        grid: MetricGrid,
        kind: MetricsKind,
    },
    ClientMetrics {
        payload: HashMap<String, MetricGrid>,
    },
}

impl Message {
    pub fn control(kind: impl Into<String>) -> Self {
        Message::Control { kind: kind.into() }
    }

    pub fn hello() -> Self {
        Message::control("hello")
    }

    pub fn model_request() -> Self {
        Message::control("model")
    }

    pub fn ping() -> Self {
        Message::control("ping")
    }

    pub fn is_control_kind(&self, kind: &str) -> bool {
        matches!(self, Message::Control { kind: k } if k == kind)
    }

    /// Encode into the ordered, length-prefixable frame sequence used on the wire.
    pub fn encode(&self) -> Vec<Vec<u8>> {
        match self {
            Message::Control { kind } => vec![TAG_CONTROL.to_vec(), kind.as_bytes().to_vec()],
            Message::Metrics {
                hostname,
                grid,
                kind,
            } => {
                let grid_json =
                    serde_json::to_vec(grid).expect("MetricGrid is always JSON-serializable");
                vec![
                    TAG_METRICS.to_vec(),
                    hostname.as_bytes().to_vec(),
                    grid_json,
                    kind.as_str().as_bytes().to_vec(),
                ]
            }
            Message::ClientMetrics { payload } => {
                let payload_json =
                    serde_json::to_vec(payload).expect("payload is always JSON-serializable");
                vec![TAG_CLIENT_METRICS.to_vec(), payload_json]
            }
        }
    }

    /// Decode a frame sequence. Returns `None` for anything that doesn't
    /// match a known tag exactly or fails its arity/content check — callers
    /// must discard silently rather than treat this as a fatal error.
    pub fn decode(frames: &[Vec<u8>]) -> Option<Message> {
        let tag = frames.first()?.as_slice();
        match tag {
            TAG_CONTROL => {
                if frames.len() != 2 {
                    return None;
                }
                let kind = String::from_utf8(frames[1].clone()).ok()?;
                Some(Message::Control { kind })
            }
            TAG_METRICS => {
                if frames.len() != 4 {
                    return None;
                }
                let hostname = String::from_utf8(frames[1].clone()).ok()?;
                let grid: MetricGrid = serde_json::from_slice(&frames[2]).ok()?;
                let kind_str = String::from_utf8(frames[3].clone()).ok()?;
                let kind = MetricsKind::from_str(&kind_str)?;
                Some(Message::Metrics {
                    hostname,
                    grid,
                    kind,
                })
            }
            TAG_CLIENT_METRICS => {
                if frames.len() != 2 {
                    return None;
                }
                let payload: HashMap<String, MetricGrid> = serde_json::from_slice(&frames[1]).ok()?;
                Some(Message::ClientMetrics { payload })
            }
            _ => None,
        }
    }
}
