//! src/display.rs
//!
//! The Client's opaque UI hook: called once with each received frame. The
//! terminal UI that draws bars and numbers is out of scope; this is the
//! minimal collaborator needed to run the `client` binary end-to-end.

use crate::codec::Message;

pub trait Display: Send + Sync {
    fn show(&self, frame: &Message);
}

pub struct StdoutDisplay;

impl Display for StdoutDisplay {
    fn show(&self, frame: &Message) {
        match frame {
            Message::Control { kind } => println!("[control] {kind}"),
            Message::Metrics { hostname, grid, kind } => {
                println!(
                    "[{kind:?}] {hostname}: {} metrics across {} host(s)",
                    grid.metric_names.len(),
                    grid.hosts.len()
                );
            }
            Message::ClientMetrics { payload } => {
                println!("[client-metrics] {} host(s)", payload.len());
            }
        }
    }
}
