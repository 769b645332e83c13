//! src/host.rs
//!
//! Resolves this process's hostname once at startup. Grounded on
//! `examples/original_source/metrics.py`'s `Host.__init__`.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub hostname: String,
}

impl Host {
    pub fn local() -> Result<Self> {
        let hostname = hostname::get()
            .map_err(Error::Io)?
            .into_string()
            .map_err(|_| Error::InvalidHostname)?;
        Ok(Host { hostname })
    }
}
