//! Mount option parsing.
//!
//! Options arrive as the comma-separated `key=value` string a host passes
//! at mount time:
//!
//! ```text
//! rsize=8192,wsize=16384
//! ```
//!
//! Parsing never fails. Every rejected option is logged and returned as a
//! [`MountOptionError`], and the affected setting keeps its default.

use serde::{Deserialize, Serialize};

use crate::error::MountOptionError;
use crate::page_store::PAGE_SIZE;

/// Default read and write chunk size: one host page.
pub const DEFAULT_CHUNK_SIZE: u32 = PAGE_SIZE as u32;

/// Per-mount configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountOptions {
    /// Bytes copied per step when reading.
    pub read_chunk_size: u32,
    /// Bytes copied per step when writing; also the reported block size.
    pub write_chunk_size: u32,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_CHUNK_SIZE,
            write_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Options plus the diagnostics produced while parsing them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOptions {
    pub options: MountOptions,
    pub warnings: Vec<MountOptionError>,
}

impl MountOptions {
    /// Parse a mount option string.
    pub fn parse(input: &str) -> ParsedOptions {
        let mut parsed = ParsedOptions::default();

        for segment in input.split(',') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let (key, value) = match segment.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (segment, None),
            };

            let slot = match key {
                "rsize" => &mut parsed.options.read_chunk_size,
                "wsize" => &mut parsed.options.write_chunk_size,
                _ => {
                    parsed.reject(MountOptionError::UnknownKey {
                        key: key.to_string(),
                    });
                    continue;
                }
            };

            match parse_chunk_size(key, value) {
                Ok(size) => *slot = size,
                Err(e) => parsed.reject(e),
            }
        }

        parsed
    }
}

impl ParsedOptions {
    fn reject(&mut self, err: MountOptionError) {
        tracing::warn!(option = %err.key(), "myfs: {}", err);
        self.warnings.push(err);
    }
}

fn parse_chunk_size(key: &str, value: Option<&str>) -> Result<u32, MountOptionError> {
    let value = value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| MountOptionError::MissingValue {
            key: key.to_string(),
        })?;

    let n: i64 = value.parse().map_err(|_| MountOptionError::Malformed {
        key: key.to_string(),
        value: value.to_string(),
    })?;
    if n <= 0 {
        return Err(MountOptionError::NonPositive {
            key: key.to_string(),
            value: n,
        });
    }
    u32::try_from(n).map_err(|_| MountOptionError::Malformed {
        key: key.to_string(),
        value: value.to_string(),
    })
}
