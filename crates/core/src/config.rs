//! Log configuration
//!
//! All tunables are passed explicitly at construction; nothing is read
//! from process-wide state. A config can be built in code or loaded from
//! a TOML file:
//!
//! ```toml
//! [segment]
//! max_store_bytes = 1048576
//! max_index_bytes = 12288
//! initial_offset = 0
//!
//! [security]
//! ca_file = "/etc/seglog/ca.pem"
//! acl_policy_file = "/etc/seglog/policy.csv"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Fallback used when a size limit is configured as 0.
pub const DEFAULT_SEGMENT_BYTES: u64 = 1024;

/// Width of one index entry: 4-byte relative offset + 8-byte position.
pub const INDEX_ENTRY_WIDTH: u64 = 12;

/// Per-segment size limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Store size at which a segment counts as maxed.
    #[serde(default = "default_segment_bytes")]
    pub max_store_bytes: u64,

    /// Index capacity. The index file is padded to this size while open.
    #[serde(default = "default_segment_bytes")]
    pub max_index_bytes: u64,

    /// Base offset of the first segment of a fresh log.
    #[serde(default)]
    pub initial_offset: u64,
}

fn default_segment_bytes() -> u64 {
    DEFAULT_SEGMENT_BYTES
}

impl Default for SegmentConfig {
    fn default() -> Self {
        SegmentConfig {
            max_store_bytes: DEFAULT_SEGMENT_BYTES,
            max_index_bytes: DEFAULT_SEGMENT_BYTES,
            initial_offset: 0,
        }
    }
}

impl SegmentConfig {
    /// Replace zero size limits with [`DEFAULT_SEGMENT_BYTES`].
    pub fn normalized(mut self) -> Self {
        if self.max_store_bytes == 0 {
            self.max_store_bytes = DEFAULT_SEGMENT_BYTES;
        }
        if self.max_index_bytes == 0 {
            self.max_index_bytes = DEFAULT_SEGMENT_BYTES;
        }
        self
    }

    /// Validate limits.
    ///
    /// The index must be able to hold at least one entry. Zero limits are
    /// accepted because [`SegmentConfig::normalized`] replaces them.
    pub fn validate(&self) -> Result<()> {
        if self.max_index_bytes != 0 && self.max_index_bytes < INDEX_ENTRY_WIDTH {
            return Err(Error::InvalidConfig(format!(
                "max_index_bytes must be at least {} (one entry), got {}",
                INDEX_ENTRY_WIDTH, self.max_index_bytes
            )));
        }
        if self.max_index_bytes > usize::MAX as u64 {
            return Err(Error::InvalidConfig(format!(
                "max_index_bytes {} cannot be memory-mapped on this platform",
                self.max_index_bytes
            )));
        }
        Ok(())
    }
}

/// Certificate and authorization policy paths.
///
/// The engine never reads these; they are carried for the network layer
/// so that it does not depend on environment-derived globals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// CA certificate used to verify peers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    /// Server certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_cert_file: Option<PathBuf>,
    /// Server private key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_key_file: Option<PathBuf>,
    /// Access-control model definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl_model_file: Option<PathBuf>,
    /// Access-control policy table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl_policy_file: Option<PathBuf>,
}

impl SecurityConfig {
    /// Build the conventional file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        SecurityConfig {
            ca_file: Some(dir.join("ca.pem")),
            server_cert_file: Some(dir.join("server.pem")),
            server_key_file: Some(dir.join("server-key.pem")),
            acl_model_file: Some(dir.join("model.conf")),
            acl_policy_file: Some(dir.join("policy.csv")),
        }
    }
}

/// Top-level configuration for a commit log instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Segment size limits and initial offset
    #[serde(default)]
    pub segment: SegmentConfig,

    /// Paths consumed by the network layer
    #[serde(default)]
    pub security: SecurityConfig,
}

impl LogConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the store size limit (builder pattern).
    pub fn with_max_store_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_store_bytes = bytes;
        self
    }

    /// Set the index capacity (builder pattern).
    pub fn with_max_index_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_index_bytes = bytes;
        self
    }

    /// Set the initial offset of a fresh log (builder pattern).
    pub fn with_initial_offset(mut self, offset: u64) -> Self {
        self.segment.initial_offset = offset;
        self
    }

    /// Set the security paths (builder pattern).
    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    /// Create a configuration with small segments for faster rotation in tests.
    pub fn for_testing() -> Self {
        LogConfig::new()
            .with_max_store_bytes(1024)
            .with_max_index_bytes(1024)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        self.segment.validate()
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: LogConfig = toml::from_str(content)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::InvalidConfig(msg) => {
                Error::InvalidConfig(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfig(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
