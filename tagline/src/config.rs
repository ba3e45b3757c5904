// Copyright 2024 Tagline Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Environment configuration for the tagline driver.
//!
//! The constants in the design ("provided by the environment, not chosen by
//! this spec") are bundled into [`DriverConfig`]. Values are layered
//! lowest-to-highest priority: compiled-in [`Default`], an optional TOML
//! file, then explicit overrides from the embedding binary.

use std::path::Path;

use crate::error::{DriverError, Result};

/// Environment constants plus the RAID server's socket address.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Number of physical disks in the RAID array.
    pub disk_count: u8,
    /// Blocks per disk.
    pub disk_blocks: u32,
    /// Bytes per block.
    pub block_size: u32,
    /// Blocks per track; only affects the `INIT` opcode.
    pub track_blocks: u32,
    /// Largest legal block index within a tag.
    pub max_tag_blocks: u32,
    /// Fixed-capacity cache size, in cache lines.
    pub cache_capacity: usize,
    /// Address of the remote RAID server, e.g. `"127.0.0.1:9000"`.
    pub server_addr: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            disk_count: 4,
            disk_blocks: 1 << 16,
            block_size: 512,
            track_blocks: 32,
            max_tag_blocks: 1 << 12,
            cache_capacity: 64,
            server_addr: "127.0.0.1:9000".to_string(),
        }
    }
}

impl DriverConfig {
    /// Load a config by layering compiled-in defaults under an optional
    /// TOML file. Missing file is not an error: the defaults stand alone.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(path) = path {
            match std::fs::read_to_string(path) {
                Ok(raw) => {
                    cfg = toml::from_str(&raw)
                        .map_err(|e| DriverError::Alloc(format!("invalid config file: {e}")))?;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(DriverError::Alloc(format!(
                        "could not read config file {}: {e}",
                        path.display()
                    )))
                }
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the invariants the engine relies on before any socket is opened.
    pub fn validate(&self) -> Result<()> {
        if self.disk_count < 2 {
            return Err(DriverError::Alloc(
                "disk_count must be at least 2 for primary/backup mirroring".into(),
            ));
        }
        if self.block_size == 0 {
            return Err(DriverError::Alloc("block_size must be non-zero".into()));
        }
        if self.disk_blocks == 0 {
            return Err(DriverError::Alloc("disk_blocks must be non-zero".into()));
        }
        if self.track_blocks == 0 {
            return Err(DriverError::Alloc("track_blocks must be non-zero".into()));
        }
        if self.max_tag_blocks == 0 {
            return Err(DriverError::Alloc("max_tag_blocks must be non-zero".into()));
        }
        if self.cache_capacity == 0 {
            return Err(DriverError::Alloc("cache_capacity must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        DriverConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_single_disk() {
        let mut cfg = DriverConfig::default();
        cfg.disk_count = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = DriverConfig::load(Some(Path::new("/nonexistent/tagline.toml"))).unwrap();
        assert_eq!(cfg.disk_count, DriverConfig::default().disk_count);
    }

    #[test]
    fn loads_overrides_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tagline.toml");
        std::fs::write(&path, "disk_count = 6\nserver_addr = \"10.0.0.1:7000\"\n").unwrap();
        let cfg = DriverConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.disk_count, 6);
        assert_eq!(cfg.server_addr, "10.0.0.1:7000");
        // Unspecified keys keep their defaults thanks to #[serde(default)].
        assert_eq!(cfg.block_size, DriverConfig::default().block_size);
    }
}
