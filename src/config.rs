//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione di una conversione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri della run
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `workers`: Numero di worker paralleli (default: 6, 0 = default)
//! - `force_metadata`: Override del controllo metadata (None = euristica)
//! - `include_webp`: Converte anche i `.webp` esistenti (default: false)
//! - `recover`: Modalità recovery di una run interrotta (default: false)
//! - `auto_replace`: Sostituisce gli originali convertiti senza errori
//! - `logging`: Scrive i log per-worker in `WebpLogs/` (default: true)
//! - `metadata_timeout_secs`: Timeout della query exiftool (default: 5)
//! - `tools_dir`: Directory opzionale con cwebp/exiftool/webpmux
//!
//! ## Esempio:
//! ```rust
//! use cwd_webp_converter::Config;
//!
//! let config = Config {
//!     workers: 8,
//!     force_metadata: Some(true),
//!     ..Default::default()
//! };
//! config.validate().unwrap();
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConvertError;
use crate::metadata::MetadataVerdict;

/// Worker count used when none (or zero) is requested
pub const DEFAULT_WORKERS: usize = 6;

/// Seconds allowed for a single metadata dump
pub const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 5;

/// Configuration for a conversion run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of parallel workers
    pub workers: usize,
    /// Operator override for the metadata check
    pub force_metadata: Option<bool>,
    /// Treat existing WebP files as conversion input
    pub include_webp: bool,
    /// Reconcile against a previous, partially completed run
    pub recover: bool,
    /// Replace originals with their converted output when no errors were logged
    pub auto_replace: bool,
    /// Write per-worker log files
    pub logging: bool,
    /// Timeout for a metadata dump, in seconds
    pub metadata_timeout_secs: u64,
    /// Extra directory searched for the external tools before PATH
    pub tools_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            force_metadata: None,
            include_webp: false,
            recover: false,
            auto_replace: false,
            logging: true,
            metadata_timeout_secs: DEFAULT_METADATA_TIMEOUT_SECS,
            tools_dir: None,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.metadata_timeout_secs == 0 {
            return Err(ConvertError::Validation(
                "Metadata timeout must be greater than 0 seconds".to_string(),
            )
            .into());
        }

        if let Some(ref tools_dir) = self.tools_dir {
            if !tools_dir.is_dir() {
                return Err(ConvertError::Validation(format!(
                    "Tools directory does not exist: {}",
                    tools_dir.display()
                ))
                .into());
            }
        }

        Ok(())
    }

    /// Worker count actually used; missing or zero falls back to the default
    pub fn effective_workers(&self) -> usize {
        Self::resolve_workers(Some(self.workers))
    }

    /// Resolve a requested worker count
    pub fn resolve_workers(requested: Option<usize>) -> usize {
        match requested {
            Some(n) if n > 0 => n,
            _ => DEFAULT_WORKERS,
        }
    }

    /// The operator override as a verdict, if any
    pub fn metadata_override(&self) -> Option<MetadataVerdict> {
        self.force_metadata.map(MetadataVerdict::forced)
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
