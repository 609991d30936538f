//! # CWD to WebP Converter Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per i test di integrazione
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore custom
//! - `file_manager`: Discovery immagini e layout della directory di lavoro
//! - `metadata`: Classificazione e trasferimento dei metadata
//! - `tools`: Invocazione dei tool esterni (`cwebp`, `exiftool`, `webpmux`)
//! - `tool_resolver`: Ricerca dei tool nel tools dir e nel PATH
//! - `run_log`: Log per-worker e lista degli errori
//! - `converter`: Worker pool, recovery e orchestratore
//! - `progress`: Progress bar e riepilogo finale
//!
//! ## Utilizzo:
//! ```rust,no_run
//! use std::sync::Arc;
//! use cwd_webp_converter::{Config, SystemRunner, WebpConverter};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::default();
//! let runner = Arc::new(SystemRunner::new(config.tools_dir.clone()));
//! let converter = WebpConverter::new(".", config, runner)?;
//! let summary = converter.run().await?;
//! println!("{}", summary.format_summary());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod converter;
pub mod error;
pub mod file_manager;
pub mod metadata;
pub mod progress;
pub mod run_log;
pub mod tool_resolver;
pub mod tools;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use converter::{RunContext, WebpConverter};
pub use error::ConvertError;
pub use file_manager::{ImageFile, SourceFormat};
pub use progress::RunSummary;
pub use tools::{CommandRunner, SystemRunner, Tool, ToolInvocation, ToolOutput};
