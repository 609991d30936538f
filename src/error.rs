//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore custom della libreria.
//!
//! ## Responsabilità:
//! - Definisce `ConvertError` per gli errori di setup e di I/O
//! - Integra con `thiserror` per la conversione automatica
//! - Gli errori per-file (encoder, exiftool, webpmux) NON passano da qui:
//!   vengono registrati nel run log e la conversione prosegue
//!
//! ## Categorie di errori:
//! - `Io`: Errori di I/O generici
//! - `CreateDir`: Directory richiesta non creabile (fatale)
//! - `WorkDir`: Directory di lavoro non accessibile
//! - `MissingDependency`: Tool esterno mancante (cwebp, exiftool, webpmux)
//! - `UnsupportedFormat`: File non riconosciuto come PNG/TIFF/TGA/WEBP
//! - `Validation`: Errori di validazione configurazione

use std::path::PathBuf;

/// Custom error types for WebP conversion runs
#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{} could not be created, check you have permissions to modify this directory: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not enter working directory: {0}")]
    WorkDir(String),

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Unsupported image file: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Validation(String),
}
