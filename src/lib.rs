//! # smart-extract
//!
//! Pull text and metadata out of documents through two HTTP services, and
//! render XSL-FO to PDF on the way when the input turns out to be FO.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document (seekable or forward-only)
//!  │
//!  ├─ 1. Normalise  forward-only input is buffered to a temp file
//!  ├─ 2. Sniff      first 16 KiB checked for XSL-FO markers
//!  ├─ 3. Render     FO only: POST multipart → rendering service → PDF
//!  ├─ 4. Extract    PUT → extraction service (rmeta/text) → JSON
//!  ├─ 5. Assemble   {"metadata":{...},"content":"..."}
//!  └─ 6. Release    temp file deleted on success, failure, or cancellation
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smart_extract::{ContentExtractor, ExtractorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractorConfig::builder()
//!         .extraction_url("http://localhost:9998/")
//!         .rendering_url("http://localhost:8080/")
//!         .build()?;
//!     let extractor = ContentExtractor::new(config)?;
//!
//!     let result = extractor.extract_file("invoice.fo", None).await?;
//!     println!("{}", result.content);
//!     for (name, value) in result.metadata.iter() {
//!         eprintln!("{name}: {value}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `smart-extract` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! smart-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod error;
pub mod extractor;
pub mod output;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::CancellationSignal;
pub use config::{ExtractorConfig, ExtractorConfigBuilder};
pub use error::ExtractError;
pub use extractor::ContentExtractor;
pub use output::{assemble, ExtractionResult, Metadata};
pub use pipeline::extract::ParsedResponse;
pub use pipeline::source::{ensure_seekable, DocumentSource, MaterializedSource};
