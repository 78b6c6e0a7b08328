//! Pipeline orchestration: one document in, one [`ExtractionResult`] out.
//!
//! ```text
//! DocumentSource
//!  │
//!  ├─ 1. Normalise  borrow seekable input / materialise a temp file
//!  ├─ 2. Sniff      XSL-FO markers in the first window of bytes
//!  ├─ 3. Render     FO only: rendering service → in-memory PDF
//!  ├─ 4. Extract    extraction service → metadata + content
//!  ├─ 5. Assemble   {metadata, content}
//!  └─ 6. Release    owned temp file removed on every exit path
//! ```
//!
//! A [`ContentExtractor`] is cheap to clone and safe to share: it holds the
//! read-only config and one pooled `reqwest::Client` used for both services.

use crate::cancel::CancellationSignal;
use crate::config::ExtractorConfig;
use crate::error::ExtractError;
use crate::output::{self, ExtractionResult};
use crate::pipeline::extract::ExtractionClient;
use crate::pipeline::render::RenderClient;
use crate::pipeline::sniff;
use crate::pipeline::source::{self, DocumentSource, ForwardRead, MaterializedSource};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::File;
use tracing::{debug, info, warn};

/// Routes documents through the rendering and extraction services.
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    config: Arc<ExtractorConfig>,
    render: RenderClient,
    extraction: ExtractionClient,
}

impl ContentExtractor {
    /// Create an extractor with its own pooled HTTP client.
    pub fn new(config: ExtractorConfig) -> Result<Self, ExtractError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ExtractError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Self::with_client(config, http)
    }

    /// Create an extractor that shares an existing HTTP client.
    pub fn with_client(config: ExtractorConfig, http: reqwest::Client) -> Result<Self, ExtractError> {
        let render = RenderClient::new(
            http.clone(),
            &config.rendering_base()?,
            config.max_error_body_bytes,
        )?;
        let extraction = ExtractionClient::new(
            http,
            &config.extraction_base()?,
            config.max_error_body_bytes,
        )?;
        Ok(Self {
            config: Arc::new(config),
            render,
            extraction,
        })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Run the pipeline and return the serialised result.
    ///
    /// Output shape: `{"metadata":{...},"content":"..."}`.
    pub async fn extract_content(
        &self,
        source: DocumentSource<'_>,
        password: Option<&str>,
    ) -> Result<String, ExtractError> {
        self.extract(source, password).await.map(|r| r.to_json())
    }

    /// Run the pipeline on one document.
    pub async fn extract(
        &self,
        source: DocumentSource<'_>,
        password: Option<&str>,
    ) -> Result<ExtractionResult, ExtractError> {
        self.extract_cancellable(source, password, &CancellationSignal::new())
            .await
    }

    /// Run the pipeline, aborting at the next suspension point once `cancel` is raised.
    ///
    /// # Errors
    /// Returns `Err(ExtractError)` for fatal failures only: the input stream
    /// could not be read or buffered, a service was unreachable or answered
    /// non-2xx, or the signal was raised ([`ExtractError::Cancelled`]). A
    /// malformed extraction response is not an error.
    ///
    /// Any temp file created for a forward-only input is removed before this
    /// returns, whichever way it returns.
    pub async fn extract_cancellable(
        &self,
        source: DocumentSource<'_>,
        password: Option<&str>,
        cancel: &CancellationSignal,
    ) -> Result<ExtractionResult, ExtractError> {
        let started = Instant::now();
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        info!(
            "Starting extraction ({} input)",
            if source.is_seekable() { "seekable" } else { "forward-only" }
        );

        // ── Step 1: Normalise ────────────────────────────────────────────
        // Dropping the copy future on cancellation drops its TempPath, which
        // deletes the partial file.
        let temp_dir = self.config.temp_dir.as_deref();
        let mut materialized = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExtractError::Cancelled),
            m = source::ensure_seekable(source, temp_dir) => m?,
        };

        // ── Steps 2–5 ────────────────────────────────────────────────────
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExtractError::Cancelled),
            r = self.run_stages(&mut materialized, password) => r,
        };

        // ── Step 6: Release ──────────────────────────────────────────────
        materialized.release().await;

        let elapsed_ms = started.elapsed().as_millis();
        match &outcome {
            Ok(result) => info!(
                "Extraction complete: {} metadata fields, {} content bytes, {}ms",
                result.metadata.len(),
                result.content.len(),
                elapsed_ms
            ),
            Err(e) => warn!("Extraction failed after {}ms: {}", elapsed_ms, e),
        }
        outcome
    }

    async fn run_stages(
        &self,
        source: &mut MaterializedSource<'_>,
        password: Option<&str>,
    ) -> Result<ExtractionResult, ExtractError> {
        source.rewind().await?;
        let is_fo = sniff::looks_like_fo(source.reader(), self.config.sniff_window)
            .await
            .map_err(|e| ExtractError::Io {
                stage: "sniffing the document format",
                source: e,
            })?;

        let response = if is_fo {
            info!("XSL-FO detected; rendering before extraction");
            source.rewind().await?;
            let mut rendered = self.render.convert(source.reader()).await?;
            rendered.set_position(0);
            self.extraction.extract(&mut rendered, password).await?
        } else {
            debug!("Not XSL-FO; extracting directly");
            source.rewind().await?;
            self.extraction.extract(source.reader(), password).await?
        };

        if response.is_fallback() {
            warn!("Extraction response was not the expected JSON; using the raw body as content");
        }
        let (metadata, content) = response.into_parts();
        Ok(output::assemble(metadata, content))
    }

    /// Extract from a file on disk. The file is read in place, never copied.
    pub async fn extract_file(
        &self,
        path: impl AsRef<Path>,
        password: Option<&str>,
    ) -> Result<ExtractionResult, ExtractError> {
        self.extract_file_cancellable(path, password, &CancellationSignal::new())
            .await
    }

    pub async fn extract_file_cancellable(
        &self,
        path: impl AsRef<Path>,
        password: Option<&str>,
        cancel: &CancellationSignal,
    ) -> Result<ExtractionResult, ExtractError> {
        let mut file = open_document(path.as_ref()).await?;
        self.extract_cancellable(DocumentSource::seekable(&mut file), password, cancel)
            .await
    }

    /// Extract from bytes already in memory.
    pub async fn extract_bytes(
        &self,
        bytes: &[u8],
        password: Option<&str>,
    ) -> Result<ExtractionResult, ExtractError> {
        let mut cursor = Cursor::new(bytes);
        self.extract(DocumentSource::seekable(&mut cursor), password)
            .await
    }

    /// Extract from a forward-only reader (stdin, a socket, a decoder, …).
    ///
    /// The reader is buffered to a temp file first; see
    /// [`crate::pipeline::source::ensure_seekable`].
    pub async fn extract_reader<R: ForwardRead>(
        &self,
        reader: &mut R,
        password: Option<&str>,
    ) -> Result<ExtractionResult, ExtractError> {
        self.extract(DocumentSource::stream(reader), password).await
    }

    /// Extract and write the pretty-printed JSON result to `output_path`.
    ///
    /// See [`ExtractionResult::write_to_file`].
    pub async fn extract_to_file(
        &self,
        source: DocumentSource<'_>,
        password: Option<&str>,
        output_path: impl AsRef<Path>,
    ) -> Result<ExtractionResult, ExtractError> {
        let result = self.extract(source, password).await?;
        result.write_to_file(output_path).await?;
        Ok(result)
    }
}

/// Open a document, mapping the common failures to input errors.
async fn open_document(path: &Path) -> Result<File, ExtractError> {
    let map_open_error = |e: std::io::Error| match e.kind() {
        std::io::ErrorKind::NotFound => ExtractError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ExtractError::Io {
            stage: "opening the document",
            source: e,
        },
    };

    let meta = tokio::fs::metadata(path).await.map_err(map_open_error)?;
    if !meta.is_file() {
        return Err(ExtractError::InvalidInput {
            input: path.display().to_string(),
            reason: "not a regular file".into(),
        });
    }
    debug!("Opening document {} ({} bytes)", path.display(), meta.len());
    File::open(path).await.map_err(map_open_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ContentExtractor {
        ContentExtractor::new(ExtractorConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn missing_file_is_rejected_before_any_request() {
        let err = extractor()
            .extract_file("/definitely/not/a/real/file.fo", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn directory_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = extractor().extract_file(dir.path(), None).await.unwrap_err();
        assert!(matches!(err, ExtractError::InvalidInput { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn pre_raised_signal_short_circuits() {
        let signal = CancellationSignal::new();
        signal.cancel();
        let mut stream: &[u8] = b"never read";
        let err = extractor()
            .extract_cancellable(DocumentSource::stream(&mut stream), None, &signal)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Cancelled));
        assert_eq!(stream.len(), 10, "input must not be consumed");
    }

    #[test]
    fn clients_share_configured_bases() {
        let config = ExtractorConfig::builder()
            .extraction_url("http://tika.local:9998")
            .rendering_url("http://fop.local:8080")
            .build()
            .unwrap();
        let extractor = ContentExtractor::new(config).unwrap();
        assert_eq!(
            extractor.extraction.endpoint().as_str(),
            "http://tika.local:9998/rmeta/text"
        );
        assert_eq!(extractor.render.endpoint().as_str(), "http://fop.local:8080/convert");
    }
}
