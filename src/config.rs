//! Configuration for the extraction pipeline.
//!
//! All pipeline behaviour is controlled through [`ExtractorConfig`], built via
//! its [`ExtractorConfigBuilder`]. The config is read-only once built and is
//! shared by every invocation of a [`crate::ContentExtractor`].

use crate::error::ExtractError;
use reqwest::Url;
use std::path::PathBuf;

/// Default base address of the extraction service.
pub const DEFAULT_EXTRACTION_URL: &str = "http://tika:9998/";

/// Default base address of the rendering service.
pub const DEFAULT_RENDERING_URL: &str = "http://fop:8080/";

/// Configuration for a [`crate::ContentExtractor`].
///
/// # Example
/// ```rust
/// use smart_extract::ExtractorConfig;
///
/// let config = ExtractorConfig::builder()
///     .extraction_url("http://localhost:9998")
///     .rendering_url("http://localhost:8080")
///     .request_timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.extraction_url, "http://localhost:9998/");
/// ```
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Base address of the metadata + text extraction service. Default: `http://tika:9998/`.
    ///
    /// Always stored with a trailing slash so endpoint paths join beneath it.
    pub extraction_url: String,

    /// Base address of the XSL-FO rendering service. Default: `http://fop:8080/`.
    pub rendering_url: String,

    /// Number of leading bytes the FO sniffer inspects. Default: 16 KiB.
    pub sniff_window: usize,

    /// TCP connect timeout for both services, in seconds. Default: 10.
    pub connect_timeout_secs: u64,

    /// Whole-request timeout for both services, in seconds. Default: 300.
    ///
    /// Large documents take a while to parse upstream; the timeout covers the
    /// upload, the remote processing and the response body.
    pub request_timeout_secs: u64,

    /// Maximum bytes of a remote error body kept in the error message. Default: 8 KiB.
    pub max_error_body_bytes: usize,

    /// Directory for materialized forward-only streams. Default: OS temp dir.
    pub temp_dir: Option<PathBuf>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            extraction_url: DEFAULT_EXTRACTION_URL.to_string(),
            rendering_url: DEFAULT_RENDERING_URL.to_string(),
            sniff_window: 16 * 1024,
            connect_timeout_secs: 10,
            request_timeout_secs: 300,
            max_error_body_bytes: 8 * 1024,
            temp_dir: None,
        }
    }
}

impl ExtractorConfig {
    /// Create a new builder for `ExtractorConfig`.
    pub fn builder() -> ExtractorConfigBuilder {
        ExtractorConfigBuilder {
            config: Self::default(),
        }
    }

    /// Parsed base address of the extraction service.
    pub fn extraction_base(&self) -> Result<Url, ExtractError> {
        parse_base_url("extraction_url", &self.extraction_url)
    }

    /// Parsed base address of the rendering service.
    pub fn rendering_base(&self) -> Result<Url, ExtractError> {
        parse_base_url("rendering_url", &self.rendering_url)
    }
}

/// Builder for [`ExtractorConfig`].
#[derive(Debug)]
pub struct ExtractorConfigBuilder {
    config: ExtractorConfig,
}

impl ExtractorConfigBuilder {
    pub fn extraction_url(mut self, url: impl Into<String>) -> Self {
        self.config.extraction_url = url.into();
        self
    }

    pub fn rendering_url(mut self, url: impl Into<String>) -> Self {
        self.config.rendering_url = url.into();
        self
    }

    pub fn sniff_window(mut self, bytes: usize) -> Self {
        self.config.sniff_window = bytes;
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn max_error_body_bytes(mut self, bytes: usize) -> Self {
        self.config.max_error_body_bytes = bytes.max(64);
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Service addresses must be absolute `http`/`https` URLs; a missing
    /// trailing slash is added.
    pub fn build(mut self) -> Result<ExtractorConfig, ExtractError> {
        let c = &mut self.config;
        c.extraction_url = parse_base_url("extraction_url", &c.extraction_url)?.to_string();
        c.rendering_url = parse_base_url("rendering_url", &c.rendering_url)?.to_string();

        if c.sniff_window == 0 {
            return Err(ExtractError::InvalidConfig(
                "sniff_window must be ≥ 1 byte".into(),
            ));
        }
        if c.request_timeout_secs == 0 {
            return Err(ExtractError::InvalidConfig(
                "request_timeout_secs must be ≥ 1".into(),
            ));
        }
        if let Some(ref dir) = c.temp_dir {
            if !dir.is_dir() {
                return Err(ExtractError::InvalidConfig(format!(
                    "temp_dir '{}' is not a directory",
                    dir.display()
                )));
            }
        }
        Ok(self.config)
    }
}

/// Parse a service base address, normalising it to end with `/`.
fn parse_base_url(field: &str, raw: &str) -> Result<Url, ExtractError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };

    let url = Url::parse(&with_slash)
        .map_err(|e| ExtractError::InvalidConfig(format!("{field} '{raw}' is not a URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ExtractError::InvalidConfig(format!(
            "{field} '{raw}' must use http or https, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_service_hosts() {
        let c = ExtractorConfig::default();
        assert_eq!(c.extraction_url, "http://tika:9998/");
        assert_eq!(c.rendering_url, "http://fop:8080/");
        assert_eq!(c.sniff_window, 16 * 1024);
        assert!(c.temp_dir.is_none());
    }

    #[test]
    fn build_adds_trailing_slash() {
        let c = ExtractorConfig::builder()
            .extraction_url("http://localhost:9998/tika")
            .rendering_url(" https://render.internal ")
            .build()
            .unwrap();
        assert_eq!(c.extraction_url, "http://localhost:9998/tika/");
        assert_eq!(c.rendering_url, "https://render.internal/");
        assert_eq!(
            c.extraction_base().unwrap().join("rmeta/text").unwrap().as_str(),
            "http://localhost:9998/tika/rmeta/text"
        );
    }

    #[test]
    fn build_rejects_bad_urls() {
        let err = ExtractorConfig::builder()
            .extraction_url("not a url")
            .build()
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidConfig(_)));

        let err = ExtractorConfig::builder()
            .rendering_url("ftp://fop:21")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("http or https"), "got: {err}");
    }

    #[test]
    fn build_rejects_zero_window_and_missing_temp_dir() {
        assert!(ExtractorConfig::builder().sniff_window(0).build().is_err());
        assert!(ExtractorConfig::builder()
            .temp_dir("/definitely/not/a/dir")
            .build()
            .is_err());
    }

    #[test]
    fn error_body_cap_has_floor() {
        let c = ExtractorConfig::builder()
            .max_error_body_bytes(1)
            .build()
            .unwrap();
        assert_eq!(c.max_error_body_bytes, 64);
    }
}
