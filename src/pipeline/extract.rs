//! Extraction gateway: hand the document to the metadata + text service.
//!
//! The service answers `PUT rmeta/text` with a JSON object (or an array whose
//! first element is that object) mapping field names to values. Nothing about
//! the field set is fixed, so the text body is located by name: the field
//! that looks like the content field becomes `content`, everything else is
//! metadata.
//!
//! ## Degrading on bad JSON
//!
//! A response that is not the expected shape is not an error. It becomes
//! [`ParsedResponse::Fallback`], which carries the raw body as content with
//! empty metadata, so a misbehaving upstream never aborts a batch.

use crate::error::ExtractError;
use crate::output::Metadata;
use crate::pipeline::upload::{self, UploadError};
use crate::pipeline::source;
use reqwest::header::{ACCEPT, CONTENT_LENGTH};
use reqwest::{Client, Url};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncSeek};
use tracing::{debug, info, warn};

/// Endpoint path, relative to the service base address.
pub const EXTRACT_PATH: &str = "rmeta/text";

/// Case-insensitive marker identifying the text-content field.
const CONTENT_MARKER: &str = "content";

/// Client for the extraction service.
#[derive(Debug, Clone)]
pub struct ExtractionClient {
    http: Client,
    endpoint: Url,
    max_error_body_bytes: usize,
}

impl ExtractionClient {
    pub fn new(http: Client, base: &Url, max_error_body_bytes: usize) -> Result<Self, ExtractError> {
        let endpoint = base
            .join(EXTRACT_PATH)
            .map_err(|e| ExtractError::InvalidConfig(format!("extraction endpoint: {e}")))?;
        Ok(Self {
            http,
            endpoint,
            max_error_body_bytes,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Submit everything from the reader's current position and interpret the reply.
    ///
    /// # Errors
    /// Transport failures and non-2xx statuses are fatal. An unparseable
    /// 2xx body is not: it comes back as [`ParsedResponse::Fallback`].
    pub async fn extract<R>(
        &self,
        reader: &mut R,
        password: Option<&str>,
    ) -> Result<ParsedResponse, ExtractError>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send + ?Sized,
    {
        let length = source::remaining_len(reader)
            .await
            .map_err(|source| ExtractError::Io {
                stage: "measuring the document for upload",
                source,
            })?;

        let url = request_url(&self.endpoint, password);
        info!("Submitting {} bytes to {}", length, self.endpoint);

        let (body, pump) = upload::streamed_body(reader);
        let request = self
            .http
            .put(url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_LENGTH, length)
            .body(body)
            .send();
        let response = upload::send_streamed(pump, request)
            .await
            .map_err(|e| match e {
                UploadError::Read(source) => ExtractError::Io {
                    stage: "uploading the document for extraction",
                    source,
                },
                UploadError::Request(source) => ExtractError::ExtractionRequest {
                    endpoint: self.endpoint.to_string(),
                    source,
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = upload::read_error_body(response, self.max_error_body_bytes).await;
            warn!("Extraction service returned {}", status);
            return Err(ExtractError::ExtractionFailed {
                endpoint: self.endpoint.to_string(),
                status,
                body,
            });
        }

        let raw = upload::read_body(response)
            .await
            .map_err(|source| ExtractError::ExtractionRequest {
                endpoint: self.endpoint.to_string(),
                source,
            })?;
        let raw = String::from_utf8_lossy(&raw).into_owned();
        debug!("Extraction response: {} bytes", raw.len());

        Ok(parse_response(raw))
    }
}

/// Build the request URL, adding `?password=` when a password is given.
pub fn request_url(endpoint: &Url, password: Option<&str>) -> Url {
    let mut url = endpoint.clone();
    if let Some(pw) = password {
        url.set_query(Some(&format!("password={}", escape_data_string(pw))));
    }
    url
}

/// Percent-encode everything except RFC 3986 unreserved characters.
///
/// Spaces become `%20` (not `+`), and every byte of a multi-byte character
/// is escaped individually.
pub fn escape_data_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() * 3);
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Interpretation of an extraction response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedResponse {
    /// The body was a JSON object (or array of objects).
    Parsed { metadata: Metadata, content: String },
    /// The body was not usable JSON; it is passed through verbatim.
    Fallback(String),
}

impl ParsedResponse {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ParsedResponse::Fallback(_))
    }

    pub fn into_parts(self) -> (Metadata, String) {
        match self {
            ParsedResponse::Parsed { metadata, content } => (metadata, content),
            ParsedResponse::Fallback(raw) => (Metadata::new(), raw),
        }
    }
}

/// Split an extraction response into metadata and content.
///
/// The content field is the first field whose name ends with `content`
/// (ignoring case), so `X-TIKA:content` wins over `Content-Type`. When no
/// name ends that way, the first name that merely contains `content` is used.
/// All remaining fields become metadata under their original names.
pub fn parse_response(raw: String) -> ParsedResponse {
    let root: Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            debug!("Extraction response is not JSON ({}); passing it through", e);
            return ParsedResponse::Fallback(raw);
        }
    };

    let object = match first_object(root) {
        Some(o) => o,
        None => {
            debug!("Extraction response has no object to interpret; passing it through");
            return ParsedResponse::Fallback(raw);
        }
    };

    let content_key = content_field(&object).map(str::to_owned);
    let mut metadata = Metadata::new();
    let mut content = String::new();

    for (name, value) in object {
        if content_key.as_deref() == Some(name.as_str()) {
            content = value_text(&value);
        } else {
            metadata.insert(name, value_text(&value));
        }
    }

    ParsedResponse::Parsed { metadata, content }
}

/// The object to interpret: the root itself, or the first array element.
fn first_object(root: Value) -> Option<Map<String, Value>> {
    let candidate = match root {
        Value::Array(items) => items.into_iter().next()?,
        other => other,
    };
    match candidate {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn content_field(object: &Map<String, Value>) -> Option<&str> {
    let mut contains_match = None;
    for name in object.keys() {
        let lower = name.to_lowercase();
        if lower.ends_with(CONTENT_MARKER) {
            return Some(name.as_str());
        }
        if contains_match.is_none() && lower.contains(CONTENT_MARKER) {
            contains_match = Some(name.as_str());
        }
    }
    contains_match
}

/// String form of a JSON value: strings unquoted, `null` empty, others as JSON text.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
