//! Conversion gateway: render XSL-FO through the remote rendering service.
//!
//! The FO document is uploaded as a multipart form with a single `file` part
//! named `document.fo`; the service answers with the rendered binary (PDF).
//! The rendered bytes are held in memory and handed on as a rewound
//! [`Cursor`], which becomes the input to extraction. The original FO source
//! is not read again after the upload.

use crate::error::ExtractError;
use crate::pipeline::upload::{self, UploadError};
use crate::pipeline::source;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncSeek};
use tracing::{info, warn};

/// Endpoint path, relative to the service base address.
pub const RENDER_PATH: &str = "convert";

/// Multipart part name the rendering service reads.
pub const FO_PART_NAME: &str = "file";

/// File name announced for the uploaded part.
pub const FO_FILE_NAME: &str = "document.fo";

/// Client for the rendering service.
#[derive(Debug, Clone)]
pub struct RenderClient {
    http: Client,
    endpoint: Url,
    max_error_body_bytes: usize,
}

impl RenderClient {
    pub fn new(http: Client, base: &Url, max_error_body_bytes: usize) -> Result<Self, ExtractError> {
        let endpoint = base
            .join(RENDER_PATH)
            .map_err(|e| ExtractError::InvalidConfig(format!("rendering endpoint: {e}")))?;
        Ok(Self {
            http,
            endpoint,
            max_error_body_bytes,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Render everything from the reader's current position.
    ///
    /// # Errors
    /// [`ExtractError::ConversionFailed`] on a non-2xx reply, carrying the
    /// status and (capped) body; [`ExtractError::RenderRequest`] when the
    /// service cannot be reached or the transfer breaks off.
    pub async fn convert<R>(&self, reader: &mut R) -> Result<Cursor<Vec<u8>>, ExtractError>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send + ?Sized,
    {
        let length = source::remaining_len(reader)
            .await
            .map_err(|source| ExtractError::Io {
                stage: "measuring the FO document",
                source,
            })?;
        info!("Rendering {} bytes of XSL-FO via {}", length, self.endpoint);

        let (body, pump) = upload::streamed_body(reader);
        let part = Part::stream_with_length(body, length).file_name(FO_FILE_NAME);
        let form = Form::new().part(FO_PART_NAME, part);

        let request = self.http.post(self.endpoint.clone()).multipart(form).send();
        let response = upload::send_streamed(pump, request)
            .await
            .map_err(|e| match e {
                UploadError::Read(source) => ExtractError::Io {
                    stage: "uploading the FO document",
                    source,
                },
                UploadError::Request(source) => self.request_error(source),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = upload::read_error_body(response, self.max_error_body_bytes).await;
            warn!("Rendering service returned {}: {}", status, body);
            return Err(ExtractError::ConversionFailed { status, body });
        }

        let rendered = upload::read_body(response)
            .await
            .map_err(|source| self.request_error(source))?;
        info!("Received {} rendered bytes", rendered.len());

        Ok(Cursor::new(rendered))
    }

    fn request_error(&self, source: reqwest::Error) -> ExtractError {
        ExtractError::RenderRequest {
            endpoint: self.endpoint.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_under_base() {
        let base = Url::parse("http://fop:8080/render/").unwrap();
        let client = RenderClient::new(Client::new(), &base, 1024).unwrap();
        assert_eq!(client.endpoint().as_str(), "http://fop:8080/render/convert");
    }
}
