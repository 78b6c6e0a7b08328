//! Streaming request bodies from borrowed readers, and reading error bodies.
//!
//! `reqwest::Body::wrap_stream` wants a `'static` stream, but the pipeline
//! only borrows its source. The reader is therefore pumped into a bounded
//! channel whose receiving end is the body; [`send_streamed`] polls the pump
//! alongside the request future, so memory stays at
//! `CHUNK_SIZE * CHANNEL_DEPTH` no matter how large the document is.
//!
//! A service may answer before it has read the whole body (401, 413, a proxy
//! rejection) and then stop reading. The pump would then wait on a full
//! channel forever, so it is dropped as soon as the response head arrives.

use futures::StreamExt;
use reqwest::{Body, Response};
use std::future::Future;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const CHUNK_SIZE: usize = 64 * 1024;
const CHANNEL_DEPTH: usize = 4;

/// Build a request body fed from `reader`.
///
/// Returns the body and the pump future that must be polled concurrently
/// with the request. The pump resolves `Ok` once the reader is exhausted or
/// the request stops consuming; a read error is forwarded into the body
/// (aborting the request) and also returned.
pub fn streamed_body<'r, R>(
    reader: &'r mut R,
) -> (Body, impl Future<Output = std::io::Result<()>> + Send + 'r)
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    let (tx, rx) = mpsc::channel::<std::io::Result<Vec<u8>>>(CHANNEL_DEPTH);
    let body = Body::wrap_stream(ReceiverStream::new(rx));

    let pump = async move {
        loop {
            let mut chunk = vec![0u8; CHUNK_SIZE];
            let n = match reader.read(&mut chunk).await {
                Ok(n) => n,
                Err(e) => {
                    let forwarded = std::io::Error::new(e.kind(), e.to_string());
                    let _ = tx.send(Err(forwarded)).await;
                    return Err(e);
                }
            };
            if n == 0 {
                return Ok(());
            }
            chunk.truncate(n);
            if tx.send(Ok(chunk)).await.is_err() {
                // Request finished or failed without needing the rest.
                return Ok(());
            }
        }
    };

    (body, pump)
}

/// Failure while driving a streamed upload.
#[derive(Debug)]
pub enum UploadError {
    /// Reading the source failed before the service answered.
    Read(std::io::Error),
    /// The request itself failed (connect, timeout, broken transfer).
    Request(reqwest::Error),
}

/// Drive `request` while `pump` feeds its body.
///
/// Resolves with the response as soon as its head arrives, whether or not
/// the body was fully sent; the pump is dropped at that point. A read
/// failure is reported only when it happens before the response.
pub async fn send_streamed<P, Q>(pump: P, request: Q) -> Result<Response, UploadError>
where
    P: Future<Output = std::io::Result<()>>,
    Q: Future<Output = reqwest::Result<Response>>,
{
    tokio::pin!(pump);
    tokio::pin!(request);
    let mut pump_done = false;

    loop {
        tokio::select! {
            biased;
            pumped = &mut pump, if !pump_done => match pumped {
                Ok(()) => pump_done = true,
                Err(e) => return Err(UploadError::Read(e)),
            },
            response = &mut request => return response.map_err(UploadError::Request),
        }
    }
}

/// Read a full response body chunk by chunk.
pub async fn read_body(response: Response) -> reqwest::Result<Vec<u8>> {
    let hint = response.content_length().unwrap_or(0).min(64 * 1024 * 1024) as usize;
    let mut buf = Vec::with_capacity(hint);
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf)
}

/// Read a non-success response body for diagnostics, capped at `max_bytes`.
///
/// Never fails: an unreadable body is described instead of propagated.
pub async fn read_error_body(response: Response, max_bytes: usize) -> String {
    match read_body(response).await {
        Ok(bytes) => truncate_utf8(&String::from_utf8_lossy(&bytes), max_bytes),
        Err(e) => format!("<error body unreadable: {e}>"),
    }
}

/// Cut `text` to at most `max_bytes` on a char boundary, marking the cut.
pub fn truncate_utf8(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}… ({} bytes truncated)", &text[..end], text.len() - end)
}
