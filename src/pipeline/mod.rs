//! Pipeline stages for content extraction.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the orchestrator in [`crate::extractor`] stays a short sequence.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ sniff ──┬──────────────▶ extract ──▶ output::assemble
//! (seekable)  (FO?)  └─▶ render ──▶─┘ (rmeta)
//!                       (FO → PDF)
//! ```
//!
//! 1. [`source`]: borrow seekable input, or materialise forward-only input
//!    into an owned temp file
//! 2. [`sniff`]: look for XSL-FO markers in the first 16 KiB
//! 3. [`render`]: FO only: multipart upload to the rendering service
//! 4. [`extract`]: upload to the extraction service and split its JSON
//!    reply into metadata and content
//! 5. [`upload`]: shared plumbing that streams a borrowed reader as a
//!    request body

pub mod extract;
pub mod render;
pub mod sniff;
pub mod source;
pub mod upload;
