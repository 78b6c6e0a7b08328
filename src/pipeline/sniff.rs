//! XSL-FO sniffing on a bounded byte prefix.
//!
//! A heuristic, not a parse: the prefix is decoded lossily, lower-cased and
//! searched for markers that only formatting-object markup tends to carry.
//! Oddly formatted FO can slip through as a false negative, and a text file
//! that merely quotes these strings is a false positive; both are accepted.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, SeekFrom};
use tracing::debug;

/// Lower-case markers that identify XSL-FO markup.
pub const FO_MARKERS: [&str; 3] = ["<fo:root", "xmlns:fo", "w3.org/1999/xsl/format"];

/// Check whether the next `window` bytes look like an XSL-FO document.
///
/// The read position is restored to where it was on entry, whether the
/// check matches, misses, hits EOF early, or fails.
pub async fn looks_like_fo<R>(reader: &mut R, window: usize) -> std::io::Result<bool>
where
    R: AsyncRead + AsyncSeek + Unpin + ?Sized,
{
    let original = reader.stream_position().await?;
    let read = read_prefix(reader, window).await;
    reader.seek(SeekFrom::Start(original)).await?;

    let prefix = read?;
    let is_fo = contains_fo_marker(&prefix);
    debug!("Sniffed {} bytes, XSL-FO: {}", prefix.len(), is_fo);
    Ok(is_fo)
}

/// Marker test on raw bytes; invalid UTF-8 never matches but never fails.
pub fn contains_fo_marker(prefix: &[u8]) -> bool {
    let head = String::from_utf8_lossy(prefix).to_lowercase();
    FO_MARKERS.iter().any(|marker| head.contains(marker))
}

/// Fill up to `window` bytes, stopping early at EOF.
async fn read_prefix<R>(reader: &mut R, window: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; window];
    let mut filled = 0;
    while filled < window {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const FO_DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<fo:root xmlns:fo="http://www.w3.org/1999/XSL/Format">
  <fo:layout-master-set/>
</fo:root>"#;

    #[tokio::test]
    async fn detects_fo_and_restores_position() {
        let mut cursor = Cursor::new(FO_DOC.as_bytes().to_vec());
        assert!(looks_like_fo(&mut cursor, 16 * 1024).await.unwrap());
        assert_eq!(cursor.position(), 0);
    }

    #[tokio::test]
    async fn non_fo_restores_position_from_offset() {
        let mut cursor = Cursor::new(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n1 0 obj".to_vec());
        cursor.set_position(3);
        assert!(!looks_like_fo(&mut cursor, 16 * 1024).await.unwrap());
        assert_eq!(cursor.position(), 3);
    }

    #[tokio::test]
    async fn input_shorter_than_window() {
        let mut cursor = Cursor::new(b"<fo:root/>".to_vec());
        assert!(looks_like_fo(&mut cursor, 16 * 1024).await.unwrap());
        assert_eq!(cursor.position(), 0);

        let mut empty = Cursor::new(Vec::new());
        assert!(!looks_like_fo(&mut empty, 16 * 1024).await.unwrap());
        assert_eq!(empty.position(), 0);
    }

    #[tokio::test]
    async fn marker_beyond_window_is_not_seen() {
        let mut doc = vec![b' '; 64];
        doc.extend_from_slice(b"<fo:root>");
        let mut cursor = Cursor::new(doc);
        assert!(!looks_like_fo(&mut cursor, 64).await.unwrap());
        assert!(looks_like_fo(&mut cursor, 128).await.unwrap());
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(
            contains_fo_marker(b"<FO:ROOT xmlns:FO=\"x\">"),
            contains_fo_marker(b"<fo:root xmlns:fo=\"x\">")
        );
        assert!(contains_fo_marker(b"<FO:ROOT>"));
        assert!(contains_fo_marker(b"<root xmlns=\"http://www.W3.org/1999/XSL/Format\">"));
    }

    #[test]
    fn binary_garbage_does_not_match() {
        let garbage: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        assert!(!contains_fo_marker(&garbage));
        assert!(!contains_fo_marker(&[0xff, 0xfe, 0x00, 0xc3]));
    }
}
