//! Stream normalisation: guarantee a seekable, rewindable byte source.
//!
//! Sniffing needs to peek and rewind, and the upload stages need an exact
//! length. A forward-only input (stdin, a network body, a decompressor) gives
//! neither, so it is copied once into a temp file that the pipeline owns for
//! the duration of the invocation. Seekable inputs are only borrowed: the
//! pipeline can rewind them but never closes or deletes them.

use crate::error::ExtractError;
use std::io::SeekFrom;
use std::path::Path;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt, AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

/// Write buffer used while materialising a forward-only stream.
const COPY_BUFFER_SIZE: usize = 80 * 1024;

/// A byte source that supports random access.
pub trait SeekableRead: AsyncRead + AsyncSeek + Unpin + Send {}
impl<T: AsyncRead + AsyncSeek + Unpin + Send + ?Sized> SeekableRead for T {}

/// A byte source that can only be read front to back.
pub trait ForwardRead: AsyncRead + Unpin + Send {}
impl<T: AsyncRead + Unpin + Send + ?Sized> ForwardRead for T {}

/// Caller-owned input, tagged with whether it supports random access.
pub enum DocumentSource<'a> {
    /// Input that can be rewound in place.
    Seekable(&'a mut (dyn SeekableRead + 'a)),
    /// Input that must be materialised before the pipeline can use it.
    Stream(&'a mut (dyn ForwardRead + 'a)),
}

impl<'a> DocumentSource<'a> {
    pub fn seekable<R: SeekableRead + 'a>(reader: &'a mut R) -> Self {
        DocumentSource::Seekable(reader)
    }

    pub fn stream<R: ForwardRead + 'a>(reader: &'a mut R) -> Self {
        DocumentSource::Stream(reader)
    }

    pub fn is_seekable(&self) -> bool {
        matches!(self, DocumentSource::Seekable(_))
    }
}

/// The seekable source used by the rest of the pipeline.
///
/// Only the `Owned` variant is ever deleted; the decision is made by the tag.
pub enum MaterializedSource<'a> {
    /// The caller's own seekable input.
    Borrowed(&'a mut (dyn SeekableRead + 'a)),
    /// A temp file created by [`ensure_seekable`].
    Owned { file: File, path: TempPath },
}

impl<'a> MaterializedSource<'a> {
    /// Whether the pipeline created (and must release) this source.
    pub fn is_owned(&self) -> bool {
        matches!(self, MaterializedSource::Owned { .. })
    }

    /// Backing temp file, for owned sources.
    pub fn temp_path(&self) -> Option<&Path> {
        match self {
            MaterializedSource::Borrowed(_) => None,
            MaterializedSource::Owned { path, .. } => Some(&**path),
        }
    }

    pub fn reader(&mut self) -> &mut (dyn SeekableRead + 'a) {
        match self {
            MaterializedSource::Borrowed(r) => &mut **r,
            MaterializedSource::Owned { file, .. } => file,
        }
    }

    /// Seek back to the first byte.
    pub async fn rewind(&mut self) -> Result<(), ExtractError> {
        self.reader()
            .rewind()
            .await
            .map(|_| ())
            .map_err(|source| ExtractError::Io {
                stage: "rewinding the document",
                source,
            })
    }

    /// Release the source.
    ///
    /// Borrowed sources are left untouched. Owned sources have their handle
    /// closed and their backing file removed; a removal failure is logged
    /// and swallowed.
    pub async fn release(self) {
        if let MaterializedSource::Owned { file, path } = self {
            // Wait for in-flight file operations before closing.
            drop(file.into_std().await);
            let shown = path.display().to_string();
            match path.close() {
                Ok(()) => debug!("Removed temp file {}", shown),
                Err(e) => warn!("Could not remove temp file {}: {}", shown, e),
            }
        }
    }
}

/// Normalise `source` into something the pipeline can rewind.
///
/// Seekable input comes back as [`MaterializedSource::Borrowed`], untouched.
/// Forward-only input is copied, start to end, into a new temp file (in
/// `temp_dir`, or the OS default), rewound, and returned as
/// [`MaterializedSource::Owned`].
///
/// # Errors
/// [`ExtractError::Materialize`] if the temp file cannot be created or the
/// copy fails; the partial temp file is removed before returning.
pub async fn ensure_seekable<'a>(
    source: DocumentSource<'a>,
    temp_dir: Option<&Path>,
) -> Result<MaterializedSource<'a>, ExtractError> {
    let reader = match source {
        DocumentSource::Seekable(r) => return Ok(MaterializedSource::Borrowed(r)),
        DocumentSource::Stream(r) => r,
    };

    let mut builder = tempfile::Builder::new();
    builder.prefix("smart-extract-").suffix(".tmp");
    let named = match temp_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|source| ExtractError::Materialize { source })?;

    let (std_file, path) = named.into_parts();
    debug!("Materialising forward-only input to {}", path.display());

    match copy_into(reader, File::from_std(std_file)).await {
        Ok((file, copied)) => {
            debug!("Materialised {} bytes", copied);
            Ok(MaterializedSource::Owned { file, path })
        }
        Err(source) => {
            if let Err(e) = path.close() {
                warn!("Could not remove partial temp file: {}", e);
            }
            Err(ExtractError::Materialize { source })
        }
    }
}

/// Stream `reader` into `file`, then rewind the file.
async fn copy_into(
    reader: &mut (dyn ForwardRead + '_),
    file: File,
) -> std::io::Result<(File, u64)> {
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, file);
    let copied = tokio::io::copy(reader, &mut writer).await?;
    writer.flush().await?;
    let mut file = writer.into_inner();
    file.rewind().await?;
    Ok((file, copied))
}

/// Bytes between the current position and the end, leaving the position as it was.
pub async fn remaining_len<R>(reader: &mut R) -> std::io::Result<u64>
where
    R: AsyncSeek + Unpin + ?Sized,
{
    let here = reader.stream_position().await?;
    let end = reader.seek(SeekFrom::End(0)).await?;
    reader.seek(SeekFrom::Start(here)).await?;
    Ok(end.saturating_sub(here))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn seekable_input_is_borrowed_unchanged() {
        let mut cursor = Cursor::new(b"%PDF-1.7 body".to_vec());
        cursor.set_position(4);

        let mut source = ensure_seekable(DocumentSource::seekable(&mut cursor), None)
            .await
            .unwrap();
        assert!(!source.is_owned());
        assert!(source.temp_path().is_none());
        assert_eq!(source.reader().stream_position().await.unwrap(), 4);
        source.release().await;

        // The caller's handle is still usable afterwards.
        assert_eq!(cursor.position(), 4);
        assert_eq!(cursor.get_ref().len(), 13);
    }

    #[tokio::test]
    async fn forward_only_input_is_copied_to_owned_temp() {
        let dir = tempfile::tempdir().unwrap();
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut stream: &[u8] = &payload;

        let mut source = ensure_seekable(DocumentSource::stream(&mut stream), Some(dir.path()))
            .await
            .unwrap();
        assert!(source.is_owned());
        let temp = source.temp_path().unwrap().to_path_buf();
        assert!(temp.starts_with(dir.path()));
        assert!(temp.exists());

        let mut copied = Vec::new();
        source.reader().read_to_end(&mut copied).await.unwrap();
        assert_eq!(copied, payload);

        source.release().await;
        assert!(!temp.exists(), "release must delete the temp file");
    }

    #[tokio::test]
    async fn failed_copy_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut failing = tokio_test::io::Builder::new()
            .read(b"<fo:root")
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "peer went away",
            ))
            .build();

        let result = ensure_seekable(DocumentSource::stream(&mut failing), Some(dir.path())).await;
        assert!(matches!(result, Err(ExtractError::Materialize { .. })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn release_tolerates_already_removed_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut stream: &[u8] = b"plain text";
        let source = ensure_seekable(DocumentSource::stream(&mut stream), Some(dir.path()))
            .await
            .unwrap();

        std::fs::remove_file(source.temp_path().unwrap()).unwrap();
        // Must log and return, never panic.
        source.release().await;
    }

    #[tokio::test]
    async fn rewind_returns_both_variants_to_the_first_byte() {
        let mut cursor = Cursor::new(b"borrowed".to_vec());
        let mut borrowed = ensure_seekable(DocumentSource::seekable(&mut cursor), None)
            .await
            .unwrap();
        let mut head = [0u8; 4];
        borrowed.reader().read_exact(&mut head).await.unwrap();
        borrowed.rewind().await.unwrap();
        assert_eq!(borrowed.reader().stream_position().await.unwrap(), 0);
        borrowed.release().await;

        let dir = tempfile::tempdir().unwrap();
        let mut stream: &[u8] = b"owned copy";
        let mut owned = ensure_seekable(DocumentSource::stream(&mut stream), Some(dir.path()))
            .await
            .unwrap();
        let mut all = Vec::new();
        owned.reader().read_to_end(&mut all).await.unwrap();
        owned.rewind().await.unwrap();
        all.clear();
        owned.reader().read_to_end(&mut all).await.unwrap();
        assert_eq!(all, b"owned copy");
        owned.release().await;
    }

    #[tokio::test]
    async fn remaining_len_preserves_position() {
        let mut cursor = Cursor::new(vec![0u8; 100]);
        cursor.set_position(30);
        assert_eq!(remaining_len(&mut cursor).await.unwrap(), 70);
        assert_eq!(cursor.position(), 30);
    }
}
