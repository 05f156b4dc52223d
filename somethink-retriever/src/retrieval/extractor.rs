//! Content extraction boundary.
//!
//! The indexer only needs text. Format specific extraction (PDF, DOCX, OCR,
//! transcription) lives behind [`ContentExtractor`]; the bundled
//! [`PlainTextExtractor`] handles plain text and falls back to the file stem
//! for video files.

use super::file_scanner::FileCandidate;
use crate::storage::FileType;
use async_trait::async_trait;
use tokio::io::AsyncReadExt;

/// Failure to produce text for a file. The indexer recovers from it by
/// storing empty text.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Extraction failed for {path}: {message}")]
    Failed { path: String, message: String },
}

#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Text content of the candidate, possibly empty.
    async fn extract(&self, candidate: &FileCandidate) -> Result<String, ExtractionError>;
}

/// Reads `.txt` and `.md` files as UTF-8, replacing invalid sequences.
#[derive(Debug, Clone)]
pub struct PlainTextExtractor {
    max_bytes: usize,
}

impl PlainTextExtractor {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Default for PlainTextExtractor {
    fn default() -> Self {
        Self::new(8 * 1024 * 1024)
    }
}

#[async_trait]
impl ContentExtractor for PlainTextExtractor {
    async fn extract(&self, candidate: &FileCandidate) -> Result<String, ExtractionError> {
        match (candidate.file_type, candidate.extension.as_str()) {
            (FileType::Document, ".txt" | ".md") => {
                let read_error = |source| ExtractionError::Read {
                    path: candidate.path.display().to_string(),
                    source,
                };
                let file = tokio::fs::File::open(&candidate.path)
                    .await
                    .map_err(read_error)?;

                let mut buf = Vec::new();
                file.take(self.max_bytes as u64)
                    .read_to_end(&mut buf)
                    .await
                    .map_err(read_error)?;
                Ok(String::from_utf8_lossy(&buf).into_owned())
            }
            (FileType::Video, _) => Ok(candidate
                .path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()),
            _ => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_plain_text_extraction() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.md");
        std::fs::write(&path, b"hello \xffworld")?;

        let candidate = FileCandidate::from_path(&path)?.unwrap();
        let text = PlainTextExtractor::default().extract(&candidate).await?;
        assert_eq!(text, "hello \u{FFFD}world");

        let truncated = PlainTextExtractor::new(5).extract(&candidate).await?;
        assert_eq!(truncated, "hello");
        Ok(())
    }

    #[tokio::test]
    async fn test_video_uses_stem_and_binary_is_empty() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let video = dir.path().join("holiday_trip.mp4");
        let image = dir.path().join("cat.png");
        std::fs::write(&video, [0u8; 16])?;
        std::fs::write(&image, [0u8; 16])?;

        let extractor = PlainTextExtractor::default();
        let candidate = FileCandidate::from_path(&video)?.unwrap();
        assert_eq!(extractor.extract(&candidate).await?, "holiday_trip");

        let candidate = FileCandidate::from_path(&image)?.unwrap();
        assert_eq!(extractor.extract(&candidate).await?, "");
        Ok(())
    }

    #[tokio::test]
    async fn test_vanished_file_is_an_error() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("gone.txt");
        std::fs::write(&path, "x")?;
        let candidate = FileCandidate::from_path(&path)?.unwrap();
        std::fs::remove_file(&path)?;

        let result = PlainTextExtractor::default().extract(&candidate).await;
        assert!(matches!(result, Err(ExtractionError::Read { .. })));
        Ok(())
    }
}
