//! Discovers indexable files under a set of roots.
//!
//! A file is a candidate when its extension is supported and no segment of its
//! absolute path matches an exclusion pattern. Patterns are globs compared
//! against one whole segment, so `.git` excludes `.git/` and nothing else,
//! while `*.tmp` excludes any segment ending in `.tmp`. Segments of the root
//! itself count too: a root inside `node_modules` yields no candidates.

use crate::error::{CatalogError, Result};
use crate::storage::FileType;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// A file found by the scanner, with its file system metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct FileCandidate {
    /// Absolute path
    pub path: PathBuf,
    pub filename: String,
    /// Lowercase, with the leading dot
    pub extension: String,
    pub file_type: FileType,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Falls back to `modified` where the platform has no birth time
    pub created: DateTime<Utc>,
}

impl FileCandidate {
    /// Stats `path` and builds a candidate if its extension is supported.
    pub fn from_path(path: &Path) -> std::io::Result<Option<Self>> {
        let Some((extension, file_type)) = classify(path) else {
            return Ok(None);
        };

        let path = std::path::absolute(path)?;
        let metadata = std::fs::metadata(&path)?;
        if !metadata.is_file() {
            return Ok(None);
        }

        let modified: DateTime<Utc> = metadata.modified()?.into();
        let created = metadata.created().map(DateTime::<Utc>::from).unwrap_or(modified);
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Some(Self {
            path,
            filename,
            extension,
            file_type,
            size: metadata.len(),
            modified,
            created,
        }))
    }

    /// UTF-8 form of the path, as stored in the catalog.
    pub fn path_str(&self) -> Option<&str> {
        self.path.to_str()
    }
}

/// Maps a lowercase extension (with dot) to its file type.
pub fn file_type_for_extension(extension: &str) -> Option<FileType> {
    let file_type = match extension {
        ".txt" | ".md" | ".pdf" | ".docx" | ".pptx" | ".doc" | ".rtf" => FileType::Document,
        ".jpg" | ".jpeg" | ".png" | ".gif" | ".bmp" | ".svg" | ".webp" => FileType::Image,
        ".mp3" | ".flac" | ".wav" | ".m4a" | ".aac" | ".ogg" => FileType::Audio,
        ".mp4" | ".avi" | ".mkv" | ".mov" | ".wmv" | ".flv" | ".webm" => FileType::Video,
        _ => return None,
    };
    Some(file_type)
}

/// Lowercase extension and file type of a supported path.
pub fn classify(path: &Path) -> Option<(String, FileType)> {
    let extension = format!(
        ".{}",
        path.extension()?.to_string_lossy().to_lowercase()
    );
    let file_type = file_type_for_extension(&extension)?;
    Some((extension, file_type))
}

/// Result of scanning a set of roots.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub candidates: Vec<FileCandidate>,
    /// Roots that could not be opened
    pub failed_roots: usize,
}

/// Walks roots and collects candidates.
#[derive(Debug, Clone)]
pub struct FileScanner {
    exclusions: Arc<Vec<glob::Pattern>>,
}

impl FileScanner {
    pub fn new(exclude_patterns: &[String]) -> Result<Self> {
        let exclusions = exclude_patterns
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|e| {
                    CatalogError::config(format!("invalid exclude pattern '{pattern}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            exclusions: Arc::new(exclusions),
        })
    }

    /// True if any segment of `path` matches an exclusion pattern.
    pub fn is_excluded(&self, path: &Path) -> bool {
        path.components().any(|component| match component {
            Component::Normal(segment) => {
                let segment = segment.to_string_lossy();
                self.exclusions.iter().any(|p| p.matches(&segment))
            }
            _ => false,
        })
    }

    /// Scans every root. A root that cannot be opened is logged and counted,
    /// and the remaining roots are still scanned.
    pub async fn scan(&self, roots: &[PathBuf]) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        for root in roots {
            let scanner = self.clone();
            let owned_root = root.clone();
            let scanned =
                tokio::task::spawn_blocking(move || scanner.scan_root(&owned_root)).await;

            match scanned {
                Ok(Ok(mut candidates)) => {
                    debug!(
                        "Found {} candidates under {}",
                        candidates.len(),
                        root.display()
                    );
                    outcome.candidates.append(&mut candidates);
                }
                Ok(Err(e)) => {
                    warn!("Cannot scan root {}: {}", root.display(), e);
                    outcome.failed_roots += 1;
                }
                Err(e) => {
                    warn!("Scan task for {} failed: {}", root.display(), e);
                    outcome.failed_roots += 1;
                }
            }
        }
        outcome
    }

    /// Walks one root synchronously.
    pub fn scan_root(&self, root: &Path) -> std::io::Result<Vec<FileCandidate>> {
        let root = std::path::absolute(root)?;
        let metadata = std::fs::metadata(&root)?;
        if !metadata.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("{} is not a directory", root.display()),
            ));
        }

        if self.is_excluded(&root) {
            debug!("Root {} lies under an excluded directory", root.display());
            return Ok(Vec::new());
        }

        let filter = self.clone();
        let walker = ignore::WalkBuilder::new(&root)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| !filter.is_excluded(entry.path()))
            .build();

        let mut candidates = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            match FileCandidate::from_path(entry.path()) {
                Ok(Some(candidate)) if candidate.path_str().is_some() => candidates.push(candidate),
                Ok(Some(candidate)) => {
                    warn!("Skipping non UTF-8 path {}", candidate.path.display())
                }
                Ok(None) => {}
                Err(e) => warn!("Cannot stat {}: {}", entry.path().display(), e),
            }
        }
        Ok(candidates)
    }
}
