//! Input resolution: turn a user-supplied path, `-`, or URL into manuscript text.
//!
//! The core pipeline takes text, not paths. This module is what the file- and
//! URL-based entry points use to get that text, mapping each failure to a
//! specific [`AnnotateError`] so the CLI can print something actionable.

use crate::error::AnnotateError;
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Where the manuscript text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    File(PathBuf),
    Url(String),
}

impl InputSource {
    /// Classify an input string without touching the file system.
    pub fn parse(input: &str) -> Result<Self, AnnotateError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AnnotateError::InvalidInput {
                input: input.to_string(),
            });
        }
        if trimmed == "-" {
            Ok(InputSource::Stdin)
        } else if is_url(trimmed) {
            Ok(InputSource::Url(trimmed.to_string()))
        } else {
            Ok(InputSource::File(PathBuf::from(trimmed)))
        }
    }

    /// File stem used when writing per-input outputs.
    pub fn stem(&self) -> String {
        match self {
            InputSource::Stdin => "stdin".to_string(),
            InputSource::File(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "manuscript".to_string()),
            InputSource::Url(url) => url_stem(url),
        }
    }
}

/// Output stems for a batch of inputs, unique across the batch.
///
/// Stems are compared case-insensitively; a repeat gets `-2`, `-3`, …
/// appended in input order, so `a/notes.txt` and `b/notes.txt` become
/// `notes` and `notes-2`.
pub fn unique_stems(inputs: &[String]) -> Result<Vec<String>, AnnotateError> {
    let mut used = HashSet::new();
    inputs
        .iter()
        .map(|input| {
            let base = InputSource::parse(input)?.stem();
            let mut stem = base.clone();
            let mut n = 2;
            while !used.insert(stem.to_lowercase()) {
                stem = format!("{base}-{n}");
                n += 1;
            }
            Ok(stem)
        })
        .collect()
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read the manuscript text from a path, `-`, or URL.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<String, AnnotateError> {
    match InputSource::parse(input)? {
        InputSource::Stdin => read_stdin().await,
        InputSource::File(path) => read_local(path).await,
        InputSource::Url(url) => download_url(&url, timeout_secs).await,
    }
}

async fn read_stdin() -> Result<String, AnnotateError> {
    let mut text = String::new();
    tokio::io::stdin()
        .read_to_string(&mut text)
        .await
        .map_err(|e| AnnotateError::ReadFailed {
            path: PathBuf::from("-"),
            source: e,
        })?;
    debug!("Read {} bytes from stdin", text.len());
    Ok(text)
}

async fn read_local(path: PathBuf) -> Result<String, AnnotateError> {
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => {
            debug!("Read {} bytes from {}", text.len(), path.display());
            Ok(text)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(AnnotateError::FileNotFound { path })
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(AnnotateError::PermissionDenied { path })
        }
        Err(e) => Err(AnnotateError::ReadFailed { path, source: e }),
    }
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<String, AnnotateError> {
    info!("Downloading manuscript from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AnnotateError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            AnnotateError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            AnnotateError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(AnnotateError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let text = response
        .text()
        .await
        .map_err(|e| AnnotateError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", text.len());
    Ok(text)
}

/// Last path segment of a URL without its extension.
fn url_stem(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return match last.rsplit_once('.') {
                        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
                        _ => last.to_string(),
                    };
                }
            }
        }
    }
    "download".to_string()
}
