//! Sidecar metadata: `<stem>.txt` next to each video.
//!
//! First line is the short title, the rest is the body (description and
//! hashtags). A missing, blank or non-UTF-8 sidecar falls back to the file
//! stem for both.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::PublishResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleBody {
    pub short_title: String,
    pub body: String,
}

pub fn sidecar_path(video_path: &Path) -> PathBuf {
    video_path.with_extension("txt")
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Reads the sidecar that shares the video's stem.
pub fn extract(video_path: &Path) -> PublishResult<TitleBody> {
    extract_from(&sidecar_path(video_path), &file_stem(video_path))
}

/// Reads an explicit metadata file; `fallback` is used when it is missing,
/// blank or not UTF-8.
pub fn extract_from(metadata_path: &Path, fallback: &str) -> PublishResult<TitleBody> {
    let content = match std::fs::read_to_string(metadata_path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(
                "[metadata] {} not found, using `{}`",
                metadata_path.display(),
                fallback
            );
            return Ok(stem_fallback(fallback));
        }
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            warn!(
                "[metadata] {} is not UTF-8, using `{}`",
                metadata_path.display(),
                fallback
            );
            return Ok(stem_fallback(fallback));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(parse(&content).unwrap_or_else(|| stem_fallback(fallback)))
}

/// `None` when the content is blank.
pub fn parse(content: &str) -> Option<TitleBody> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    if content.trim().is_empty() {
        return None;
    }
    let mut lines = content.lines();
    let short_title = lines.next().unwrap_or_default().trim().to_string();
    let body = lines.collect::<Vec<_>>().join("\n").trim_end().to_string();
    Some(TitleBody { short_title, body })
}

fn stem_fallback(stem: &str) -> TitleBody {
    TitleBody {
        short_title: stem.to_string(),
        body: stem.to_string(),
    }
}
