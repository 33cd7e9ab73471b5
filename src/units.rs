//! Video units: one video with its sidecar metadata and optional cover.
//!
//! Units come from the `videos` directory in one of two layouts: flat
//! `*.mp4` files, or `YYMMDD*` folders holding a single video each.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use log::{info, warn};

use crate::error::PublishResult;
use crate::metadata::{self, TitleBody};
use crate::schedule;

pub const VIDEO_EXTENSION: &str = "mp4";
pub const COVER_EXTENSIONS: [&str; 4] = ["png", "jpeg", "jpg", "webp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitSource {
    /// A loose video file; its sidecar and cover sit next to it.
    File,
    /// A dated folder that moves as a whole once published.
    Folder(PathBuf),
}

#[derive(Debug, Clone)]
pub struct VideoUnit {
    pub video_path: PathBuf,
    pub metadata_path: PathBuf,
    pub short_title: String,
    pub body: String,
    pub cover_path: Option<PathBuf>,
    pub folder_date: Option<NaiveDate>,
    pub scheduled_at: Option<NaiveDateTime>,
    pub source: UnitSource,
}

impl VideoUnit {
    /// Builds a unit from a loose video file. An explicit cover wins over the
    /// same-stem image lookup.
    pub fn from_video(video_path: &Path, cover: Option<PathBuf>) -> PublishResult<Self> {
        let TitleBody { short_title, body } = metadata::extract(video_path)?;
        Ok(Self {
            video_path: video_path.to_path_buf(),
            metadata_path: metadata::sidecar_path(video_path),
            short_title,
            body,
            cover_path: cover.or_else(|| discover_cover(video_path)),
            folder_date: None,
            scheduled_at: None,
            source: UnitSource::File,
        })
    }

    /// Builds a unit from a dated folder; `None` when the folder holds no video.
    pub fn from_folder(folder: &Path, date: NaiveDate) -> PublishResult<Option<Self>> {
        let Some(video_path) = first_with_extension(folder, &[VIDEO_EXTENSION])? else {
            warn!("[scan] no .{} in {}", VIDEO_EXTENSION, folder.display());
            return Ok(None);
        };
        let stem = metadata::file_stem(&video_path);
        let metadata_path =
            first_with_extension(folder, &["txt"])?.unwrap_or_else(|| metadata::sidecar_path(&video_path));
        let TitleBody { short_title, body } = metadata::extract_from(&metadata_path, &stem)?;
        Ok(Some(Self {
            cover_path: first_with_extension(folder, &COVER_EXTENSIONS)?,
            video_path,
            metadata_path,
            short_title,
            body,
            folder_date: Some(date),
            scheduled_at: None,
            source: UnitSource::Folder(folder.to_path_buf()),
        }))
    }

    pub fn name(&self) -> String {
        match &self.source {
            UnitSource::Folder(folder) => folder
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            UnitSource::File => self
                .video_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

/// Same-stem image next to the video, in `COVER_EXTENSIONS` order.
pub fn discover_cover(video_path: &Path) -> Option<PathBuf> {
    COVER_EXTENSIONS
        .iter()
        .map(|ext| video_path.with_extension(ext))
        .find(|candidate| candidate.is_file())
}

/// Loose `*.mp4` files in natural order (`v2` before `v10`).
pub fn scan_flat(videos_dir: &Path) -> PublishResult<Vec<VideoUnit>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(videos_dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, &[VIDEO_EXTENSION]))
        .collect();
    files.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));

    let mut units = Vec::with_capacity(files.len());
    for path in files {
        match VideoUnit::from_video(&path, None) {
            Ok(unit) => units.push(unit),
            Err(e) => warn!("[scan] skipping {}: {}", path.display(), e),
        }
    }
    Ok(units)
}

/// `YYMMDD*` folders dated on or after `cutoff`, oldest first. Folders without
/// a parseable date are skipped.
pub fn scan_dated_folders(
    videos_dir: &Path,
    cutoff: Option<NaiveDate>,
) -> PublishResult<Vec<VideoUnit>> {
    let mut dated: Vec<(NaiveDate, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(videos_dir)?.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match schedule::folder_date_on_or_after(&file_name(&path), cutoff) {
            Some(date) => dated.push((date, path)),
            None => info!("[scan] skipping {} (no date or before cutoff)", path.display()),
        }
    }
    dated.sort_by(|(da, pa), (db, pb)| da.cmp(db).then_with(|| natural_cmp(&file_name(pa), &file_name(pb))));

    let mut units = Vec::with_capacity(dated.len());
    for (date, folder) in dated {
        match VideoUnit::from_folder(&folder, date) {
            Ok(Some(unit)) => units.push(unit),
            Ok(None) => {}
            Err(e) => warn!("[scan] skipping {}: {}", folder.display(), e),
        }
    }
    Ok(units)
}

/// Moves a published unit into `published_dir`. Best-effort: failures are
/// logged and never undo the upload.
pub fn relocate_published(unit: &VideoUnit, published_dir: &Path) {
    if let Err(e) = std::fs::create_dir_all(published_dir) {
        warn!("[publish] cannot create {}: {}", published_dir.display(), e);
        return;
    }

    match &unit.source {
        UnitSource::Folder(folder) => {
            let target = published_dir.join(file_name(folder));
            match move_path(folder, &target) {
                Ok(()) => info!("[publish] moved {} -> {}", folder.display(), target.display()),
                Err(e) => warn!("[publish] failed to move folder {}: {}", folder.display(), e),
            }
        }
        UnitSource::File => {
            let target = published_dir.join(file_name(&unit.video_path));
            match move_path(&unit.video_path, &target) {
                Ok(()) => info!("[publish] moved {}", unit.video_path.display()),
                Err(e) => warn!(
                    "[publish] failed to move video {}: {}",
                    unit.video_path.display(),
                    e
                ),
            }
            for extra in unit.cover_path.iter().chain(std::iter::once(&unit.metadata_path)) {
                if !extra.is_file() {
                    continue;
                }
                if let Err(e) = move_path(extra, &published_dir.join(file_name(extra))) {
                    warn!("[publish] failed to move {}: {}", extra.display(), e);
                }
            }
        }
    }
}

fn move_path(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        // Cross-device moves need a copy.
        Err(_) if from.is_file() => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}

fn first_with_extension(dir: &Path, extensions: &[&str]) -> PublishResult<Option<PathBuf>> {
    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_extension(path, extensions))
        .collect();
    matches.sort_by(|a, b| {
        extension_rank(a, extensions)
            .cmp(&extension_rank(b, extensions))
            .then_with(|| natural_cmp(&file_name(a), &file_name(b)))
    });
    Ok(matches.into_iter().next())
}

fn extension_rank(path: &Path, extensions: &[&str]) -> usize {
    let ext = lower_extension(path);
    extensions.iter().position(|e| *e == ext).unwrap_or(usize::MAX)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    let ext = lower_extension(path);
    extensions.iter().any(|e| *e == ext)
}

fn lower_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum NaturalPart {
    Text(String),
    Number(u64),
}

fn natural_key(name: &str) -> Vec<NaturalPart> {
    let mut parts = Vec::new();
    let mut chunk = String::new();
    let mut in_digits = false;
    for c in name.chars() {
        let is_digit = c.is_ascii_digit();
        if is_digit != in_digits && !chunk.is_empty() {
            parts.push(natural_part(&chunk, in_digits));
            chunk.clear();
        }
        in_digits = is_digit;
        chunk.push(c);
    }
    if !chunk.is_empty() {
        parts.push(natural_part(&chunk, in_digits));
    }
    parts
}

fn natural_part(chunk: &str, digits: bool) -> NaturalPart {
    if digits {
        NaturalPart::Number(chunk.parse().unwrap_or(u64::MAX))
    } else {
        NaturalPart::Text(chunk.to_lowercase())
    }
}

pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_key(a).cmp(&natural_key(b))
}
