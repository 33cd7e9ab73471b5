//! Explicit configuration: directory layout, `config.json` and timing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{PublishError, PublishResult};
use crate::schedule::{self, SchedulePolicy, SlotPolicy, DEFAULT_DAILY_HOURS};

pub const CONFIG_FILE: &str = "config.json";
pub const DATABASE_FILE: &str = "multipublisher.db";
pub const DEFAULT_FOLDER_PUBLISH_HOUR: u32 = 7;
const FALLBACK_DAILY_HOUR: u32 = 9;

/// Where the crop window should settle when no cover image is supplied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverPosition {
    #[default]
    Top,
    Middle,
    Bottom,
}

/// How the `videos` directory is organised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLayout {
    Flat,
    DatedFolders,
}

/// Keys of `config.json`. All optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// `YYYY-MM-DD`; first publish day. Defaults to tomorrow.
    pub publish_date: Option<String>,
    /// Hours of day (0-23) available as slots.
    pub publish_times: Option<Vec<u32>>,
    /// Literal `YYYY-MM-DD HH:MM` times; override the two keys above.
    pub publish_datetimes: Option<Vec<String>>,
    pub original_declaration: bool,
    pub videos_per_day: Option<usize>,
    /// Reject short `publish_datetimes` instead of repeating the last entry.
    pub strict_datetimes: bool,
    pub default_publish_hour: Option<u32>,
    /// `YYYY-MM-DD`; dated folders before this day are ignored.
    pub folder_date_cutoff: Option<String>,
    pub cover_position: CoverPosition,
    pub overall_deadline_secs: Option<u64>,
    pub login_timeout_secs: Option<u64>,
    pub headless: bool,
}

impl PublishConfig {
    pub fn load(path: &Path) -> PublishResult<Self> {
        if !path.exists() {
            info!("[config] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| PublishError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolves the schedule policy for a batch laid out as `layout`.
    pub fn schedule_policy(
        &self,
        layout: SourceLayout,
        today: NaiveDate,
    ) -> PublishResult<SchedulePolicy> {
        if let Some(raw) = &self.publish_datetimes {
            let datetimes = raw
                .iter()
                .map(|s| schedule::parse_literal(s))
                .collect::<PublishResult<Vec<_>>>()?;
            return Ok(SchedulePolicy::Literal {
                datetimes,
                strict: self.strict_datetimes,
            });
        }

        if layout == SourceLayout::DatedFolders {
            return Ok(SchedulePolicy::FolderDated {
                hour: self.default_publish_hour.unwrap_or(DEFAULT_FOLDER_PUBLISH_HOUR),
            });
        }

        let start_date = self
            .publish_date
            .as_deref()
            .map(schedule::parse_date)
            .transpose()?;
        let hours = match (&self.publish_times, self.videos_per_day) {
            (Some(times), _) => times.clone(),
            (None, Some(_)) => DEFAULT_DAILY_HOURS.to_vec(),
            (None, None) => vec![FALLBACK_DAILY_HOUR],
        };
        Ok(SchedulePolicy::Slots(SlotPolicy::new(
            start_date,
            hours,
            self.videos_per_day,
            today,
        )?))
    }

    pub fn folder_cutoff(&self) -> PublishResult<Option<NaiveDate>> {
        self.folder_date_cutoff
            .as_deref()
            .map(schedule::parse_date)
            .transpose()
    }
}

/// Delays, waits and retry bounds for the upload workflow.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Platform-reported processing errors tolerated per attempt.
    pub max_retries: u32,
    /// Whole-unit attempts made by the batch runner.
    pub max_unit_attempts: u32,
    pub processing_poll: Duration,
    pub publish_poll: Duration,
    pub publish_navigation_wait: Duration,
    pub ui_wait: Duration,
    pub short_ui_wait: Duration,
    pub settle_delay: Duration,
    pub inter_item_delay: Duration,
    pub retry_delay: Duration,
    pub login_probe_wait: Duration,
    pub cover_button_polls: u32,
    pub cover_drag_attempts: u32,
    /// Bounds of the random pause after each crop drag, in milliseconds.
    pub cover_drag_settle_ms: (u64, u64),
    pub overall_deadline: Option<Duration>,
    pub login_timeout: Option<Duration>,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_unit_attempts: 3,
            processing_poll: Duration::from_secs(2),
            publish_poll: Duration::from_millis(500),
            publish_navigation_wait: Duration::from_millis(1500),
            ui_wait: Duration::from_secs(10),
            short_ui_wait: Duration::from_secs(3),
            settle_delay: Duration::from_secs(2),
            inter_item_delay: Duration::from_secs(5),
            retry_delay: Duration::from_secs(5),
            login_probe_wait: Duration::from_secs(5),
            cover_button_polls: 60,
            cover_drag_attempts: 15,
            cover_drag_settle_ms: (800, 1500),
            overall_deadline: None,
            login_timeout: None,
        }
    }
}

impl Tuning {
    pub fn from_config(config: &PublishConfig) -> Self {
        Self {
            overall_deadline: config.overall_deadline_secs.map(Duration::from_secs),
            login_timeout: config.login_timeout_secs.map(Duration::from_secs),
            ..Self::default()
        }
    }

    /// No waiting anywhere; for driving the workflow against mocks.
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            processing_poll: Duration::ZERO,
            publish_poll: Duration::ZERO,
            publish_navigation_wait: Duration::ZERO,
            ui_wait: Duration::ZERO,
            short_ui_wait: Duration::ZERO,
            settle_delay: Duration::ZERO,
            inter_item_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
            login_probe_wait: Duration::ZERO,
            cover_button_polls: 3,
            cover_drag_settle_ms: (0, 0),
            ..Self::default()
        }
    }
}

/// Paths and settings for one base directory. Passed explicitly to
/// everything that touches disk.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub base_dir: PathBuf,
    pub videos_dir: PathBuf,
    pub published_dir: PathBuf,
    pub cookies_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub database_file: PathBuf,
    pub publish: PublishConfig,
    pub tuning: Tuning,
}

impl AppConfig {
    pub fn default_base_dir() -> anyhow::Result<PathBuf> {
        let home = dirs::home_dir().context("Cannot find home directory")?;
        Ok(home.join(".multi-publisher"))
    }

    /// Reads `config.json` under `base_dir` and creates the working directories.
    pub fn load(base_dir: PathBuf) -> PublishResult<Self> {
        let publish = PublishConfig::load(&base_dir.join(CONFIG_FILE))?;
        let config = Self::with_publish_config(base_dir, publish);
        for dir in [
            &config.videos_dir,
            &config.published_dir,
            &config.cookies_dir,
            &config.profiles_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(config)
    }

    pub fn with_publish_config(base_dir: PathBuf, publish: PublishConfig) -> Self {
        Self {
            videos_dir: base_dir.join("videos"),
            published_dir: base_dir.join("published"),
            cookies_dir: base_dir.join("cookies"),
            profiles_dir: base_dir.join("profiles"),
            database_file: base_dir.join(DATABASE_FILE),
            tuning: Tuning::from_config(&publish),
            publish,
            base_dir,
        }
    }
}
