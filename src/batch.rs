//! Sequential batch uploads for one account.

use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::browser::PageDriver;
use crate::config::Tuning;
use crate::database::queries::{self, NewPublishRecord};
use crate::database::Database;
use crate::error::{PublishError, PublishResult};
use crate::platforms::PlatformProfile;
use crate::schedule::{self, SchedulePolicy};
use crate::session::{AccountKey, SessionStore};
use crate::units::{self, VideoUnit};
use crate::upload::{self, AttemptOutcome, UploadAttempt, UploadOptions, UploadSession};

#[derive(Debug, Clone)]
pub struct UnitReport {
    pub name: String,
    pub scheduled_at: Option<NaiveDateTime>,
    pub outcome: AttemptOutcome,
    pub attempts: Vec<UploadAttempt>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub units: Vec<UnitReport>,
    /// Set when the run stopped early; remaining units were not started.
    pub cancelled: bool,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.count(AttemptOutcome::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(AttemptOutcome::FailedFatal)
    }

    fn count(&self, outcome: AttemptOutcome) -> usize {
        self.units.iter().filter(|u| u.outcome == outcome).count()
    }
}

pub struct BatchRunner<'a> {
    driver: &'a dyn PageDriver,
    profile: &'a PlatformProfile,
    sessions: &'a SessionStore,
    key: AccountKey,
    tuning: Tuning,
    options: UploadOptions,
    cancel: CancellationToken,
    published_dir: Option<PathBuf>,
    screenshot_dir: Option<PathBuf>,
    ledger: Option<&'a Database>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        profile: &'a PlatformProfile,
        sessions: &'a SessionStore,
        key: AccountKey,
        tuning: Tuning,
    ) -> Self {
        Self {
            driver,
            profile,
            sessions,
            key,
            tuning,
            options: UploadOptions::default(),
            cancel: CancellationToken::new(),
            published_dir: None,
            screenshot_dir: None,
            ledger: None,
        }
    }

    pub fn options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Successful units are moved here; without it they stay in place.
    pub fn published_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.published_dir = Some(dir.into());
        self
    }

    pub fn screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = Some(dir.into());
        self
    }

    pub fn ledger(mut self, db: &'a Database) -> Self {
        self.ledger = Some(db);
        self
    }

    /// Assigns every unit its publish time before anything is uploaded.
    pub fn plan(units: &mut [VideoUnit], policy: &SchedulePolicy) -> PublishResult<()> {
        let folder_dates: Vec<_> = units.iter().map(|u| u.folder_date).collect();
        let times = policy.plan(&folder_dates)?;
        for (unit, at) in units.iter_mut().zip(times) {
            unit.scheduled_at = at;
        }
        Ok(())
    }

    /// Uploads `units` one at a time. Only a bad policy or cancellation ends
    /// the batch early; a failed unit is reported and the next one starts.
    pub async fn run(
        &self,
        mut units: Vec<VideoUnit>,
        policy: &SchedulePolicy,
    ) -> PublishResult<BatchReport> {
        Self::plan(&mut units, policy)?;
        for (index, unit) in units.iter().enumerate() {
            info!(
                "[batch] #{} {} -> {}",
                index + 1,
                unit.name(),
                unit.scheduled_at
                    .map(|at| at.format(schedule::LITERAL_FORMAT).to_string())
                    .unwrap_or_else(|| "platform default".into())
            );
        }

        let mut report = BatchReport::default();
        let total = units.len();
        for (index, unit) in units.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let unit_report = match self.run_unit(unit).await {
                Ok(unit_report) => unit_report,
                Err(PublishError::Cancelled) => {
                    warn!("[batch] cancelled during {}", unit.name());
                    report.cancelled = true;
                    break;
                }
                Err(e) => return Err(e),
            };
            self.record(unit, &unit_report);
            let succeeded = unit_report.outcome == AttemptOutcome::Succeeded;
            report.units.push(unit_report);

            if succeeded && index + 1 < total {
                info!(
                    "[batch] waiting {}s before the next video",
                    self.tuning.inter_item_delay.as_secs()
                );
                if self.pause(self.tuning.inter_item_delay).await.is_err() {
                    report.cancelled = true;
                    break;
                }
            }
        }

        info!(
            "[batch] done: {} succeeded, {} failed{}",
            report.succeeded(),
            report.failed(),
            if report.cancelled { ", cancelled" } else { "" }
        );
        Ok(report)
    }

    async fn pause(&self, duration: std::time::Duration) -> PublishResult<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(PublishError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    async fn run_unit(&self, unit: &VideoUnit) -> PublishResult<UnitReport> {
        let name = unit.name();
        let mut report = UnitReport {
            name: name.clone(),
            scheduled_at: unit.scheduled_at,
            outcome: AttemptOutcome::Pending,
            attempts: Vec::new(),
            error: None,
        };

        if let Some(at) = unit.scheduled_at {
            if let Err(e) = upload::check_schedulable(self.profile, at, Local::now().naive_local()) {
                error!("[batch] skipping {}: {}", name, e);
                report.outcome = AttemptOutcome::FailedFatal;
                report.error = Some(e.to_string());
                return Ok(report);
            }
        }

        let max_attempts = self.tuning.max_unit_attempts.max(1);
        for number in 1..=max_attempts {
            let mut session = UploadSession::new(
                self.driver,
                self.profile,
                &self.tuning,
                self.options,
                self.cancel.clone(),
            );
            if let Some(dir) = &self.screenshot_dir {
                session = session.with_screenshot_dir(dir);
            }

            match session.run(unit).await {
                Ok(()) => {
                    report.attempts.push(UploadAttempt {
                        unit: name.clone(),
                        number,
                        outcome: AttemptOutcome::Succeeded,
                    });
                    report.outcome = AttemptOutcome::Succeeded;
                    self.after_success(unit).await;
                    return Ok(report);
                }
                Err(e) if e.aborts_batch() => return Err(e),
                Err(e) => {
                    let fatal = number == max_attempts;
                    report.attempts.push(UploadAttempt {
                        unit: name.clone(),
                        number,
                        outcome: if fatal {
                            AttemptOutcome::FailedFatal
                        } else {
                            AttemptOutcome::FailedTransient
                        },
                    });
                    if fatal {
                        let fatal = PublishError::Fatal {
                            unit: name.clone(),
                            attempts: number,
                            reason: e.to_string(),
                        };
                        error!("[batch] {}", fatal);
                        report.outcome = AttemptOutcome::FailedFatal;
                        report.error = Some(fatal.to_string());
                        return Ok(report);
                    }
                    warn!(
                        "[batch] {} attempt {}/{} failed: {}; retrying in {}s",
                        name,
                        number,
                        max_attempts,
                        e,
                        self.tuning.retry_delay.as_secs()
                    );
                    self.pause(self.tuning.retry_delay).await?;
                }
            }
        }
        Ok(report)
    }

    /// Token refresh and file moves. Neither can undo a published upload,
    /// so failures are only logged.
    async fn after_success(&self, unit: &VideoUnit) {
        if let Err(e) = self.sessions.refresh(&self.key, self.driver).await {
            warn!("[batch] could not refresh the session for {}: {}", self.key, e);
        }
        if let Some(dir) = &self.published_dir {
            units::relocate_published(unit, dir);
        }
    }

    fn record(&self, unit: &VideoUnit, report: &UnitReport) {
        let Some(db) = self.ledger else {
            return;
        };
        let video_path = unit.video_path.to_string_lossy();
        let record = NewPublishRecord {
            unit_name: &report.name,
            video_path: &video_path,
            platform: &self.key.platform,
            account: &self.key.account,
            scheduled_at: report
                .scheduled_at
                .map(|at| at.format(schedule::LITERAL_FORMAT).to_string()),
            outcome: report.outcome.as_str(),
            attempts: report.attempts.len() as u32,
            error_message: report.error.as_deref(),
        };
        let written = db
            .conn()
            .and_then(|conn| queries::insert_publish_record(&conn, &record));
        if let Err(e) = written {
            warn!("[batch] could not record {}: {:#}", report.name, e);
        }
    }
}
