//! One video's upload, driven as a state machine over a `PageDriver`.
//!
//! ```text
//! Idle -> FileAttached -> Processing -> MetadataFilled -> ScheduleSet
//!      -> CoverSet -> Published -> Verified
//! Processing -> ProcessingFailed -> FileAttached   (at most max_retries times)
//! ProcessingFailed -> Failed
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use log::{debug, info, warn};
use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::browser::{click_last, click_target, locate, wait_for_target, ElementState, PageDriver, Point};
use crate::config::{CoverPosition, Tuning};
use crate::error::{PublishError, PublishResult};
use crate::platforms::traits::{CoverSelectors, DefaultPublish, PickerSelectors, ScheduleControl};
use crate::platforms::{PlatformProfile, Target};
use crate::schedule;
use crate::units::VideoUnit;

const CROP_TOLERANCE_PX: f64 = 2.0;
const DRAG_STEP_PX: (f64, f64) = (60.0, 100.0);
const DRAG_MOVES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    FileAttached,
    Processing,
    ProcessingFailed,
    MetadataFilled,
    ScheduleSet,
    CoverSet,
    Published,
    Verified,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Pending,
    Succeeded,
    FailedTransient,
    FailedFatal,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::FailedTransient => "failed_transient",
            Self::FailedFatal => "failed_fatal",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadAttempt {
    pub unit: String,
    /// 1-based.
    pub number: u32,
    pub outcome: AttemptOutcome,
}

/// Per-run choices that are not part of the unit itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadOptions {
    pub original_declaration: bool,
    pub cover_position: CoverPosition,
    /// With no publish time, skip the platform's default schedule.
    pub publish_immediately: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStatus {
    Ready,
    Errored,
}

/// Fails with `ScheduleUnsupported` when `profile`'s schedule control cannot
/// express `at`. Checked before a unit is started and again by `set_schedule`.
pub fn check_schedulable(
    profile: &PlatformProfile,
    at: NaiveDateTime,
    now: NaiveDateTime,
) -> PublishResult<()> {
    let unsupported = |reason: String| PublishError::ScheduleUnsupported {
        platform: profile.id().to_string(),
        at,
        reason,
    };
    let selectors = &profile.selectors;
    if matches!(selectors.schedule, ScheduleControl::Unsupported) {
        return Err(unsupported("the upload form has no schedule control".into()));
    }
    if at <= now {
        return Err(unsupported("the time is in the past".into()));
    }
    let days_ahead = (at.date() - now.date()).num_days();
    if days_ahead > selectors.schedule_window_days {
        return Err(unsupported(format!(
            "{} days ahead exceeds the {}-day window",
            days_ahead, selectors.schedule_window_days
        )));
    }
    if let ScheduleControl::Picker(_) = selectors.schedule {
        let months_ahead =
            (at.year() * 12 + at.month() as i32) - (now.year() * 12 + now.month() as i32);
        if months_ahead > 1 {
            return Err(unsupported("the picker only pages one month ahead".into()));
        }
    }
    Ok(())
}

pub struct UploadSession<'a> {
    driver: &'a dyn PageDriver,
    profile: &'a PlatformProfile,
    tuning: &'a Tuning,
    options: UploadOptions,
    screenshot_dir: Option<PathBuf>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    state: UploadState,
    transitions: Vec<UploadState>,
    processing_failures: u32,
}

impl<'a> UploadSession<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        profile: &'a PlatformProfile,
        tuning: &'a Tuning,
        options: UploadOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            driver,
            profile,
            tuning,
            options,
            screenshot_dir: None,
            cancel,
            deadline: tuning.overall_deadline.map(|limit| Instant::now() + limit),
            state: UploadState::Idle,
            transitions: Vec::new(),
            processing_failures: 0,
        }
    }

    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = Some(dir.into());
        self
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Every state entered, in order.
    pub fn transitions(&self) -> &[UploadState] {
        &self.transitions
    }

    fn transition(&mut self, next: UploadState) {
        debug!("[{} upload] {:?} -> {:?}", self.profile.id(), self.state, next);
        self.state = next;
        self.transitions.push(next);
    }

    fn checkpoint(&self, phase: &'static str) -> PublishResult<()> {
        if self.cancel.is_cancelled() {
            return Err(PublishError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(PublishError::Deadline(phase)),
            _ => Ok(()),
        }
    }

    async fn pause(&self, duration: Duration) -> PublishResult<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(PublishError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Uploads `unit` from the upload page to the post list.
    pub async fn run(&mut self, unit: &VideoUnit) -> PublishResult<()> {
        let id = self.profile.id().to_string();
        info!("[{} upload] starting {}", id, unit.name());
        self.checkpoint("upload")?;
        self.driver.navigate(&self.profile.info.upload_url).await?;

        loop {
            self.attach_file(&unit.video_path).await?;
            match self.await_processing().await? {
                ProcessingStatus::Ready => break,
                ProcessingStatus::Errored => {
                    self.processing_failures += 1;
                    self.transition(UploadState::ProcessingFailed);
                    if self.processing_failures > self.tuning.max_retries {
                        self.transition(UploadState::Failed);
                        return Err(PublishError::ProcessingFailed {
                            attempt: self.processing_failures,
                        });
                    }
                    warn!(
                        "[{} upload] processing error, re-attaching ({}/{})",
                        id, self.processing_failures, self.tuning.max_retries
                    );
                }
            }
        }

        self.fill_metadata(unit).await?;
        self.set_schedule(unit.scheduled_at, Local::now().naive_local())
            .await?;
        self.set_cover(unit.cover_path.as_deref()).await?;
        self.publish().await?;
        info!("[{} upload] {} published", id, unit.name());
        Ok(())
    }

    /// Sets the video file. A previous attempt's media is deleted first so
    /// the new file replaces it.
    pub async fn attach_file(&mut self, video: &Path) -> PublishResult<()> {
        self.checkpoint("attach")?;
        let upload = self.profile.selectors.upload;
        if self.state != UploadState::Idle {
            if let Some(delete) = upload.delete_media {
                if click_target(self.driver, &delete).await? {
                    if let Some(confirm) = upload.delete_confirm {
                        click_target(self.driver, &confirm).await?;
                    }
                }
            }
        }
        if !self
            .driver
            .wait_for(upload.file_input, ElementState::Attached, self.tuning.ui_wait)
            .await?
        {
            return Err(PublishError::driver("file input not found on the upload page"));
        }
        self.driver.set_input_files(upload.file_input, video).await?;
        info!("[{} upload] attached {}", self.profile.id(), video.display());
        self.transition(UploadState::FileAttached);
        Ok(())
    }

    /// Polls until the media is ready or the platform reports an error.
    /// Driver failures while polling are logged and the poll continues.
    pub async fn await_processing(&mut self) -> PublishResult<ProcessingStatus> {
        self.transition(UploadState::Processing);
        loop {
            self.checkpoint("media processing")?;
            match self.processing_status().await {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => debug!("[{} upload] media still processing", self.profile.id()),
                Err(e) => warn!("[{} upload] processing poll failed: {:#}", self.profile.id(), e),
            }
            self.pause(self.tuning.processing_poll).await?;
        }
    }

    async fn processing_status(&self) -> anyhow::Result<Option<ProcessingStatus>> {
        let upload = self.profile.selectors.upload;
        if self.driver.count(upload.error_signal).await? > 0 {
            return Ok(Some(ProcessingStatus::Errored));
        }
        let Some(index) = locate(self.driver, &upload.publish_button).await? else {
            return Ok(None);
        };
        let class = self
            .driver
            .attribute(upload.publish_button.selector, index, "class")
            .await?
            .unwrap_or_default();
        Ok((!class.contains(upload.publish_disabled_class)).then_some(ProcessingStatus::Ready))
    }

    pub async fn fill_metadata(&mut self, unit: &VideoUnit) -> PublishResult<()> {
        self.checkpoint("metadata")?;
        let metadata = self.profile.selectors.metadata;
        if !self
            .driver
            .wait_for(metadata.body_editor, ElementState::Visible, self.tuning.ui_wait)
            .await?
        {
            return Err(PublishError::driver("description editor not found"));
        }
        self.driver.click(metadata.body_editor).await?;
        self.driver.type_text(metadata.body_editor, &unit.body).await?;

        if let Some(input) = metadata.short_title_input {
            let title = self.profile.format_short_title(&unit.short_title);
            self.driver.fill(input, &title).await?;
        }
        if self.options.original_declaration {
            self.click_in_order("original declaration", metadata.original_declaration)
                .await;
        }
        self.click_in_order("location opt-out", metadata.location_opt_out)
            .await;
        self.transition(UploadState::MetadataFilled);
        Ok(())
    }

    /// Optional form steps; the first miss or error ends the sequence.
    async fn click_in_order(&self, what: &str, targets: &[Target]) {
        for target in targets {
            match self.click_when_present(target).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("[{} upload] skipped {}: {} not found", self.profile.id(), what, target.selector);
                    return;
                }
                Err(e) => {
                    warn!("[{} upload] skipped {}: {:#}", self.profile.id(), what, e);
                    return;
                }
            }
        }
    }

    async fn click_when_present(&self, target: &Target) -> anyhow::Result<bool> {
        if !wait_for_target(self.driver, target, self.tuning.short_ui_wait).await? {
            return Ok(false);
        }
        click_target(self.driver, target).await
    }

    /// Selects `at` (or the platform default when `None`) on the form.
    pub async fn set_schedule(
        &mut self,
        at: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> PublishResult<()> {
        self.checkpoint("schedule")?;
        let default = if self.options.publish_immediately {
            DefaultPublish::Immediately
        } else {
            self.profile.selectors.default_publish
        };
        let target = match (at, default) {
            (Some(at), _) => at,
            (None, DefaultPublish::Immediately) => {
                info!("[{} upload] publishing immediately", self.profile.id());
                self.transition(UploadState::ScheduleSet);
                return Ok(());
            }
            (None, DefaultPublish::NextDayAt(hour)) => schedule::next_day_at(now, hour),
        };
        check_schedulable(self.profile, target, now)?;

        match self.profile.selectors.schedule {
            ScheduleControl::Picker(picker) => self.drive_picker(&picker, target, now).await?,
            ScheduleControl::TypedInput {
                toggle,
                input,
                format,
            } => {
                if !click_target(self.driver, &toggle).await? {
                    return Err(self.unsupported(target, "schedule toggle not found"));
                }
                if !self
                    .driver
                    .wait_for(input, ElementState::Visible, self.tuning.short_ui_wait)
                    .await?
                {
                    return Err(self.unsupported(target, "schedule input not found"));
                }
                self.driver.click(input).await?;
                self.driver
                    .fill(input, &target.format(format).to_string())
                    .await?;
                self.driver.press("Enter").await?;
            }
            ScheduleControl::Unsupported => {
                return Err(self.unsupported(target, "the upload form has no schedule control"))
            }
        }
        info!(
            "[{} upload] scheduled for {}",
            self.profile.id(),
            target.format(schedule::LITERAL_FORMAT)
        );
        self.transition(UploadState::ScheduleSet);
        Ok(())
    }

    fn unsupported(&self, at: NaiveDateTime, reason: &str) -> PublishError {
        PublishError::ScheduleUnsupported {
            platform: self.profile.id().to_string(),
            at,
            reason: reason.to_string(),
        }
    }

    async fn drive_picker(
        &self,
        picker: &PickerSelectors,
        at: NaiveDateTime,
        now: NaiveDateTime,
    ) -> PublishResult<()> {
        if !click_target(self.driver, &picker.toggle).await? {
            return Err(self.unsupported(at, "schedule toggle not found"));
        }
        self.pause(self.tuning.settle_delay).await?;
        self.driver.click(picker.date_input).await?;
        if !self
            .driver
            .wait_for(picker.day_cells, ElementState::Visible, self.tuning.short_ui_wait)
            .await?
        {
            return Err(self.unsupported(at, "date panel did not open"));
        }

        let label = self.driver.texts(picker.month_label.selector).await?;
        let shown_month = label
            .iter()
            .filter(|text| picker.month_label.matches_text(text))
            .find_map(|text| leading_number(text))
            .unwrap_or(now.month());
        if shown_month != at.month() {
            self.driver.click(picker.next_month).await?;
        }

        let day = at.day();
        self.pick(picker.day_cells, day, at, "day").await?;

        self.driver.click(picker.time_input).await?;
        if !self
            .driver
            .wait_for(picker.hour_items, ElementState::Visible, self.tuning.short_ui_wait)
            .await?
        {
            return Err(self.unsupported(at, "time panel did not open"));
        }
        self.pick(picker.hour_items, at.hour(), at, "hour").await?;
        self.pick(picker.minute_items, at.minute(), at, "minute")
            .await?;
        self.driver.click(picker.dismiss).await?;
        Ok(())
    }

    /// Clicks the list entry whose number equals `value`.
    async fn pick(
        &self,
        selector: &str,
        value: u32,
        at: NaiveDateTime,
        what: &str,
    ) -> PublishResult<()> {
        let entries = self.driver.texts(selector).await?;
        let index = entries
            .iter()
            .position(|text| text.trim().parse::<u32>().ok() == Some(value))
            .ok_or_else(|| self.unsupported(at, &format!("{} {} is not selectable", what, value)))?;
        self.driver.click_nth(selector, index).await?;
        Ok(())
    }

    /// Best-effort; a cover that cannot be set is logged and the upload
    /// continues.
    pub async fn set_cover(&mut self, cover: Option<&Path>) -> PublishResult<()> {
        let Some(selectors) = self.profile.selectors.cover else {
            self.transition(UploadState::CoverSet);
            return Ok(());
        };
        match self.try_set_cover(&selectors, cover).await {
            Ok(true) => info!("[{} upload] cover set", self.profile.id()),
            Ok(false) => {
                warn!("[{} upload] cover not adjusted, keeping the default", self.profile.id());
                self.capture("cover").await;
            }
            Err(e @ (PublishError::Cancelled | PublishError::Deadline(_))) => return Err(e),
            Err(e) => {
                warn!("[{} upload] cover step failed: {}", self.profile.id(), e);
                self.capture("cover").await;
            }
        }
        self.transition(UploadState::CoverSet);
        Ok(())
    }

    async fn try_set_cover(
        &self,
        selectors: &CoverSelectors,
        cover: Option<&Path>,
    ) -> PublishResult<bool> {
        let mut opened = false;
        for _ in 0..self.tuning.cover_button_polls {
            self.checkpoint("cover")?;
            if click_target(self.driver, &selectors.open_editor).await? {
                opened = true;
                break;
            }
            self.pause(self.tuning.settle_delay).await?;
        }
        if !opened {
            return Ok(false);
        }
        if !self
            .driver
            .wait_for(selectors.editor, ElementState::Visible, self.tuning.ui_wait)
            .await?
        {
            return Ok(false);
        }

        let adjusted = match cover {
            Some(image) => {
                self.driver.set_input_files(selectors.file_input, image).await?;
                self.pause(self.tuning.settle_delay).await?;
                true
            }
            None => self.adjust_crop(selectors).await?,
        };
        Ok(click_last(self.driver, &selectors.confirm).await? && adjusted)
    }

    /// Drags the crop window toward the configured position in short random
    /// steps. `false` when it did not settle within the attempt budget.
    async fn adjust_crop(&self, selectors: &CoverSelectors) -> PublishResult<bool> {
        for _ in 0..self.tuning.cover_drag_attempts {
            self.checkpoint("cover")?;
            let (Some(window), Some(frame)) = (
                self.driver.bounding_box(selectors.crop_window).await?,
                self.driver.bounding_box(selectors.editor).await?,
            ) else {
                return Ok(false);
            };
            let target_y = match self.options.cover_position {
                CoverPosition::Top => frame.y,
                CoverPosition::Middle => frame.y + (frame.height - window.height) / 2.0,
                CoverPosition::Bottom => frame.y + frame.height - window.height,
            };
            let delta = target_y - window.y;
            if delta.abs() <= CROP_TOLERANCE_PX {
                return Ok(true);
            }

            let (step, settle_ms) = {
                let mut rng = rand::thread_rng();
                let (min, max) = self.tuning.cover_drag_settle_ms;
                (
                    rng.gen_range(DRAG_STEP_PX.0..=DRAG_STEP_PX.1),
                    rng.gen_range(min..=max),
                )
            };
            let from = window.center();
            let to = Point {
                x: from.x,
                y: from.y + step.min(delta.abs()).copysign(delta),
            };
            self.driver.drag(from, to, DRAG_MOVES).await?;
            self.pause(Duration::from_millis(settle_ms)).await?;
        }
        Ok(false)
    }

    async fn capture(&self, step: &str) {
        let Some(dir) = &self.screenshot_dir else {
            return;
        };
        let path = dir.join(format!(
            "{}_{}_{}.png",
            self.profile.id(),
            step,
            Local::now().format("%Y%m%d%H%M%S")
        ));
        match self.driver.screenshot(&path).await {
            Ok(()) => info!("[{} upload] screenshot saved to {}", self.profile.id(), path.display()),
            Err(e) => warn!("[{} upload] screenshot failed: {:#}", self.profile.id(), e),
        }
    }

    /// Clicks publish until the page lands on the post list. An unclear
    /// result is never a failure; the loop only ends on success, the
    /// deadline or cancellation.
    pub async fn publish(&mut self) -> PublishResult<()> {
        let post_list = self.profile.info.post_list_url.clone();
        let button = self.profile.selectors.upload.publish_button;
        loop {
            self.checkpoint("publish confirmation")?;
            match click_target(self.driver, &button).await {
                Ok(true) if self.state != UploadState::Published => {
                    self.transition(UploadState::Published)
                }
                Ok(_) => {}
                Err(e) => debug!("[{} upload] publish click failed: {:#}", self.profile.id(), e),
            }
            match self
                .driver
                .wait_for_url(&post_list, self.tuning.publish_navigation_wait)
                .await
            {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => debug!("[{} upload] waiting for post list: {:#}", self.profile.id(), e),
            }
            if let Ok(url) = self.driver.current_url().await {
                if url.starts_with(&post_list) {
                    break;
                }
            }
            info!("[{} upload] still publishing", self.profile.id());
            self.pause(self.tuning.publish_poll).await?;
        }
        if self.state != UploadState::Published {
            self.transition(UploadState::Published);
        }
        self.transition(UploadState::Verified);
        Ok(())
    }
}

fn leading_number(text: &str) -> Option<u32> {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::get_profile;
    use crate::testing::{channels_form, MockDriver};
    use chrono::Duration as Days;

    fn unit(scheduled_at: Option<NaiveDateTime>) -> VideoUnit {
        VideoUnit {
            video_path: PathBuf::from("/videos/clip.mp4"),
            metadata_path: PathBuf::from("/videos/clip.txt"),
            short_title: "春日,花开".into(),
            body: "#spring #flowers".into(),
            cover_path: None,
            folder_date: None,
            scheduled_at,
            source: crate::units::UnitSource::File,
        }
    }

    fn now() -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn tomorrow_at(hour: u32) -> NaiveDateTime {
        schedule::next_day_at(now(), hour)
    }

    fn dt(raw: &str) -> NaiveDateTime {
        schedule::parse_literal(raw).unwrap()
    }

    fn session<'a>(
        driver: &'a MockDriver,
        profile: &'a PlatformProfile,
        tuning: &'a Tuning,
    ) -> UploadSession<'a> {
        UploadSession::new(
            driver,
            profile,
            tuning,
            UploadOptions::default(),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn full_upload_walks_every_state() {
        let profile = get_profile("wechat").unwrap();
        let tuning = Tuning::immediate();
        let at = tomorrow_at(9);
        let mock = channels_form(now());
        let mut upload = session(&mock, &profile, &tuning);

        upload.run(&unit(Some(at))).await.unwrap();

        assert_eq!(
            upload.transitions(),
            &[
                UploadState::FileAttached,
                UploadState::Processing,
                UploadState::MetadataFilled,
                UploadState::ScheduleSet,
                UploadState::CoverSet,
                UploadState::Published,
                UploadState::Verified,
            ]
        );
        assert_eq!(upload.state(), UploadState::Verified);
        assert!(mock.url().starts_with(&profile.info.post_list_url));

        let calls = mock.calls();
        assert!(calls.contains(&"type div.input-editor #spring #flowers".to_string()));
        assert!(calls.contains(&"fill div.short-title-wrap input[type=\"text\"] 春日 花开 ".to_string()));
        assert!(calls.contains(&"click div.option-item .name#1".to_string()));
        let day = at.day() - 1;
        assert!(calls.contains(&format!(
            "click table.weui-desktop-picker__table a:not(.weui-desktop-picker__disabled)#{day}"
        )));
        assert!(calls.contains(&"click ol.weui-desktop-picker__time__hour li#9".to_string()));
        assert!(calls.contains(&"click ol.weui-desktop-picker__time__minute li#0".to_string()));
    }

    #[tokio::test]
    async fn processing_errors_reattach_then_fail_after_max_retries() {
        let profile = get_profile("wechat").unwrap();
        let tuning = Tuning::immediate();
        let mock = channels_form(now());
        let upload_selectors = profile.selectors.upload;
        mock.set_count(upload_selectors.error_signal, 1)
            .set_texts("div.media-status-content div.tag-inner", ["删除"])
            .set_texts("button", ["删除"]);
        let mut upload = session(&mock, &profile, &tuning);

        let err = upload.run(&unit(None)).await.unwrap_err();
        assert!(matches!(err, PublishError::ProcessingFailed { attempt: 4 }));
        assert_eq!(upload.state(), UploadState::Failed);

        let reattaches = upload
            .transitions()
            .windows(2)
            .filter(|w| w == &[UploadState::ProcessingFailed, UploadState::FileAttached])
            .count();
        assert_eq!(reattaches, tuning.max_retries as usize);
        assert_eq!(
            mock.calls_starting_with("upload input[type=\"file\"]"),
            tuning.max_retries as usize + 1
        );
        assert_eq!(
            mock.calls_starting_with("click div.media-status-content"),
            tuning.max_retries as usize
        );
    }

    #[tokio::test]
    async fn processing_recovers_after_one_error() {
        let profile = get_profile("wechat").unwrap();
        let tuning = Tuning::immediate();
        let mock = channels_form(now());
        let disabled = "weui-desktop-btn weui-desktop-btn_disabled";
        mock.script_count(profile.selectors.upload.error_signal, [1, 0])
            .script_attribute(
                "div.form-btns button",
                "class",
                [disabled, disabled, "weui-desktop-btn"],
            )
            .fail("count", 1);
        let mut upload = session(&mock, &profile, &tuning);

        upload.run(&unit(Some(tomorrow_at(18)))).await.unwrap();
        let failures = upload
            .transitions()
            .iter()
            .filter(|s| **s == UploadState::ProcessingFailed)
            .count();
        assert_eq!(failures, 1);
        assert_eq!(upload.state(), UploadState::Verified);
    }

    #[test]
    fn schedule_outside_picker_range_is_unsupported() {
        let profile = get_profile("wechat").unwrap();
        let now = dt("2025-08-14 10:00");

        for at in ["2025-08-14 09:00", "2025-09-20 09:00", "2025-10-01 09:00"] {
            let err = check_schedulable(&profile, dt(at), now).unwrap_err();
            assert!(
                matches!(err, PublishError::ScheduleUnsupported { .. }),
                "{at} should be rejected"
            );
        }
        assert!(check_schedulable(&profile, dt("2025-09-10 09:00"), now).is_ok());

        let tiktok = get_profile("tiktok").unwrap();
        assert!(check_schedulable(&tiktok, dt("2025-08-15 09:00"), now).is_err());
    }

    #[tokio::test]
    async fn missing_minute_entry_is_unsupported() {
        let profile = get_profile("wechat").unwrap();
        let tuning = Tuning::immediate();
        let now = now();
        let mock = channels_form(now);
        mock.set_texts("ol.weui-desktop-picker__time__minute li", ["00", "30"]);
        let mut upload = session(&mock, &profile, &tuning);

        let at = tomorrow_at(9) + Days::minutes(15);
        let err = upload.set_schedule(Some(at), now).await.unwrap_err();
        assert!(matches!(err, PublishError::ScheduleUnsupported { .. }));
    }

    #[tokio::test]
    async fn picker_pages_to_next_month() {
        let profile = get_profile("wechat").unwrap();
        let tuning = Tuning::immediate();
        let now = dt("2025-08-30 10:00");
        let mock = channels_form(now);
        let mut upload = session(&mock, &profile, &tuning);

        upload
            .set_schedule(Some(dt("2025-09-02 07:30")), now)
            .await
            .unwrap();
        let calls = mock.calls();
        assert!(calls.contains(&"click button.weui-desktop-btn__icon__right#0".to_string()));
        assert!(calls.iter().any(|c| c.ends_with("picker__disabled)#1")));
        assert!(calls.contains(&"click ol.weui-desktop-picker__time__minute li#30".to_string()));
    }

    #[tokio::test]
    async fn typed_schedule_and_immediate_default() {
        let profile = get_profile("douyin").unwrap();
        let tuning = Tuning::immediate();
        let now = dt("2025-08-14 10:00");
        let mock = MockDriver::new();
        let ScheduleControl::TypedInput { toggle, input, .. } = profile.selectors.schedule else {
            panic!("douyin schedules through a text input");
        };
        mock.set_texts(toggle.selector, ["立即发布", "定时发布"])
            .set_count(input, 1);

        let mut upload = session(&mock, &profile, &tuning);
        upload
            .set_schedule(Some(dt("2025-08-16 18:00")), now)
            .await
            .unwrap();
        assert!(mock
            .calls()
            .contains(&format!("fill {} 2025-08-16 18:00", input)));
        assert!(mock.calls().contains(&"press Enter".to_string()));

        let quiet = MockDriver::new();
        let mut immediate = session(&quiet, &profile, &tuning);
        immediate.set_schedule(None, now).await.unwrap();
        assert!(quiet.calls().is_empty());
        assert_eq!(immediate.state(), UploadState::ScheduleSet);
    }

    #[tokio::test]
    async fn channels_default_to_next_morning_unless_immediate() {
        let profile = get_profile("wechat").unwrap();
        let tuning = Tuning::immediate();
        let now = dt("2025-08-14 10:00");

        let mock = channels_form(now);
        let mut upload = session(&mock, &profile, &tuning);
        upload.set_schedule(None, now).await.unwrap();
        assert!(mock.calls().iter().any(|c| c.ends_with("picker__disabled)#14")));
        assert!(mock.calls().contains(&"click ol.weui-desktop-picker__time__hour li#9".to_string()));

        let quiet = MockDriver::new();
        let options = UploadOptions {
            publish_immediately: true,
            ..UploadOptions::default()
        };
        let mut immediate =
            UploadSession::new(&quiet, &profile, &tuning, options, CancellationToken::new());
        immediate.set_schedule(None, now).await.unwrap();
        assert!(quiet.calls().is_empty());
    }

    #[tokio::test]
    async fn crop_window_is_dragged_to_the_top() {
        let profile = get_profile("wechat").unwrap();
        let tuning = Tuning::immediate();
        let mock = channels_form(now());
        let mut upload = session(&mock, &profile, &tuning);

        upload.set_cover(None).await.unwrap();
        let cover = profile.selectors.cover.unwrap();
        let window = mock.box_of(cover.crop_window).unwrap();
        assert!((window.y - 100.0).abs() <= CROP_TOLERANCE_PX);
        let drags = mock.calls_starting_with("drag");
        assert!((3..=5).contains(&drags), "300px in 60-100px steps, got {drags}");
        assert!(mock.calls().contains(&"click button#1".to_string()));
        assert_eq!(upload.state(), UploadState::CoverSet);
    }

    #[tokio::test]
    async fn unreachable_crop_position_is_not_fatal() {
        let profile = get_profile("wechat").unwrap();
        let tuning = Tuning::immediate();
        let mock = channels_form(now());
        let cover = profile.selectors.cover.unwrap();
        mock.drag_moves("nothing");
        let mut upload = session(&mock, &profile, &tuning)
            .with_screenshot_dir("/tmp/shots");

        upload.set_cover(None).await.unwrap();
        assert_eq!(
            mock.calls_starting_with("drag"),
            tuning.cover_drag_attempts as usize
        );
        assert_eq!(mock.calls_starting_with("screenshot /tmp/shots/wechat_cover_"), 1);
        assert_eq!(mock.box_of(cover.crop_window).unwrap().y, 400.0);
        assert_eq!(upload.state(), UploadState::CoverSet);
    }

    #[tokio::test]
    async fn explicit_cover_is_uploaded() {
        let profile = get_profile("wechat").unwrap();
        let tuning = Tuning::immediate();
        let mock = channels_form(now());
        let mut upload = session(&mock, &profile, &tuning);

        upload
            .set_cover(Some(Path::new("/videos/clip.png")))
            .await
            .unwrap();
        assert!(mock
            .calls()
            .contains(&"upload input[type=\"file\"][accept*=\"image\"] /videos/clip.png".to_string()));
        assert_eq!(mock.calls_starting_with("drag"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn publish_keeps_polling_until_post_list() {
        let profile = get_profile("wechat").unwrap();
        let tuning = Tuning::default();
        let mock = MockDriver::new();
        mock.set_texts("div.form-btns button", ["发表"]);
        mock.fail("wait_for_url", 3);
        mock.redirect("about:settled", &profile.info.post_list_url);

        let mut upload = session(&mock, &profile, &tuning);
        {
            let publish = upload.publish();
            tokio::pin!(publish);
            let settle = async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                mock.navigate("about:settled").await.unwrap();
                std::future::pending::<()>().await
            };
            tokio::select! {
                result = &mut publish => result.unwrap(),
                _ = settle => unreachable!(),
            }
        }
        assert!(mock.calls_starting_with("click div.form-btns button") >= 4);
        assert_eq!(
            upload.transitions(),
            &[UploadState::Published, UploadState::Verified]
        );
    }

    #[tokio::test]
    async fn deadline_and_cancellation_stop_the_publish_loop() {
        let profile = get_profile("wechat").unwrap();
        let mock = MockDriver::new();
        mock.set_texts("div.form-btns button", ["发表"]);

        let tuning = Tuning {
            overall_deadline: Some(Duration::ZERO),
            ..Tuning::immediate()
        };
        let mut upload = session(&mock, &profile, &tuning);
        assert!(matches!(
            upload.publish().await,
            Err(PublishError::Deadline("publish confirmation"))
        ));

        let tuning = Tuning::immediate();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut upload = UploadSession::new(&mock, &profile, &tuning, UploadOptions::default(), cancel);
        assert!(matches!(
            upload.run(&unit(None)).await,
            Err(PublishError::Cancelled)
        ));
    }

    #[test]
    fn month_labels() {
        assert_eq!(leading_number("9月"), Some(9));
        assert_eq!(leading_number(" 12月 "), Some(12));
        assert_eq!(leading_number("月"), None);
    }
}
