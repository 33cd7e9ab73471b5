//! Scripted `PageDriver` for exercising sessions, uploads and batches.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime};

use crate::browser::{BoundingBox, ElementState, PageDriver, Point, StorageState};
use crate::platforms::wechat;

/// Values handed out in order; the last one repeats forever.
#[derive(Debug, Default)]
struct Sticky<T>(VecDeque<T>);

impl<T: Clone> Sticky<T> {
    fn new(values: impl IntoIterator<Item = T>) -> Self {
        Self(values.into_iter().collect())
    }

    fn peek(&self) -> Option<T> {
        self.0.front().cloned()
    }

    fn next(&mut self) -> Option<T> {
        if self.0.len() > 1 {
            self.0.pop_front()
        } else {
            self.peek()
        }
    }
}

#[derive(Debug, Default)]
struct PageState {
    calls: Vec<String>,
    url: String,
    counts: HashMap<String, Sticky<usize>>,
    texts: HashMap<String, Vec<String>>,
    attributes: HashMap<String, Sticky<String>>,
    boxes: HashMap<String, BoundingBox>,
    redirects: HashMap<String, String>,
    click_navigates: HashMap<String, String>,
    drag_moves: Option<String>,
    storage: StorageState,
    failures: HashMap<&'static str, usize>,
}

impl PageState {
    fn count_of(&self, selector: &str) -> usize {
        self.counts
            .get(selector)
            .and_then(Sticky::peek)
            .or_else(|| self.texts.get(selector).map(Vec::len))
            .unwrap_or(0)
    }
}

#[derive(Default)]
pub struct MockDriver {
    page: Mutex<PageState>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn page(&self) -> MutexGuard<'_, PageState> {
        self.page.lock().unwrap()
    }

    pub fn set_count(&self, selector: &str, count: usize) -> &Self {
        self.page()
            .counts
            .insert(selector.into(), Sticky::new([count]));
        self
    }

    pub fn script_count(&self, selector: &str, counts: impl IntoIterator<Item = usize>) -> &Self {
        self.page().counts.insert(selector.into(), Sticky::new(counts));
        self
    }

    pub fn set_texts<S: Into<String>>(
        &self,
        selector: &str,
        texts: impl IntoIterator<Item = S>,
    ) -> &Self {
        self.page()
            .texts
            .insert(selector.into(), texts.into_iter().map(Into::into).collect());
        self
    }

    pub fn script_attribute<S: Into<String>>(
        &self,
        selector: &str,
        name: &str,
        values: impl IntoIterator<Item = S>,
    ) -> &Self {
        self.page().attributes.insert(
            format!("{selector}@{name}"),
            Sticky::new(values.into_iter().map(Into::into)),
        );
        self
    }

    pub fn set_box(&self, selector: &str, bounds: BoundingBox) -> &Self {
        self.page().boxes.insert(selector.into(), bounds);
        self
    }

    /// Drags move the box of `selector` vertically by the drag distance.
    pub fn drag_moves(&self, selector: &str) -> &Self {
        self.page().drag_moves = Some(selector.into());
        self
    }

    pub fn redirect(&self, from: &str, to: &str) -> &Self {
        self.page().redirects.insert(from.into(), to.into());
        self
    }

    pub fn on_click_navigate(&self, selector: &str, url: &str) -> &Self {
        self.page()
            .click_navigates
            .insert(selector.into(), url.into());
        self
    }

    pub fn set_storage(&self, state: StorageState) -> &Self {
        self.page().storage = state;
        self
    }

    /// The next `times` calls of `method` fail.
    pub fn fail(&self, method: &'static str, times: usize) -> &Self {
        self.page().failures.insert(method, times);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.page().calls.clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        self.page()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn url(&self) -> String {
        self.page().url.clone()
    }

    pub fn box_of(&self, selector: &str) -> Option<BoundingBox> {
        self.page().boxes.get(selector).copied()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, method: &'static str, detail: String) -> Result<InFlight<'_>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        tokio::task::yield_now().await;

        let mut page = self.page();
        page.calls.push(detail);
        if let Some(remaining) = page.failures.get_mut(method) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(anyhow!("scripted {} failure", method));
            }
        }
        Ok(guard)
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        let _call = self.enter("navigate", format!("navigate {url}")).await?;
        let mut page = self.page();
        page.url = page.redirects.get(url).cloned().unwrap_or_else(|| url.into());
        Ok(())
    }

    async fn wait_for(
        &self,
        selector: &str,
        state: ElementState,
        _timeout: Duration,
    ) -> Result<bool> {
        let _call = self.enter("wait_for", format!("wait_for {selector}")).await?;
        let present = self.page().count_of(selector) > 0;
        Ok(match state {
            ElementState::Attached | ElementState::Visible => present,
            ElementState::Hidden => !present,
        })
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let _call = self.enter("count", format!("count {selector}")).await?;
        let mut page = self.page();
        if let Some(count) = page.counts.get_mut(selector).and_then(Sticky::next) {
            return Ok(count);
        }
        Ok(page.count_of(selector))
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<()> {
        let _call = self
            .enter("click", format!("click {selector}#{index}"))
            .await?;
        let mut page = self.page();
        if let Some(url) = page.click_navigates.get(selector).cloned() {
            page.url = url;
        }
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let _call = self
            .enter("type_text", format!("type {selector} {text}"))
            .await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let _call = self.enter("fill", format!("fill {selector} {text}")).await?;
        Ok(())
    }

    async fn press(&self, key: &str) -> Result<()> {
        let _call = self.enter("press", format!("press {key}")).await?;
        Ok(())
    }

    async fn set_input_files(&self, selector: &str, path: &Path) -> Result<()> {
        let _call = self
            .enter(
                "set_input_files",
                format!("upload {selector} {}", path.display()),
            )
            .await?;
        Ok(())
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        let _call = self.enter("texts", format!("texts {selector}")).await?;
        Ok(self.page().texts.get(selector).cloned().unwrap_or_default())
    }

    async fn attribute(&self, selector: &str, index: usize, name: &str) -> Result<Option<String>> {
        let _call = self
            .enter("attribute", format!("attribute {selector}#{index}@{name}"))
            .await?;
        Ok(self
            .page()
            .attributes
            .get_mut(&format!("{selector}@{name}"))
            .and_then(Sticky::next))
    }

    async fn bounding_box(&self, selector: &str) -> Result<Option<BoundingBox>> {
        let _call = self
            .enter("bounding_box", format!("bounding_box {selector}"))
            .await?;
        Ok(self.page().boxes.get(selector).copied())
    }

    async fn drag(&self, from: Point, to: Point, steps: u32) -> Result<()> {
        let _call = self
            .enter(
                "drag",
                format!("drag ({:.0},{:.0})->({:.0},{:.0}) in {steps}", from.x, from.y, to.x, to.y),
            )
            .await?;
        let mut page = self.page();
        if let Some(selector) = page.drag_moves.clone() {
            if let Some(bounds) = page.boxes.get_mut(&selector) {
                bounds.y += to.y - from.y;
            }
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let _call = self.enter("current_url", "current_url".into()).await?;
        Ok(self.page().url.clone())
    }

    async fn wait_for_url(&self, url: &str, _timeout: Duration) -> Result<bool> {
        let _call = self
            .enter("wait_for_url", format!("wait_for_url {url}"))
            .await?;
        Ok(self.page().url.starts_with(url))
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let _call = self
            .enter("screenshot", format!("screenshot {}", path.display()))
            .await?;
        Ok(())
    }

    async fn storage_state(&self) -> Result<StorageState> {
        let _call = self.enter("storage_state", "storage_state".into()).await?;
        Ok(self.page().storage.clone())
    }

    async fn restore_storage_state(&self, state: &StorageState) -> Result<()> {
        let _call = self
            .enter("restore_storage_state", "restore_storage_state".into())
            .await?;
        self.page().storage = state.clone();
        Ok(())
    }
}

/// A Channels upload form on which a complete upload succeeds. The picker
/// shows the month of `now`.
pub fn channels_form(now: NaiveDateTime) -> MockDriver {
    let selectors = wechat::SELECTORS;
    let info = wechat::info();
    let mock = MockDriver::new();

    let upload = selectors.upload;
    mock.set_count(upload.file_input, 1)
        .set_count(upload.error_signal, 0)
        .set_texts(upload.publish_button.selector, ["发表"])
        .script_attribute(
            upload.publish_button.selector,
            "class",
            ["weui-desktop-btn weui-desktop-btn_primary"],
        )
        .on_click_navigate(upload.publish_button.selector, &info.post_list_url);

    let metadata = selectors.metadata;
    mock.set_count(metadata.body_editor, 1)
        .set_count("div.short-title-wrap input[type=\"text\"]", 1)
        .set_count("div.position-display-wrap", 1)
        .set_texts("div.option-item .name", ["显示位置", "不显示位置"]);

    if let crate::platforms::traits::ScheduleControl::Picker(picker) = selectors.schedule {
        mock.set_texts(picker.toggle.selector, ["定时", "定时"])
            .set_count(picker.date_input, 1)
            .set_texts(picker.month_label.selector, [format!("{}月", now.month())])
            .set_count(picker.next_month, 1)
            .set_texts(picker.day_cells, (1..=31).map(|d| d.to_string()))
            .set_count(picker.time_input, 1)
            .set_texts(picker.hour_items, (0..24).map(|h| format!("{h:02}")))
            .set_texts(picker.minute_items, (0..60).map(|m| format!("{m:02}")))
            .set_count(picker.dismiss, 1);
    }

    if let Some(cover) = selectors.cover {
        mock.set_texts(cover.open_editor.selector, ["更换封面"])
            .set_count(cover.editor, 1)
            .set_count(cover.file_input, 1)
            .set_texts(cover.confirm.selector, ["取消", "确认"])
            .set_box(
                cover.editor,
                BoundingBox {
                    x: 0.0,
                    y: 100.0,
                    width: 300.0,
                    height: 600.0,
                },
            )
            .set_box(
                cover.crop_window,
                BoundingBox {
                    x: 0.0,
                    y: 400.0,
                    width: 300.0,
                    height: 200.0,
                },
            )
            .drag_moves(cover.crop_window);
    }
    mock
}
