//! The page-automation capability the upload workflow runs against.
//!
//! `ChromePageDriver` implements it over CDP; tests use scripted mocks.
//! Selectors are plain CSS strings owned by the platform tables.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Attached,
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }
}

/// Persisted browser authentication state: cookies plus per-origin
/// local storage. Same shape as Playwright's `storage_state` files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
    #[serde(default)]
    pub origins: Vec<OriginStorage>,
}

impl StorageState {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.iter().all(|o| o.local_storage.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "root_path")]
    pub path: String,
    /// Unix seconds; `-1` for session cookies.
    #[serde(default = "session_expiry")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn root_path() -> String {
    "/".to_string()
}

fn session_expiry() -> f64 {
    -1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginStorage {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<NameValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameValue {
    pub name: String,
    pub value: String,
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// `Ok(false)` when the element did not reach `state` within `timeout`.
    async fn wait_for(&self, selector: &str, state: ElementState, timeout: Duration)
        -> Result<bool>;

    async fn count(&self, selector: &str) -> Result<usize>;

    async fn click(&self, selector: &str) -> Result<()> {
        self.click_nth(selector, 0).await
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<()>;

    /// Focuses the element and types `text` as keyboard input.
    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    /// Replaces the value of an input field.
    async fn fill(&self, selector: &str, text: &str) -> Result<()>;

    async fn press(&self, key: &str) -> Result<()>;

    async fn set_input_files(&self, selector: &str, path: &Path) -> Result<()>;

    /// Inner text of every match, in document order.
    async fn texts(&self, selector: &str) -> Result<Vec<String>>;

    async fn attribute(&self, selector: &str, index: usize, name: &str) -> Result<Option<String>>;

    async fn bounding_box(&self, selector: &str) -> Result<Option<BoundingBox>>;

    /// Press at `from`, move to `to` in `steps` increments, release.
    async fn drag(&self, from: Point, to: Point, steps: u32) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// `Ok(false)` when the location did not start with `url` within `timeout`.
    async fn wait_for_url(&self, url: &str, timeout: Duration) -> Result<bool>;

    async fn screenshot(&self, path: &Path) -> Result<()>;

    async fn storage_state(&self) -> Result<StorageState>;

    async fn restore_storage_state(&self, state: &StorageState) -> Result<()>;
}
