use std::path::Path;
use std::process::Child;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::dom::{
    GetDocumentParams, QuerySelectorParams, SetFileInputFilesParams,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use super::chrome;
use super::driver::{BoundingBox, ElementState, PageDriver, Point, StorageState, StoredCookie};

const ELEMENT_POLL_MS: u64 = 200;
const CHROME_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// `PageDriver` over a Chrome instance reached through the DevTools protocol.
pub struct ChromePageDriver {
    _browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    child: Mutex<Option<Child>>,
}

impl ChromePageDriver {
    /// Launch Chrome on `profile_dir` and attach to its first page.
    pub async fn launch(profile_dir: &Path, start_url: &str, headless: bool) -> Result<Self> {
        let chrome_path = chrome::detect_chrome()?;
        let (child, port) =
            chrome::spawn_chrome(&chrome_path, profile_dir, start_url, headless)?;
        let port = match chrome::wait_for_chrome_ready(port, profile_dir, CHROME_READY_TIMEOUT).await {
            Ok(port) => port,
            Err(e) => {
                kill_child(child);
                return Err(e);
            }
        };
        let (browser, page, handler) = connect_to_chrome(port).await?;
        Ok(Self {
            _browser: browser,
            page,
            handler,
            child: Mutex::new(Some(child)),
        })
    }

    /// Terminate the Chrome process started by `launch`.
    pub fn shutdown(&self) {
        self.handler.abort();
        if let Ok(mut guard) = self.child.lock() {
            if let Some(child) = guard.take() {
                kill_child(child);
            }
        }
    }

    async fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("Failed to execute JavaScript")?;
        result
            .into_value::<T>()
            .context("Unexpected JavaScript result")
    }

    async fn eval_on_nth<T: DeserializeOwned>(
        &self,
        selector: &str,
        index: usize,
        body: &str,
    ) -> Result<T> {
        let js = format!(
            r#"
            (function() {{
                const el = document.querySelectorAll({sel})[{index}];
                if (!el) return {{ found: false }};
                return {{ found: true, value: (function(el) {{ {body} }})(el) }};
            }})()
            "#,
            sel = js_string(selector),
            index = index,
            body = body
        );
        let reply: NthReply<T> = self.eval(&js).await?;
        match reply {
            NthReply {
                found: true,
                value: Some(value),
            } => Ok(value),
            NthReply { found: true, .. } => bail!("No value returned for '{}'", selector),
            _ => bail!("No element #{} for selector '{}'", index, selector),
        }
    }

    async fn mouse_event(&self, kind: DispatchMouseEventType, at: Point) -> Result<()> {
        let mut params = DispatchMouseEventParams::new(kind, at.x, at.y);
        params.button = Some(MouseButton::Left);
        params.click_count = Some(1);
        self.page
            .execute(params)
            .await
            .context("Failed to dispatch mouse event")?;
        Ok(())
    }
}

impl Drop for ChromePageDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(serde::Deserialize)]
struct NthReply<T> {
    found: bool,
    value: Option<T>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalStorageSnapshot {
    origin: String,
    local_storage: Vec<super::driver::NameValue>,
}

#[async_trait]
impl PageDriver for ChromePageDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to open {}", url))?;
        Ok(())
    }

    async fn wait_for(
        &self,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> Result<bool> {
        let check = match state {
            ElementState::Attached => "return els.length > 0;",
            ElementState::Visible => {
                "return els.some(el => { const r = el.getBoundingClientRect(); \
                 return r.width > 0 && r.height > 0 && getComputedStyle(el).visibility !== 'hidden'; });"
            }
            ElementState::Hidden => {
                "return !els.some(el => { const r = el.getBoundingClientRect(); \
                 return r.width > 0 && r.height > 0; });"
            }
        };
        let js = format!(
            r#"
            (function() {{
                try {{
                    const els = Array.from(document.querySelectorAll({sel}));
                    {check}
                }} catch (_) {{
                    return false;
                }}
            }})()
            "#,
            sel = js_string(selector),
            check = check
        );

        let start = Instant::now();
        loop {
            // Navigation in progress makes evaluate fail; treat as "not yet".
            if self.eval::<bool>(&js).await.unwrap_or(false) {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(ELEMENT_POLL_MS)).await;
        }
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let js = format!(
            "(function() {{ try {{ return document.querySelectorAll({}).length; }} catch (_) {{ return 0; }} }})()",
            js_string(selector)
        );
        self.eval(&js).await
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<()> {
        let _: bool = self
            .eval_on_nth(
                selector,
                index,
                "el.scrollIntoView({ block: 'center' }); el.click(); return true;",
            )
            .await?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let _: bool = self
            .eval_on_nth(
                selector,
                0,
                "el.scrollIntoView({ block: 'center' }); el.click(); el.focus(); return true;",
            )
            .await?;
        self.page
            .execute(InsertTextParams::new(text))
            .await
            .context("Failed to type text")?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let body = format!(
            r#"
            el.focus();
            const setter = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value');
            if (setter && setter.set) {{ setter.set.call(el, {text}); }} else {{ el.value = {text}; }}
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;
            "#,
            text = js_string(text)
        );
        let _: bool = self.eval_on_nth(selector, 0, &body).await?;
        Ok(())
    }

    async fn press(&self, key: &str) -> Result<()> {
        let focused = self
            .page
            .find_element(":focus")
            .await
            .context("No focused element to receive key press")?;
        focused
            .press_key(key)
            .await
            .with_context(|| format!("Failed to press {}", key))?;
        Ok(())
    }

    async fn set_input_files(&self, selector: &str, path: &Path) -> Result<()> {
        let file_path = path.to_string_lossy().to_string();

        // Get the DOM document root
        let doc = self
            .page
            .execute(GetDocumentParams::builder().depth(0).build())
            .await
            .context("Failed to get document")?;
        let root_node_id = doc.result.root.node_id;

        let query = QuerySelectorParams::new(root_node_id, selector);
        let query_result = self
            .page
            .execute(query)
            .await
            .with_context(|| format!("Failed to query file input '{}'", selector))?;

        let mut set_files = SetFileInputFilesParams::new(vec![file_path.clone()]);
        set_files.node_id = Some(query_result.result.node_id);
        self.page
            .execute(set_files)
            .await
            .context("Failed to set file via CDP")?;

        let _: bool = self
            .eval_on_nth(
                selector,
                0,
                "el.dispatchEvent(new Event('change', { bubbles: true })); return true;",
            )
            .await
            .unwrap_or(false);
        info!("File set: {}", file_path);
        Ok(())
    }

    async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        let js = format!(
            "(function() {{ try {{ return Array.from(document.querySelectorAll({})).map(el => el.innerText || el.textContent || ''); }} catch (_) {{ return []; }} }})()",
            js_string(selector)
        );
        self.eval(&js).await
    }

    async fn attribute(&self, selector: &str, index: usize, name: &str) -> Result<Option<String>> {
        let js = format!(
            r#"
            (function() {{
                const el = document.querySelectorAll({sel})[{index}];
                if (!el) return {{ found: false }};
                return {{ found: true, value: el.getAttribute({name}) }};
            }})()
            "#,
            sel = js_string(selector),
            index = index,
            name = js_string(name)
        );
        let reply: NthReply<String> = self.eval(&js).await?;
        if !reply.found {
            bail!("No element #{} for selector '{}'", index, selector);
        }
        Ok(reply.value)
    }

    async fn bounding_box(&self, selector: &str) -> Result<Option<BoundingBox>> {
        let js = format!(
            r#"
            (function() {{
                const el = document.querySelector({sel});
                if (!el) return null;
                const r = el.getBoundingClientRect();
                return {{ x: r.x, y: r.y, width: r.width, height: r.height }};
            }})()
            "#,
            sel = js_string(selector)
        );
        self.eval(&js).await
    }

    async fn drag(&self, from: Point, to: Point, steps: u32) -> Result<()> {
        self.mouse_event(DispatchMouseEventType::MouseMoved, from).await?;
        self.mouse_event(DispatchMouseEventType::MousePressed, from).await?;
        let steps = steps.max(1);
        for i in 1..=steps {
            let t = f64::from(i) / f64::from(steps);
            let at = Point {
                x: from.x + (to.x - from.x) * t,
                y: from.y + (to.y - from.y) * t,
            };
            self.mouse_event(DispatchMouseEventType::MouseMoved, at).await?;
        }
        self.mouse_event(DispatchMouseEventType::MouseReleased, to).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let url = self.page.url().await.context("Failed to read page URL")?;
        Ok(url.unwrap_or_default())
    }

    async fn wait_for_url(&self, url: &str, timeout: Duration) -> Result<bool> {
        let start = Instant::now();
        loop {
            if self.current_url().await.unwrap_or_default().starts_with(url) {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(ELEMENT_POLL_MS)).await;
        }
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let png = self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .context("Failed to capture screenshot")?;
        tokio::fs::write(path, png)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Screenshot saved: {}", path.display());
        Ok(())
    }

    async fn storage_state(&self) -> Result<StorageState> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .context("Failed to read cookies")?
            .into_iter()
            .filter_map(|cookie| {
                serde_json::to_value(cookie)
                    .and_then(serde_json::from_value::<StoredCookie>)
                    .map_err(|e| warn!("Skipping unreadable cookie: {}", e))
                    .ok()
            })
            .collect();

        let snapshot: LocalStorageSnapshot = self
            .eval(
                r#"
                (function() {
                    const items = [];
                    try {
                        for (let i = 0; i < localStorage.length; i++) {
                            const name = localStorage.key(i);
                            items.push({ name, value: localStorage.getItem(name) || '' });
                        }
                    } catch (_) {}
                    return { origin: window.location.origin, localStorage: items };
                })()
                "#,
            )
            .await?;

        let origins = if snapshot.local_storage.is_empty() {
            Vec::new()
        } else {
            vec![super::driver::OriginStorage {
                origin: snapshot.origin,
                local_storage: snapshot.local_storage,
            }]
        };
        Ok(StorageState { cookies, origins })
    }

    async fn restore_storage_state(&self, state: &StorageState) -> Result<()> {
        let params: Vec<CookieParam> = state
            .cookies
            .iter()
            .filter_map(|cookie| {
                let mut value = serde_json::to_value(cookie).ok()?;
                if cookie.expires < 0.0 {
                    if let Some(map) = value.as_object_mut() {
                        map.remove("expires");
                    }
                }
                serde_json::from_value::<CookieParam>(value)
                    .map_err(|e| warn!("Skipping cookie {}: {}", cookie.name, e))
                    .ok()
            })
            .collect();
        if !params.is_empty() {
            self.page
                .set_cookies(params)
                .await
                .context("Failed to restore cookies")?;
        }

        for origin in &state.origins {
            self.navigate(&origin.origin).await?;
            let items = serde_json::to_string(&origin.local_storage)?;
            let js = format!(
                "(function() {{ for (const item of {}) {{ localStorage.setItem(item.name, item.value); }} return true; }})()",
                items
            );
            let _: bool = self.eval(&js).await?;
        }
        Ok(())
    }
}

/// Connect to an already-running Chrome instance via CDP
pub async fn connect_to_chrome(port: u16) -> Result<(Browser, Page, JoinHandle<()>)> {
    let debug_url = format!("http://127.0.0.1:{}", port);

    let (browser, mut handler) = Browser::connect(&debug_url)
        .await
        .context(format!("Failed to connect to Chrome on port {}", port))?;

    // Spawn the handler to process CDP events
    let handler_task = tokio::spawn(async move {
        while let Some(_event) = handler.next().await {}
    });

    // Get the first page
    let pages = browser.pages().await.context("Failed to get pages")?;
    let page = match pages.into_iter().next() {
        Some(page) => page,
        None => browser
            .new_page("about:blank")
            .await
            .context("No pages found in Chrome")?,
    };

    info!("Connected to Chrome CDP on port {}", port);
    Ok((browser, page, handler_task))
}

fn kill_child(mut child: Child) {
    if let Err(e) = child.kill() {
        debug!("Chrome process {} already gone: {}", child.id(), e);
    }
    let _ = child.wait();
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
