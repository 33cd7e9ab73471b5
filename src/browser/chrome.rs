//! Finding and starting Chrome on a per-account profile directory.

use std::net::TcpListener;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::Deserialize;
use tokio::time::Instant;

const DEBUG_PORTS: RangeInclusive<u16> = 9300..=9800;
const READY_POLL: Duration = Duration::from_millis(500);
const SINGLETON_FILES: [&str; 3] = ["SingletonLock", "SingletonCookie", "SingletonSocket"];

const CHROME_FLAGS: &[&str] = &[
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-default-apps",
    "--deny-permission-prompts",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--lang=zh-CN",
    "--window-size=1280,800",
];

#[cfg(target_os = "macos")]
const INSTALL_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];
#[cfg(target_os = "macos")]
const BINARY_NAMES: &[&str] = &["google-chrome"];

#[cfg(target_os = "windows")]
const INSTALL_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];
#[cfg(target_os = "windows")]
const BINARY_NAMES: &[&str] = &["chrome"];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const INSTALL_PATHS: &[&str] = &[];
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const BINARY_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium-browser",
    "chromium",
];

#[derive(Debug, Deserialize)]
struct CdpTarget {
    #[serde(rename = "type")]
    target_type: String,
}

/// `CHROME_PATH` if set, else the usual install locations, else `PATH`.
pub fn detect_chrome() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os("CHROME_PATH").map(PathBuf::from) {
        if path.is_file() {
            return Ok(path);
        }
        bail!("CHROME_PATH {} is not a file", path.display());
    }
    INSTALL_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
        .or_else(|| BINARY_NAMES.iter().find_map(|name| which::which(name).ok()))
        .context("Could not find Chrome. Install Google Chrome or set CHROME_PATH.")
}

/// First free localhost port in the debugging range.
pub fn allocate_port() -> Result<u16> {
    DEBUG_PORTS
        .into_iter()
        .find(|port| TcpListener::bind(("127.0.0.1", *port)).is_ok())
        .with_context(|| {
            format!(
                "No free Chrome debugging port in {}-{}",
                DEBUG_PORTS.start(),
                DEBUG_PORTS.end()
            )
        })
}

/// Profile directory for one platform account, created on demand.
pub fn account_profile_dir(profiles_dir: &Path, platform: &str, account: &str) -> Result<PathBuf> {
    let profile_dir = profiles_dir.join(format!("{}-{}", platform, account));
    std::fs::create_dir_all(&profile_dir)
        .with_context(|| format!("Failed to create profile dir {}", profile_dir.display()))?;
    Ok(profile_dir)
}

/// Starts Chrome on `profile_dir` with remote debugging. Returns the process
/// and the port it was asked to listen on.
pub fn spawn_chrome(
    chrome_path: &Path,
    profile_dir: &Path,
    url: &str,
    headless: bool,
) -> Result<(Child, u16)> {
    if is_profile_busy(profile_dir) {
        bail!(
            "PROFILE_BUSY: {} is open in another Chrome window; close it and retry",
            profile_dir.display()
        );
    }
    let port = allocate_port()?;

    let mut command = Command::new(chrome_path);
    command
        .arg(format!("--user-data-dir={}", profile_dir.display()))
        .arg(format!("--remote-debugging-port={}", port))
        .args(CHROME_FLAGS)
        .arg(if headless { "--headless=new" } else { "--new-window" })
        .arg(url);
    let child = command.spawn().context("Failed to launch Chrome")?;

    info!(
        "[Chrome launch] pid={} port={} headless={} profile={}",
        child.id(),
        port,
        headless,
        profile_dir.display()
    );
    Ok((child, port))
}

/// Waits until a page target is debuggable. Chrome may pick another port
/// than requested when it reuses a profile; the one it records in
/// `DevToolsActivePort` is tried as well. Returns the port that answered.
pub async fn wait_for_chrome_ready(port: u16, profile_dir: &Path, timeout: Duration) -> Result<u16> {
    let deadline = Instant::now() + timeout;
    loop {
        let recorded = read_devtools_active_port(profile_dir).filter(|p| *p != port);
        for candidate in std::iter::once(port).chain(recorded) {
            match has_page_target(candidate).await {
                Ok(true) => {
                    info!("[Chrome launch] ready on port {}", candidate);
                    return Ok(candidate);
                }
                Ok(false) => debug!("[Chrome launch] port {} has no page yet", candidate),
                Err(e) => debug!("[Chrome launch] port {} not answering: {:#}", candidate, e),
            }
        }
        if Instant::now() >= deadline {
            bail!(
                "CHROME_NOT_READY: no debuggable page on port {} after {}s",
                port,
                timeout.as_secs()
            );
        }
        tokio::time::sleep(READY_POLL).await;
    }
}

fn read_devtools_active_port(profile_dir: &Path) -> Option<u16> {
    let body = std::fs::read_to_string(profile_dir.join("DevToolsActivePort")).ok()?;
    body.lines().next()?.trim().parse().ok()
}

async fn has_page_target(port: u16) -> Result<bool> {
    let resp = reqwest::get(format!("http://127.0.0.1:{}/json/list", port))
        .await
        .context("Failed to request Chrome json/list")?;
    if !resp.status().is_success() {
        return Ok(false);
    }
    let targets: Vec<CdpTarget> = resp.json().await.unwrap_or_default();
    Ok(targets.iter().any(|target| target.target_type == "page"))
}

/// Chrome leaves singleton files in a profile it has open. A `SingletonLock`
/// naming a dead process is stale and does not count.
pub fn is_profile_busy(profile_dir: &Path) -> bool {
    let present = SINGLETON_FILES
        .iter()
        .any(|name| profile_dir.join(name).symlink_metadata().is_ok());
    if !present {
        return false;
    }
    lock_owner_pid(profile_dir).map_or(true, is_pid_running)
}

/// `SingletonLock` is a symlink to `<hostname>-<pid>`.
fn lock_owner_pid(profile_dir: &Path) -> Option<u32> {
    let target = std::fs::read_link(profile_dir.join("SingletonLock")).ok()?;
    let name = target.file_name()?.to_string_lossy().into_owned();
    name.rsplit('-').next()?.parse().ok()
}

#[cfg(unix)]
pub(crate) fn is_pid_running(pid: u32) -> bool {
    Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "pid="])
        .output()
        .map(|out| out.status.success() && !String::from_utf8_lossy(&out.stdout).trim().is_empty())
        .unwrap_or(false)
}

/// No liveness check here; every owner counts as alive.
#[cfg(not(unix))]
pub(crate) fn is_pid_running(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn devtools_port_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_devtools_active_port(dir.path()), None);
        std::fs::write(dir.path().join("DevToolsActivePort"), "9555\n/devtools/browser/x\n").unwrap();
        assert_eq!(read_devtools_active_port(dir.path()), Some(9555));
    }

    #[test]
    fn fresh_profile_is_not_busy() {
        let dir = tempfile::tempdir().unwrap();
        let profile = account_profile_dir(dir.path(), "wechat", "alice").unwrap();
        assert!(profile.ends_with("wechat-alice"));
        assert!(profile.is_dir());
        assert!(!is_profile_busy(&profile));
    }

    #[cfg(unix)]
    #[test]
    fn stale_singleton_lock_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        // Far above any default pid_max.
        std::os::unix::fs::symlink("somehost-4194999", dir.path().join("SingletonLock")).unwrap();
        assert_eq!(lock_owner_pid(dir.path()), Some(4194999));
        assert!(!is_profile_busy(dir.path()));

        let live = dir.path().join("live");
        std::fs::create_dir(&live).unwrap();
        let me = format!("somehost-{}", std::process::id());
        std::os::unix::fs::symlink(me, live.join("SingletonLock")).unwrap();
        assert!(is_profile_busy(&live));
    }

    #[test]
    fn allocated_port_is_in_range() {
        let port = allocate_port().unwrap();
        assert!(DEBUG_PORTS.contains(&port));
    }
}
