//! Persisted login sessions, one token file per (platform, account).

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};

use crate::browser::{chrome, wait_for_target, PageDriver, StorageState};
use crate::config::Tuning;
use crate::error::{PublishError, PublishResult};
use crate::platforms::PlatformProfile;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountKey {
    pub platform: String,
    pub account: String,
}

impl AccountKey {
    pub fn new(platform: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            account: account.into(),
        }
    }

    fn file_stem(&self) -> String {
        format!("{}_{}", self.platform, self.account)
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform, self.account)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub key: AccountKey,
    pub token: StorageState,
}

/// The human half of an interactive login.
#[async_trait]
pub trait LoginPrompt: Send + Sync {
    /// Resolves once the user reports the login at `login_url` is complete.
    async fn wait_for_login(&self, key: &AccountKey, login_url: &str) -> anyhow::Result<()>;
}

/// Exclusive claim on an account's token and files, held for the length of
/// a run. The lock file holds the owner's pid and is removed on drop; a lock
/// left behind by a process that no longer runs is taken over.
#[derive(Debug)]
pub struct AccountLock {
    path: PathBuf,
}

impl AccountLock {
    pub fn acquire(path: PathBuf, key: &AccountKey) -> PublishResult<Self> {
        match Self::create(&path) {
            Ok(()) => return Ok(Self { path }),
            Err(e) if e.kind() != ErrorKind::AlreadyExists => return Err(e.into()),
            Err(_) => {}
        }
        match Self::owner(&path) {
            Some(pid) if !chrome::is_pid_running(pid) => {
                warn!("[session] taking over stale lock {} (pid {} is gone)", path.display(), pid);
                fs::remove_file(&path)?;
            }
            _ => return Err(PublishError::AccountBusy(key.to_string())),
        }
        match Self::create(&path) {
            Ok(()) => Ok(Self { path }),
            // Another run took it over first.
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(PublishError::AccountBusy(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create(path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(file, "{}", std::process::id())
    }

    fn owner(path: &Path) -> Option<u32> {
        fs::read_to_string(path).ok()?.trim().parse().ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AccountLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("[session] could not remove lock {}: {}", self.path.display(), e);
        }
    }
}

pub struct SessionStore {
    cookies_dir: PathBuf,
    probe_wait: Duration,
    login_timeout: Option<Duration>,
}

impl SessionStore {
    pub fn new(cookies_dir: impl Into<PathBuf>, tuning: &Tuning) -> Self {
        Self {
            cookies_dir: cookies_dir.into(),
            probe_wait: tuning.login_probe_wait,
            login_timeout: tuning.login_timeout,
        }
    }

    pub fn token_path(&self, key: &AccountKey) -> PathBuf {
        self.cookies_dir.join(format!("{}.json", key.file_stem()))
    }

    pub fn lock(&self, key: &AccountKey) -> PublishResult<AccountLock> {
        fs::create_dir_all(&self.cookies_dir)?;
        AccountLock::acquire(
            self.cookies_dir.join(format!("{}.lock", key.file_stem())),
            key,
        )
    }

    /// Stored session, if any. A corrupt token file counts as absent.
    pub fn load(&self, key: &AccountKey) -> PublishResult<Option<Session>> {
        let path = self.token_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(token) => Ok(Some(Session {
                key: key.clone(),
                token,
            })),
            Err(e) => {
                warn!("[session] ignoring unreadable token {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, session: &Session) -> PublishResult<PathBuf> {
        fs::create_dir_all(&self.cookies_dir)?;
        let path = self.token_path(&session.key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&session.token)?)?;
        fs::rename(&tmp, &path)?;
        info!("[session] saved {} to {}", session.key, path.display());
        Ok(path)
    }

    /// Loads `token` into the browser and opens an authenticated page.
    /// `false` when the platform shows its logged-out marker or bounces to
    /// the login page.
    pub async fn probe(
        &self,
        driver: &dyn PageDriver,
        profile: &PlatformProfile,
        token: &StorageState,
    ) -> PublishResult<bool> {
        let login = profile.selectors.login;
        driver.restore_storage_state(token).await?;
        driver.navigate(login.url).await?;

        if let Some(redirect) = login.login_redirect {
            if driver.current_url().await?.starts_with(redirect) {
                return Ok(false);
            }
        }
        let logged_out = wait_for_target(driver, &login.logged_out_marker, self.probe_wait).await?;
        Ok(!logged_out)
    }

    /// A session that probes valid. Falls back to interactive login when a
    /// prompt is given, otherwise fails with `AuthUnavailable`.
    pub async fn ensure(
        &self,
        key: &AccountKey,
        driver: &dyn PageDriver,
        profile: &PlatformProfile,
        prompt: Option<&dyn LoginPrompt>,
    ) -> PublishResult<Session> {
        match self.load(key)? {
            Some(session) => {
                if self.probe(driver, profile, &session.token).await? {
                    info!("[session] {} is logged in", key);
                    return Ok(session);
                }
                warn!("[session] stored session for {} has expired", key);
            }
            None => info!("[session] no stored session for {}", key),
        }

        match prompt {
            Some(prompt) => self.login(key, driver, profile, prompt).await,
            None => Err(PublishError::AuthUnavailable {
                platform: key.platform.clone(),
                account: key.account.clone(),
            }),
        }
    }

    /// Opens the login page and waits for the user, then persists the
    /// browser's storage state.
    pub async fn login(
        &self,
        key: &AccountKey,
        driver: &dyn PageDriver,
        profile: &PlatformProfile,
        prompt: &dyn LoginPrompt,
    ) -> PublishResult<Session> {
        let login_url = &profile.info.login_url;
        info!("[session] opening {} login for {}", profile.info.name, key);
        driver.navigate(login_url).await?;

        let wait = prompt.wait_for_login(key, login_url);
        match self.login_timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| PublishError::Deadline("interactive login"))??,
            None => wait.await?,
        }

        let token = driver.storage_state().await?;
        if token.is_empty() {
            warn!("[session] login for {} produced an empty storage state", key);
        }
        let session = Session {
            key: key.clone(),
            token,
        };
        self.save(&session)?;
        Ok(session)
    }

    /// Re-persists the browser's current (possibly rotated) token.
    pub async fn refresh(&self, key: &AccountKey, driver: &dyn PageDriver) -> PublishResult<()> {
        let token = driver.storage_state().await?;
        self.save(&Session {
            key: key.clone(),
            token,
        })?;
        Ok(())
    }
}
