//! Resolving platform `Target`s against a live page.

use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;

use super::driver::{ElementState, PageDriver};
use crate::platforms::Target;

const TEXT_POLL: Duration = Duration::from_millis(250);

/// Index among `target.selector` matches of the element `target` names.
pub async fn locate(driver: &dyn PageDriver, target: &Target) -> Result<Option<usize>> {
    if target.text.is_none() {
        let count = driver.count(target.selector).await?;
        return Ok((target.nth < count).then_some(target.nth));
    }
    let texts = driver.texts(target.selector).await?;
    Ok(texts
        .iter()
        .enumerate()
        .filter(|(_, text)| target.matches_text(text))
        .map(|(index, _)| index)
        .nth(target.nth))
}

/// Clicks the target if present. `Ok(false)` when nothing matched.
pub async fn click_target(driver: &dyn PageDriver, target: &Target) -> Result<bool> {
    match locate(driver, target).await? {
        Some(index) => {
            driver.click_nth(target.selector, index).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Clicks the last element matching `target`, ignoring `nth`.
pub async fn click_last(driver: &dyn PageDriver, target: &Target) -> Result<bool> {
    let texts = driver.texts(target.selector).await?;
    let last = texts.iter().rposition(|text| target.matches_text(text));
    match last {
        Some(index) => {
            driver.click_nth(target.selector, index).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

pub async fn wait_for_target(
    driver: &dyn PageDriver,
    target: &Target,
    timeout: Duration,
) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    if !driver
        .wait_for(target.selector, ElementState::Attached, timeout)
        .await?
    {
        return Ok(false);
    }
    loop {
        if locate(driver, target).await?.is_some() {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(TEXT_POLL).await;
    }
}
