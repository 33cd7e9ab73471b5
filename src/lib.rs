//! Scheduled short-video publishing through each platform's web upload page.
//!
//! A batch is planned once by [`schedule`], authenticated by [`session`] and
//! uploaded unit by unit through [`upload`], with [`browser::PageDriver`] as
//! the only I/O boundary to the platforms.

pub mod batch;
pub mod browser;
pub mod config;
pub mod database;
pub mod error;
pub mod metadata;
pub mod platforms;
pub mod schedule;
pub mod session;
pub mod units;
pub mod upload;

#[cfg(test)]
mod testing;

pub use error::{PublishError, PublishResult};

/// `RUST_LOG` wins when set; otherwise `info`, or `debug` when `verbose`.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();
}
