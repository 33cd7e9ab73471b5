use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use clip_publisher_lib::batch::{BatchReport, BatchRunner};
use clip_publisher_lib::browser::{chrome, ChromePageDriver};
use clip_publisher_lib::config::{AppConfig, SourceLayout};
use clip_publisher_lib::database::{queries, Database};
use clip_publisher_lib::platforms::{self, PlatformProfile};
use clip_publisher_lib::schedule::{self, SchedulePolicy};
use clip_publisher_lib::session::{AccountKey, LoginPrompt, SessionStore};
use clip_publisher_lib::units::{self, VideoUnit};
use clip_publisher_lib::upload::UploadOptions;
use clip_publisher_lib::{init_logging, metadata};

#[derive(Parser)]
#[command(
    name = "clip-publisher",
    version,
    about = "Publish and schedule short videos through each platform's web upload page"
)]
struct Cli {
    /// Working directory with videos/, published/, cookies/ and config.json
    /// (default: ~/.multi-publisher)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    /// kuaishou, wechat (alias: tencent), douyin or tiktok
    platform: String,
    /// Account name; each account keeps its own session and browser profile
    account: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in through a visible browser and save the session
    Login,
    /// Upload one video
    Upload {
        /// Path to the .mp4; title and tags come from the same-name .txt
        video: PathBuf,
        /// 0 uses the platform default, 1 schedules at --time
        #[arg(short = 'p', long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
        publish_type: u8,
        /// Publish time, "YYYY-MM-DD HH:MM"
        #[arg(short = 't', long, required_if_eq("publish_type", "1"))]
        time: Option<String>,
        /// Publish right away instead of the platform default
        #[arg(long, conflicts_with = "time")]
        now: bool,
        /// Cover image (default: same-name image next to the video)
        #[arg(long)]
        cover: Option<PathBuf>,
        #[arg(long)]
        headless: bool,
    },
    /// Upload every pending video on the configured schedule
    Batch {
        #[arg(long, value_enum, default_value_t = Layout::Flat)]
        layout: Layout,
        /// Start without asking for confirmation
        #[arg(short, long)]
        yes: bool,
        #[arg(long)]
        headless: bool,
    },
    /// Recent publish results for this account
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Layout {
    /// *.mp4 files directly under videos/
    Flat,
    /// YYMMDD-prefixed folders, one video each
    Folders,
}

impl From<Layout> for SourceLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::Flat => SourceLayout::Flat,
            Layout::Folders => SourceLayout::DatedFolders,
        }
    }
}

/// Waits for the user to press Enter in the terminal.
struct TerminalPrompt;

#[async_trait]
impl LoginPrompt for TerminalPrompt {
    async fn wait_for_login(&self, key: &AccountKey, login_url: &str) -> Result<()> {
        println!(
            "Log in to {} as {} in the browser window ({}), then press Enter here.",
            key.platform, key.account, login_url
        );
        read_line().await?;
        Ok(())
    }
}

async fn read_line() -> Result<String> {
    tokio::task::spawn_blocking(|| -> Result<String> {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line)
    })
    .await
    .context("stdin reader panicked")?
}

/// Everything a command needs for one platform account.
struct Account {
    config: AppConfig,
    profile: PlatformProfile,
    key: AccountKey,
    sessions: SessionStore,
    db: Database,
}

impl Account {
    fn open(cli: &Cli) -> Result<Self> {
        let base_dir = match &cli.base_dir {
            Some(dir) => dir.clone(),
            None => AppConfig::default_base_dir()?,
        };
        let config = AppConfig::load(base_dir)?;
        let profile = platforms::get_profile(&cli.platform).with_context(|| {
            let known: Vec<String> = platforms::all_platforms()
                .iter()
                .map(|info| format!("{} ({})", info.id, info.name_en))
                .collect();
            format!(
                "Unknown platform '{}'; expected one of {}",
                cli.platform,
                known.join(", ")
            )
        })?;
        let key = AccountKey::new(profile.id(), cli.account.clone());
        let sessions = SessionStore::new(&config.cookies_dir, &config.tuning);
        let db = Database::open(&config.database_file)?;
        Ok(Self {
            config,
            profile,
            key,
            sessions,
            db,
        })
    }

    async fn launch_browser(&self, headless: bool) -> Result<ChromePageDriver> {
        let profile_dir =
            chrome::account_profile_dir(&self.config.profiles_dir, &self.key.platform, &self.key.account)?;
        ChromePageDriver::launch(&profile_dir, "about:blank", headless).await
    }

    fn track_login(&self, logged_in: bool) {
        let token_path = self.sessions.token_path(&self.key);
        let result = self.db.conn().and_then(|conn| {
            queries::upsert_account(
                &conn,
                &self.key.platform,
                &self.key.account,
                &token_path.to_string_lossy(),
            )?;
            queries::update_login_status(&conn, &self.key.platform, &self.key.account, logged_in)
        });
        if let Err(e) = result {
            warn!("Could not update account {}: {:#}", self.key, e);
        }
    }

    fn upload_options(&self, publish_immediately: bool) -> UploadOptions {
        UploadOptions {
            original_declaration: self.config.publish.original_declaration,
            cover_position: self.config.publish.cover_position,
            publish_immediately,
        }
    }

    /// Authenticates, then runs `units` through a batch. Interactive login is
    /// only offered with a visible browser.
    async fn publish(
        &self,
        units: Vec<VideoUnit>,
        policy: &SchedulePolicy,
        options: UploadOptions,
        headless: bool,
        relocate: bool,
    ) -> Result<BatchReport> {
        let _lock = self.sessions.lock(&self.key)?;
        let driver = self.launch_browser(headless).await?;
        let cancel = cancel_on_ctrl_c();

        let result = async {
            let prompt = if headless {
                None
            } else {
                Some(&TerminalPrompt as &dyn LoginPrompt)
            };
            let ensured = self
                .sessions
                .ensure(&self.key, &driver, &self.profile, prompt)
                .await;
            self.track_login(ensured.is_ok());
            ensured?;

            let mut runner = BatchRunner::new(
                &driver,
                &self.profile,
                &self.sessions,
                self.key.clone(),
                self.config.tuning.clone(),
            )
            .options(options)
            .cancel_token(cancel)
            .screenshot_dir(self.config.base_dir.join("screenshots"))
            .ledger(&self.db);
            if relocate {
                runner = runner.published_dir(&self.config.published_dir);
            }
            Ok::<_, anyhow::Error>(runner.run(units, policy).await?)
        }
        .await;

        driver.shutdown();
        result
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping after the current step");
            token.cancel();
        }
    });
    cancel
}

fn print_report(report: &BatchReport) {
    for unit in &report.units {
        let at = unit
            .scheduled_at
            .map(|at| at.format(schedule::LITERAL_FORMAT).to_string())
            .unwrap_or_else(|| "-".into());
        match &unit.error {
            Some(err) => println!("{:<16} {:<32} {}: {}", at, unit.name, unit.outcome.as_str(), err),
            None => println!("{:<16} {:<32} {}", at, unit.name, unit.outcome.as_str()),
        }
    }
    println!(
        "{} succeeded, {} failed{}",
        report.succeeded(),
        report.failed(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
}

fn finish(report: &BatchReport) -> Result<()> {
    print_report(report);
    if report.failed() > 0 {
        bail!("{} video(s) failed; they were left in place", report.failed());
    }
    Ok(())
}

async fn login(account: &Account) -> Result<()> {
    let _lock = account.sessions.lock(&account.key)?;
    let driver = account.launch_browser(false).await?;
    let result = account
        .sessions
        .login(&account.key, &driver, &account.profile, &TerminalPrompt)
        .await;
    driver.shutdown();

    let session = result?;
    account.track_login(true);
    info!(
        "Saved {} session ({} cookies) to {}",
        account.key,
        session.token.cookies.len(),
        account.sessions.token_path(&account.key).display()
    );
    Ok(())
}

async fn upload_one(
    account: &Account,
    video: PathBuf,
    publish_type: u8,
    time: Option<String>,
    now: bool,
    cover: Option<PathBuf>,
    headless: bool,
) -> Result<()> {
    if !video.is_file() {
        error!("Video file not found: {}", video.display());
        return Ok(());
    }
    let sidecar = metadata::sidecar_path(&video);
    if !sidecar.is_file() {
        warn!(
            "No metadata file {}; using the file name as title",
            sidecar.display()
        );
    }

    // clap guarantees --time whenever -p 1 is given.
    let policy = match time.filter(|_| publish_type == 1) {
        Some(raw) => SchedulePolicy::Literal {
            datetimes: vec![schedule::parse_literal(&raw)?],
            strict: true,
        },
        None => SchedulePolicy::Unscheduled,
    };
    let unit = VideoUnit::from_video(&video, cover)?;
    let headless = headless || account.config.publish.headless;
    let options = account.upload_options(now);

    let report = account
        .publish(vec![unit], &policy, options, headless, false)
        .await?;
    finish(&report)
}

async fn batch(account: &Account, layout: Layout, yes: bool, headless: bool) -> Result<()> {
    let config = &account.config;
    let mut pending = match layout {
        Layout::Flat => units::scan_flat(&config.videos_dir)?,
        Layout::Folders => {
            units::scan_dated_folders(&config.videos_dir, config.publish.folder_cutoff()?)?
        }
    };
    if pending.is_empty() {
        info!("Nothing to publish in {}", config.videos_dir.display());
        return Ok(());
    }

    let policy = config
        .publish
        .schedule_policy(layout.into(), Local::now().date_naive())?;
    BatchRunner::plan(&mut pending, &policy)?;
    println!("{} video(s) for {}:", pending.len(), account.key);
    for unit in &pending {
        let at = unit
            .scheduled_at
            .map(|at| at.format(schedule::LITERAL_FORMAT).to_string())
            .unwrap_or_else(|| "platform default".into());
        println!("  {:<16} {}", at, unit.name());
    }
    if !yes {
        print!("Start publishing? [y/N] ");
        std::io::Write::flush(&mut std::io::stdout())?;
        let answer = read_line().await?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            info!("Cancelled");
            return Ok(());
        }
    }

    let headless = headless || config.publish.headless;
    let options = account.upload_options(false);
    let report = account
        .publish(pending, &policy, options, headless, true)
        .await?;
    finish(&report)
}

fn history(account: &Account, limit: usize) -> Result<()> {
    let conn = account.db.conn()?;
    match queries::get_account(&conn, &account.key.platform, &account.key.account)? {
        Some(stored) => println!(
            "{} ({}): {}, last checked {}",
            account.key,
            account.profile.info.name_en,
            if stored.is_logged_in { "logged in" } else { "not logged in" },
            stored.last_checked_at.as_deref().unwrap_or("never")
        ),
        None => println!("{}: never logged in", account.key),
    }
    let records = queries::recent_records(
        &conn,
        Some(&account.key.platform),
        Some(&account.key.account),
        limit,
    )?;
    if records.is_empty() {
        println!("No publish records for {}", account.key);
    }
    for record in records {
        println!(
            "{}  {:<16} {:<32} {:<16} attempts={}{}",
            record.finished_at,
            record.scheduled_at.as_deref().unwrap_or("-"),
            record.unit_name,
            record.outcome,
            record.attempts,
            record
                .error_message
                .map(|e| format!("  {}", e))
                .unwrap_or_default()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let account = Account::open(&cli)?;
    match cli.command {
        Commands::Login => login(&account).await,
        Commands::Upload {
            video,
            publish_type,
            time,
            now,
            cover,
            headless,
        } => upload_one(&account, video, publish_type, time, now, cover, headless).await,
        Commands::Batch {
            layout,
            yes,
            headless,
        } => batch(&account, layout, yes, headless).await,
        Commands::History { limit } => history(&account, limit),
    }
}
