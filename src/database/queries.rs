use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub platform: String,
    pub account: String,
    pub token_path: String,
    pub is_logged_in: bool,
    pub last_checked_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct PublishRecord {
    pub id: i64,
    pub unit_name: String,
    pub video_path: String,
    pub platform: String,
    pub account: String,
    pub scheduled_at: Option<String>,
    pub outcome: String,
    pub attempts: u32,
    pub error_message: Option<String>,
    pub finished_at: String,
}

/// Fields of a record about to be written.
#[derive(Debug, Clone)]
pub struct NewPublishRecord<'a> {
    pub unit_name: &'a str,
    pub video_path: &'a str,
    pub platform: &'a str,
    pub account: &'a str,
    pub scheduled_at: Option<String>,
    pub outcome: &'a str,
    pub attempts: u32,
    pub error_message: Option<&'a str>,
}

// ========== Account Queries ==========

pub fn upsert_account(conn: &Connection, platform: &str, account: &str, token_path: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO accounts (platform, account, token_path) VALUES (?1, ?2, ?3)
         ON CONFLICT (platform, account) DO UPDATE SET token_path = excluded.token_path",
        params![platform, account, token_path],
    )?;
    let id = conn.query_row(
        "SELECT id FROM accounts WHERE platform = ?1 AND account = ?2",
        params![platform, account],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn get_account(conn: &Connection, platform: &str, account: &str) -> Result<Option<Account>> {
    let account = conn
        .query_row(
            "SELECT id, platform, account, token_path, is_logged_in, last_checked_at, created_at FROM accounts WHERE platform = ?1 AND account = ?2",
            params![platform, account],
            |row| {
                Ok(Account {
                    id: row.get(0)?,
                    platform: row.get(1)?,
                    account: row.get(2)?,
                    token_path: row.get(3)?,
                    is_logged_in: row.get(4)?,
                    last_checked_at: row.get(5)?,
                    created_at: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(account)
}

pub fn update_login_status(conn: &Connection, platform: &str, account: &str, is_logged_in: bool) -> Result<()> {
    conn.execute(
        "UPDATE accounts SET is_logged_in = ?1, last_checked_at = datetime('now') WHERE platform = ?2 AND account = ?3",
        params![is_logged_in, platform, account],
    )?;
    Ok(())
}

// ========== Publish Record Queries ==========

pub fn insert_publish_record(conn: &Connection, record: &NewPublishRecord<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO publish_records (unit_name, video_path, platform, account, scheduled_at, outcome, attempts, error_message) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.unit_name,
            record.video_path,
            record.platform,
            record.account,
            record.scheduled_at,
            record.outcome,
            record.attempts,
            record.error_message
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Newest first, optionally narrowed to one platform/account.
pub fn recent_records(
    conn: &Connection,
    platform: Option<&str>,
    account: Option<&str>,
    limit: usize,
) -> Result<Vec<PublishRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, unit_name, video_path, platform, account, scheduled_at, outcome, attempts, error_message, finished_at
         FROM publish_records
         WHERE (?1 IS NULL OR platform = ?1) AND (?2 IS NULL OR account = ?2)
         ORDER BY id DESC LIMIT ?3"
    )?;
    let records = stmt
        .query_map(params![platform, account, limit as i64], |row| {
            Ok(PublishRecord {
                id: row.get(0)?,
                unit_name: row.get(1)?,
                video_path: row.get(2)?,
                platform: row.get(3)?,
                account: row.get(4)?,
                scheduled_at: row.get(5)?,
                outcome: row.get(6)?,
                attempts: row.get(7)?,
                error_message: row.get(8)?,
                finished_at: row.get(9)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}
