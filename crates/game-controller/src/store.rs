use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use twenty48_core::engine::Score;

/// Maximum rows a leaderboard query returns.
pub const LEADERBOARD_LIMIT: usize = 100;

const NOW_UTC: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// A submitted score row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreRecord {
    pub id: i64,
    pub user_id: String,
    pub score: Score,
    pub created_at: String,
}

/// Public profile shown next to leaderboard entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub email: Option<String>,
    pub updated_at: String,
}

/// Profile fields supplied by the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileUpdate {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// One leaderboard row: the score joined with its owner's profile, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub score_id: i64,
    pub user_id: String,
    pub score: Score,
    pub created_at: String,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

/// Append-only score table plus user profiles in a single SQLite file.
///
/// Schema:
/// - scores(id INTEGER PRIMARY KEY, user_id TEXT, score INT, created_at TEXT)
/// - users(id TEXT PRIMARY KEY, username TEXT, avatar_url TEXT, email TEXT, updated_at TEXT)
///
/// Timestamps are UTC ISO-8601 strings produced by SQLite, so a day prefix
/// (`YYYY-MM-DD`) selects a calendar day.
pub struct ScoreStore {
    path: Option<PathBuf>,
    conn: Connection,
}

impl ScoreStore {
    /// Create or open a store at `path`, ensure schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init(Some(path), conn)
    }

    /// Store backed by a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(None, Connection::open_in_memory()?)
    }

    fn init(path: Option<PathBuf>, conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scores (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                score INT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS scores_by_score ON scores (score DESC);
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                avatar_url TEXT,
                email TEXT,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .context("failed to create score store schema")?;
        Ok(Self { path, conn })
    }

    /// Append a score stamped with the current UTC time.
    pub fn save_score(&self, user_id: &str, score: Score) -> Result<ScoreRecord> {
        self.insert_score(user_id, score, None)
    }

    pub(crate) fn insert_score(
        &self,
        user_id: &str,
        score: Score,
        created_at: Option<&str>,
    ) -> Result<ScoreRecord> {
        let stored = i64::try_from(score)
            .with_context(|| format!("score {score} for {user_id} is out of range"))?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO scores (user_id, score, created_at) VALUES (?1, ?2, COALESCE(?3, {NOW_UTC}))"
                ),
                params![user_id, stored, created_at],
            )
            .with_context(|| format!("failed to save score for {user_id}"))?;
        let id = self.conn.last_insert_rowid();
        let record = self.conn.query_row(
            "SELECT id, user_id, score, created_at FROM scores WHERE id = ?1",
            params![id],
            |row| {
                Ok(ScoreRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    score: score_column(row, 2)?,
                    created_at: row.get(3)?,
                })
            },
        )?;
        Ok(record)
    }

    /// Insert or update a profile. The username falls back to the email,
    /// then to the id.
    pub fn upsert_user(&self, update: &ProfileUpdate) -> Result<UserProfile> {
        let username = update
            .username
            .clone()
            .or_else(|| update.email.clone())
            .unwrap_or_else(|| update.id.clone());
        self.conn
            .execute(
                &format!(
                    "INSERT INTO users (id, username, avatar_url, email, updated_at) VALUES (?1, ?2, ?3, ?4, {NOW_UTC})
                     ON CONFLICT(id) DO UPDATE SET username=excluded.username, avatar_url=excluded.avatar_url,
                     email=excluded.email, updated_at=excluded.updated_at"
                ),
                params![update.id, username, update.avatar_url, update.email],
            )
            .with_context(|| format!("failed to upsert user {}", update.id))?;
        self.get_user(&update.id)?
            .with_context(|| format!("user {} vanished after upsert", update.id))
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserProfile>> {
        let profile = self
            .conn
            .query_row(
                "SELECT id, username, avatar_url, email, updated_at FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(UserProfile {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        avatar_url: row.get(2)?,
                        email: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    /// Best score per user on `day` (`YYYY-MM-DD`, UTC), highest first.
    ///
    /// Only the day's top [`LEADERBOARD_LIMIT`] scores are considered before
    /// collapsing to one row per user.
    pub fn daily_scores(&self, day: &str) -> Result<Vec<LeaderboardEntry>> {
        let top = self.query_leaderboard(Some(day), LEADERBOARD_LIMIT)?;
        let mut seen = std::collections::HashSet::new();
        Ok(top
            .into_iter()
            .filter(|entry| seen.insert(entry.user_id.clone()))
            .collect())
    }

    /// [`ScoreStore::daily_scores`] for the current UTC day.
    pub fn daily_scores_today(&self) -> Result<Vec<LeaderboardEntry>> {
        let today = self.today()?;
        self.daily_scores(&today)
    }

    /// Highest scores of all time, at most `limit` rows.
    pub fn all_time_scores(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        self.query_leaderboard(None, limit.min(LEADERBOARD_LIMIT))
    }

    /// Current UTC date according to SQLite.
    pub fn today(&self) -> Result<String> {
        Ok(self.conn.query_row("SELECT date('now')", [], |row| row.get(0))?)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // `day` of None matches every row.
    fn query_leaderboard(&self, day: Option<&str>, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT s.id, s.user_id, s.score, s.created_at, u.username, u.avatar_url
             FROM scores s LEFT JOIN users u ON u.id = s.user_id
             WHERE ?1 IS NULL OR substr(s.created_at, 1, 10) = ?1
             ORDER BY s.score DESC, s.id ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![day, limit as i64], leaderboard_row)?;
        let entries = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

fn leaderboard_row(row: &Row<'_>) -> rusqlite::Result<LeaderboardEntry> {
    Ok(LeaderboardEntry {
        score_id: row.get(0)?,
        user_id: row.get(1)?,
        score: score_column(row, 2)?,
        created_at: row.get(3)?,
        username: row.get(4)?,
        avatar_url: row.get(5)?,
    })
}

// Scores are stored as INTEGER; a negative value is a corrupt row.
fn score_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Score> {
    let value: i64 = row.get(idx)?;
    Score::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
}
