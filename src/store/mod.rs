use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

/// Prompts are truncated before logging; full text never needs to be stored.
const MAX_LOGGED_PROMPT_CHARS: usize = 1000;
const MAX_LOGGED_RESPONSE_CHARS: usize = 2000;
const MAX_LOGGED_CONTENT_CHARS: usize = 500;

/// One user row. Timestamps are RFC 3339 strings as stored.
#[derive(Debug, Clone)]
pub struct User {
    pub phone: String,
    pub name: Option<String>,
    pub is_admin: bool,
    pub is_banned: bool,
    pub created_at: String,
    pub last_seen: String,
}

#[derive(Debug, Clone)]
pub struct MessageLogEntry<'a> {
    pub message_id: &'a str,
    pub phone: &'a str,
    pub group_id: Option<&'a str>,
    pub kind: &'a str,
    pub command: Option<&'a str>,
    pub content: &'a str,
    /// Dispatch outcome: handled, suppressed:<reason> or failed:<kind>.
    pub status: &'a str,
}

#[derive(Debug, Clone)]
pub struct AiRequestLogEntry<'a> {
    pub phone: &'a str,
    pub request_type: &'a str,
    pub prompt: &'a str,
    pub response: Option<&'a str>,
    pub success: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct FileLogEntry<'a> {
    pub phone: &'a str,
    pub filename: &'a str,
    pub file_type: &'a str,
    pub file_size: u64,
    pub extracted: bool,
    pub analyzed: bool,
    pub duration_ms: u64,
}

/// Aggregate counters backing /stats, /admin and `warbler status`.
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    pub total_users: i64,
    pub active_today: i64,
    pub banned_users: i64,
    pub admin_users: i64,
    pub total_messages: i64,
    pub messages_today: i64,
    pub commands_used: i64,
    pub ai_requests: i64,
    pub files_processed: i64,
    pub top_commands: Vec<(String, i64)>,
}

/// SQLite-backed activity store. Opens a fresh connection per call; WAL with
/// a busy timeout keeps concurrent dispatch tasks from tripping over locks.
pub struct Store {
    db_path: PathBuf,
}

fn now_str() -> String {
    // Fixed-width timestamps so lexicographic MAX() is chronological
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

impl Store {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        // Use execute_batch for PRAGMA statements that might return values
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=3000;",
        )?;
        Ok(conn)
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                phone TEXT NOT NULL UNIQUE,
                name TEXT,
                is_admin INTEGER NOT NULL DEFAULT 0,
                is_banned INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_seen TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY,
                message_id TEXT NOT NULL UNIQUE,
                phone TEXT NOT NULL,
                group_id TEXT,
                kind TEXT NOT NULL,
                command TEXT,
                content TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_phone ON messages(phone);
            CREATE INDEX IF NOT EXISTS idx_messages_created ON messages(created_at);
            CREATE TABLE IF NOT EXISTS ai_requests (
                id INTEGER PRIMARY KEY,
                phone TEXT NOT NULL,
                request_type TEXT NOT NULL,
                prompt TEXT NOT NULL,
                response TEXT,
                success INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS file_logs (
                id INTEGER PRIMARY KEY,
                phone TEXT NOT NULL,
                filename TEXT NOT NULL,
                file_type TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                extracted INTEGER NOT NULL,
                analyzed INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Fetch or create the user row, advancing last-seen monotonically and
    /// refreshing the display name. `bootstrap_admin` grants the admin flag
    /// (it is never revoked here).
    pub fn get_or_create_user(
        &self,
        phone: &str,
        name: Option<&str>,
        bootstrap_admin: bool,
    ) -> Result<User> {
        let conn = self.connect()?;
        let now = now_str();
        conn.execute(
            "INSERT OR IGNORE INTO users (phone, name, is_admin, is_banned, created_at, last_seen)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)",
            params![phone, name, bootstrap_admin, now],
        )?;
        conn.execute(
            "UPDATE users
             SET last_seen = MAX(last_seen, ?2),
                 name = COALESCE(?3, name),
                 is_admin = (is_admin OR ?4)
             WHERE phone = ?1",
            params![phone, now, name, bootstrap_admin],
        )?;
        self.fetch_user(&conn, phone)?
            .context("user row vanished after upsert")
    }

    pub fn get_user(&self, phone: &str) -> Result<Option<User>> {
        let conn = self.connect()?;
        self.fetch_user(&conn, phone)
    }

    fn fetch_user(&self, conn: &Connection, phone: &str) -> Result<Option<User>> {
        let user = conn
            .query_row(
                "SELECT phone, name, is_admin, is_banned, created_at, last_seen
                 FROM users WHERE phone = ?1",
                [phone],
                |row| {
                    Ok(User {
                        phone: row.get(0)?,
                        name: row.get(1)?,
                        is_admin: row.get(2)?,
                        is_banned: row.get(3)?,
                        created_at: row.get(4)?,
                        last_seen: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// Flip the banned flag. Returns false when no such user exists.
    pub fn set_banned(&self, phone: &str, banned: bool) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE users SET is_banned = ?2 WHERE phone = ?1",
            params![phone, banned],
        )?;
        Ok(changed > 0)
    }

    /// Phone numbers eligible for a broadcast (everyone not banned).
    pub fn broadcast_targets(&self) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT phone FROM users WHERE is_banned = 0 ORDER BY phone")?;
        let phones = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(phones)
    }

    pub fn log_message(&self, entry: &MessageLogEntry<'_>) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR IGNORE INTO messages
             (message_id, phone, group_id, kind, command, content, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.message_id,
                entry.phone,
                entry.group_id,
                entry.kind,
                entry.command,
                truncate_chars(entry.content, MAX_LOGGED_CONTENT_CHARS),
                entry.status,
                now_str(),
            ],
        )?;
        Ok(())
    }

    pub fn log_ai_request(&self, entry: &AiRequestLogEntry<'_>) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO ai_requests
             (phone, request_type, prompt, response, success, duration_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.phone,
                entry.request_type,
                truncate_chars(entry.prompt, MAX_LOGGED_PROMPT_CHARS),
                entry
                    .response
                    .map(|r| truncate_chars(r, MAX_LOGGED_RESPONSE_CHARS)),
                entry.success,
                entry.duration_ms as i64,
                now_str(),
            ],
        )?;
        Ok(())
    }

    pub fn log_file(&self, entry: &FileLogEntry<'_>) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO file_logs
             (phone, filename, file_type, file_size, extracted, analyzed, duration_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.phone,
                entry.filename,
                entry.file_type,
                entry.file_size as i64,
                entry.extracted,
                entry.analyzed,
                entry.duration_ms as i64,
                now_str(),
            ],
        )?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StatsSnapshot> {
        let conn = self.connect()?;
        let count = |sql: &str| -> Result<i64> {
            conn.query_row(sql, [], |row| row.get(0))
                .context("stats query failed")
        };

        let mut snapshot = StatsSnapshot {
            total_users: count("SELECT COUNT(*) FROM users")?,
            active_today: count("SELECT COUNT(*) FROM users WHERE last_seen >= date('now')")?,
            banned_users: count("SELECT COUNT(*) FROM users WHERE is_banned = 1")?,
            admin_users: count("SELECT COUNT(*) FROM users WHERE is_admin = 1")?,
            total_messages: count("SELECT COUNT(*) FROM messages")?,
            messages_today: count("SELECT COUNT(*) FROM messages WHERE created_at >= date('now')")?,
            commands_used: count("SELECT COUNT(*) FROM messages WHERE command IS NOT NULL")?,
            ai_requests: count("SELECT COUNT(*) FROM ai_requests")?,
            files_processed: count("SELECT COUNT(*) FROM file_logs")?,
            top_commands: Vec::new(),
        };

        let mut stmt = conn.prepare(
            "SELECT command, COUNT(*) AS uses FROM messages
             WHERE command IS NOT NULL
             GROUP BY command ORDER BY uses DESC, command ASC LIMIT 5",
        )?;
        snapshot.top_commands = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(snapshot)
    }
}
