use rusqlite::Connection;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

use crate::jalali;
use crate::models::{
    DEFAULT_PROFILE_NAME, Profile, ProfilePatch, ProfileSettings, Priority, Task, TaskDraft,
    TaskPatch, ValidationError,
};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    DirectoryError(String),
    #[error("Invalid input: {0}")]
    ValidationError(#[from] ValidationError),
    #[error("Task not found: {0}")]
    TaskNotFound(i64),
    #[error("Profile row missing after upsert")]
    ProfileMissing,
}

pub struct Database {
    conn: Connection,
}

const TASK_COLUMNS: &str =
    "id, title, description, priority, date, time, repeat_daily, is_completed, created_at, updated_at";

impl Database {
    /// Create a new database connection and initialize the schema
    pub fn new(path: &str) -> Result<Self, DatabaseError> {
        let db_path = PathBuf::from(path);

        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DatabaseError::DirectoryError(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;

        let db = Database { conn };
        db.initialize_schema()?;
        debug!(path, "database ready");

        Ok(db)
    }

    /// Open an in-memory database with the full schema, for tests.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize the database schema (tables and indexes)
    fn initialize_schema(&self) -> Result<(), DatabaseError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                title           TEXT NOT NULL,
                description     TEXT,
                priority        INTEGER NOT NULL DEFAULT 2,
                date            TEXT NOT NULL,
                time            TEXT NOT NULL,
                repeat_daily    INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS profile (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT,
                avatar          TEXT,
                settings_json   TEXT
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tasks_date ON tasks(date)",
            [],
        )?;

        // Covers the repeat-check dedup probe.
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_tasks_title_date_time ON tasks(title, date, time)",
            [],
        )?;

        migrate_add_is_completed(&self.conn)?;

        Ok(())
    }

    /// Run a closure inside a transaction; any error rolls everything back.
    pub fn with_transaction<T, E>(
        &mut self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<DatabaseError>,
    {
        let tx = self.conn.transaction().map_err(DatabaseError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(value)
    }

    /// Helper function to map a row to a Task
    fn row_to_task(row: &rusqlite::Row) -> Result<Task, rusqlite::Error> {
        let priority = Priority::from_i64(row.get(3)?).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Integer,
                Box::new(e),
            )
        })?;
        Ok(Task {
            id: Some(row.get(0)?),
            title: row.get(1)?,
            description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            priority,
            date: row.get(4)?,
            time: row.get(5)?,
            repeat_daily: row.get::<_, i64>(6)? != 0,
            is_completed: row.get::<_, i64>(7)? != 0,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    /// Insert a validated task and return the stored row
    pub fn insert_task(&self, draft: &TaskDraft) -> Result<Task, DatabaseError> {
        draft.validate()?;
        let timestamp = jalali::now_iso();
        let task = Task {
            id: None,
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            priority: draft.priority,
            date: draft.date.clone(),
            time: draft.time.clone(),
            repeat_daily: draft.repeat_daily,
            is_completed: false,
            created_at: timestamp.clone(),
            updated_at: timestamp,
        };
        let id = insert_task_row(&self.conn, &task)?;
        self.task_by_id(id)?.ok_or(DatabaseError::TaskNotFound(id))
    }

    /// Get a single task by ID
    pub fn task_by_id(&self, id: i64) -> Result<Option<Task>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"))?;
        let mut rows = stmt.query_map(rusqlite::params![id], Self::row_to_task)?;
        match rows.next() {
            Some(task) => Ok(Some(task?)),
            None => Ok(None),
        }
    }

    /// Get all tasks scheduled on the given ISO date, earliest time first
    pub fn tasks_for_date(&self, date: &str) -> Result<Vec<Task>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE date = ?1
             ORDER BY date ASC, time ASC, created_at DESC"
        ))?;
        let tasks = stmt
            .query_map(rusqlite::params![date], Self::row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Get all tasks flagged as repeating daily
    pub fn repeating_tasks(&self) -> Result<Vec<Task>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE repeat_daily = 1"
        ))?;
        let tasks = stmt
            .query_map([], Self::row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Apply a partial update to an existing task
    pub fn update_task(&self, id: i64, patch: &TaskPatch) -> Result<Task, DatabaseError> {
        let current = self.task_by_id(id)?.ok_or(DatabaseError::TaskNotFound(id))?;
        let draft = patch.apply(&current)?;
        let is_completed = patch.is_completed.unwrap_or(current.is_completed);
        self.conn.execute(
            "UPDATE tasks SET title = ?1, description = ?2, priority = ?3, date = ?4,
             time = ?5, repeat_daily = ?6, is_completed = ?7, updated_at = ?8 WHERE id = ?9",
            rusqlite::params![
                draft.title,
                draft.description,
                draft.priority.as_i64(),
                draft.date,
                draft.time,
                draft.repeat_daily as i64,
                is_completed as i64,
                jalali::now_iso(),
                id
            ],
        )?;
        self.task_by_id(id)?.ok_or(DatabaseError::TaskNotFound(id))
    }

    /// Delete a task by ID
    pub fn delete_task(&self, id: i64) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM tasks WHERE id = ?1", rusqlite::params![id])?;
        Ok(())
    }

    /// Set or toggle the completion flag; `None` flips the current value
    pub fn set_completed(&self, id: i64, value: Option<bool>) -> Result<Task, DatabaseError> {
        let current = self.task_by_id(id)?.ok_or(DatabaseError::TaskNotFound(id))?;
        let next = value.unwrap_or(!current.is_completed);
        self.conn.execute(
            "UPDATE tasks SET is_completed = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![next as i64, jalali::now_iso(), id],
        )?;
        self.task_by_id(id)?.ok_or(DatabaseError::TaskNotFound(id))
    }

    /// Flip the repeat-daily flag
    pub fn toggle_repeat(&self, id: i64) -> Result<Task, DatabaseError> {
        let current = self.task_by_id(id)?.ok_or(DatabaseError::TaskNotFound(id))?;
        self.conn.execute(
            "UPDATE tasks SET repeat_daily = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![!current.repeat_daily as i64, jalali::now_iso(), id],
        )?;
        self.task_by_id(id)?.ok_or(DatabaseError::TaskNotFound(id))
    }

    /// True if a task with this (title, date, time) triple already exists
    pub fn occurrence_exists(
        &self,
        title: &str,
        date: &str,
        time: &str,
    ) -> Result<bool, DatabaseError> {
        occurrence_exists(&self.conn, title, date, time)
    }

    fn row_to_profile(row: &rusqlite::Row) -> Result<(i64, Option<String>, Option<String>, Option<String>), rusqlite::Error> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }

    fn profile_from_row(
        (id, name, avatar, settings_json): (i64, Option<String>, Option<String>, Option<String>),
    ) -> Profile {
        let settings = match settings_json.as_deref() {
            None | Some("") => ProfileSettings::default(),
            Some(json) => serde_json::from_str(json).unwrap_or_else(|err| {
                // A corrupt blob must not take the whole profile down.
                warn!(%err, "malformed profile settings, using defaults");
                ProfileSettings::default()
            }),
        };
        Profile {
            id,
            name: name.unwrap_or_else(|| DEFAULT_PROFILE_NAME.to_string()),
            avatar,
            settings,
        }
    }

    /// Get the profile row, if one exists
    pub fn fetch_profile(&self) -> Result<Option<Profile>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, avatar, settings_json FROM profile LIMIT 1")?;
        let mut rows = stmt.query_map([], Self::row_to_profile)?;
        match rows.next() {
            Some(row) => Ok(Some(Self::profile_from_row(row?))),
            None => Ok(None),
        }
    }

    /// Get the profile, creating the default one on first run
    pub fn load_or_create_profile(&self) -> Result<Profile, DatabaseError> {
        if let Some(profile) = self.fetch_profile()? {
            return Ok(profile);
        }
        self.upsert_profile(&ProfilePatch {
            name: Some(DEFAULT_PROFILE_NAME.to_string()),
            ..ProfilePatch::default()
        })
    }

    /// Create or update the profile row; settings are merged field-wise
    pub fn upsert_profile(&self, patch: &ProfilePatch) -> Result<Profile, DatabaseError> {
        patch.validate()?;
        let existing = self.fetch_profile()?;

        let mut settings = existing
            .as_ref()
            .map(|p| p.settings.clone())
            .unwrap_or_default();
        if let Some(next) = patch.settings.clone() {
            settings.merge(next);
        }
        let settings_json = serde_json::to_string(&settings)
            .expect("profile settings serialize to JSON");

        match existing {
            Some(profile) => {
                let name = patch.name.clone().unwrap_or(profile.name);
                let avatar = patch.avatar.clone().or(profile.avatar);
                self.conn.execute(
                    "UPDATE profile SET name = ?1, avatar = ?2, settings_json = ?3 WHERE id = ?4",
                    rusqlite::params![name, avatar, settings_json, profile.id],
                )?;
            }
            None => {
                let name = patch
                    .name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PROFILE_NAME.to_string());
                self.conn.execute(
                    "INSERT INTO profile (name, avatar, settings_json) VALUES (?1, ?2, ?3)",
                    rusqlite::params![name, patch.avatar, settings_json],
                )?;
            }
        }

        self.fetch_profile()?.ok_or(DatabaseError::ProfileMissing)
    }

    /// Persist the repeat-check watermark in the profile settings
    pub fn set_last_repeat_check(&self, date: &str) -> Result<Profile, DatabaseError> {
        self.upsert_profile(&ProfilePatch {
            settings: Some(ProfileSettings {
                last_repeat_check: Some(date.to_string()),
                ..ProfileSettings::default()
            }),
            ..ProfilePatch::default()
        })
    }
}

/// Insert a task row and return its ID. Works on a plain connection so the
/// repeat check can run it inside its batch transaction.
pub(crate) fn insert_task_row(conn: &Connection, task: &Task) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO tasks (title, description, priority, date, time, repeat_daily, is_completed, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            task.title,
            if task.description.is_empty() {
                None
            } else {
                Some(task.description.as_str())
            },
            task.priority.as_i64(),
            task.date,
            task.time,
            task.repeat_daily as i64,
            task.is_completed as i64,
            task.created_at,
            task.updated_at
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Dedup probe for repeat materialization: (title, date, time) identifies a
/// logical occurrence, deliberately ignoring IDs and the repeat flag.
pub(crate) fn occurrence_exists(
    conn: &Connection,
    title: &str,
    date: &str,
    time: &str,
) -> Result<bool, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT id FROM tasks WHERE title = ?1 AND date = ?2 AND time = ?3")?;
    Ok(stmt.exists(rusqlite::params![title, date, time])?)
}

/// Migrate older databases that predate the is_completed column
fn migrate_add_is_completed(conn: &Connection) -> Result<(), DatabaseError> {
    if !column_exists(conn, "tasks", "is_completed")? {
        conn.execute(
            "ALTER TABLE tasks ADD COLUMN is_completed INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    let mut stmt = conn.prepare("SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2")?;
    let count: i64 = stmt.query_row(rusqlite::params![table, column], |row| row.get(0))?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str, date: &str, time: &str) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            description: String::new(),
            priority: Priority::Medium,
            date: date.to_string(),
            time: time.to_string(),
            repeat_daily: false,
        }
    }

    #[test]
    fn insert_and_fetch_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let task = db.insert_task(&draft("ورزش", "2024-03-19", "07:00")).unwrap();
        let fetched = db.task_by_id(task.id.unwrap()).unwrap().unwrap();
        assert_eq!(fetched.title, "ورزش");
        assert_eq!(fetched.priority, Priority::Medium);
        assert!(!fetched.is_completed);
    }

    #[test]
    fn insert_rejects_invalid_draft() {
        let db = Database::open_in_memory().unwrap();
        let result = db.insert_task(&draft("ورزش", "2024-03-19", "25:00"));
        assert!(matches!(result, Err(DatabaseError::ValidationError(_))));
    }

    #[test]
    fn tasks_for_date_orders_by_time() {
        let db = Database::open_in_memory().unwrap();
        db.insert_task(&draft("شام", "2024-03-19", "20:00")).unwrap();
        db.insert_task(&draft("صبحانه", "2024-03-19", "07:30")).unwrap();
        db.insert_task(&draft("فردا", "2024-03-20", "08:00")).unwrap();

        let today = db.tasks_for_date("2024-03-19").unwrap();
        assert_eq!(today.len(), 2);
        assert_eq!(today[0].title, "صبحانه");
        assert_eq!(today[1].title, "شام");
    }

    #[test]
    fn set_completed_toggles_without_force() {
        let db = Database::open_in_memory().unwrap();
        let task = db.insert_task(&draft("ورزش", "2024-03-19", "07:00")).unwrap();
        let id = task.id.unwrap();

        let toggled = db.set_completed(id, None).unwrap();
        assert!(toggled.is_completed);
        let forced = db.set_completed(id, Some(true)).unwrap();
        assert!(forced.is_completed);
        let back = db.set_completed(id, None).unwrap();
        assert!(!back.is_completed);
    }

    #[test]
    fn update_task_missing_id_errors() {
        let db = Database::open_in_memory().unwrap();
        let result = db.update_task(99, &TaskPatch::default());
        assert!(matches!(result, Err(DatabaseError::TaskNotFound(99))));
    }

    #[test]
    fn occurrence_probe_matches_triple_only() {
        let db = Database::open_in_memory().unwrap();
        db.insert_task(&draft("ورزش", "2024-03-20", "07:00")).unwrap();

        assert!(db.occurrence_exists("ورزش", "2024-03-20", "07:00").unwrap());
        assert!(!db.occurrence_exists("ورزش", "2024-03-20", "08:00").unwrap());
        assert!(!db.occurrence_exists("ورزش", "2024-03-21", "07:00").unwrap());
        assert!(!db.occurrence_exists("خرید", "2024-03-20", "07:00").unwrap());
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let mut db = Database::open_in_memory().unwrap();
        let task = Task {
            id: None,
            title: "نیمه‌کاره".to_string(),
            description: String::new(),
            priority: Priority::Low,
            date: "2024-03-20".to_string(),
            time: "09:00".to_string(),
            repeat_daily: false,
            is_completed: false,
            created_at: "2024-03-19T08:00:00Z".to_string(),
            updated_at: "2024-03-19T08:00:00Z".to_string(),
        };
        let result: Result<(), DatabaseError> = db.with_transaction(|tx| {
            insert_task_row(tx, &task)?;
            Err(DatabaseError::TaskNotFound(0))
        });
        assert!(result.is_err());
        assert!(!db.occurrence_exists("نیمه‌کاره", "2024-03-20", "09:00").unwrap());
    }

    #[test]
    fn profile_is_created_on_demand_with_default_name() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.fetch_profile().unwrap().is_none());
        let profile = db.load_or_create_profile().unwrap();
        assert_eq!(profile.name, DEFAULT_PROFILE_NAME);
        assert_eq!(profile.settings, ProfileSettings::default());
    }

    #[test]
    fn upsert_merges_settings_and_keeps_name() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_profile(&ProfilePatch {
            name: Some("سارا".to_string()),
            settings: Some(ProfileSettings {
                theme: Some(crate::models::ThemeMode::Dark),
                ..ProfileSettings::default()
            }),
            ..ProfilePatch::default()
        })
        .unwrap();

        let profile = db.set_last_repeat_check("2024-03-19").unwrap();
        assert_eq!(profile.name, "سارا");
        assert_eq!(profile.settings.theme, Some(crate::models::ThemeMode::Dark));
        assert_eq!(
            profile.settings.last_repeat_check.as_deref(),
            Some("2024-03-19")
        );
    }

    #[test]
    fn malformed_settings_blob_falls_back_to_defaults() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO profile (name, avatar, settings_json) VALUES ('x', NULL, '{not json')",
                [],
            )
            .unwrap();
        let profile = db.fetch_profile().unwrap().unwrap();
        assert_eq!(profile.settings, ProfileSettings::default());
    }

    #[test]
    fn migration_adds_is_completed_to_old_schema() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT,
                priority INTEGER NOT NULL DEFAULT 2,
                date TEXT NOT NULL,
                time TEXT NOT NULL,
                repeat_daily INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .unwrap();
        assert!(!column_exists(&conn, "tasks", "is_completed").unwrap());
        migrate_add_is_completed(&conn).unwrap();
        assert!(column_exists(&conn, "tasks", "is_completed").unwrap());
        // Running it again is a no-op.
        migrate_add_is_completed(&conn).unwrap();
    }
}
