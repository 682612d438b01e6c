use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jalali;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Title must be at least 2 characters long")]
    TitleTooShort,
    #[error("Priority must be 1, 2 or 3, got {0}")]
    InvalidPriority(i64),
    #[error("Date must be in YYYY-MM-DD format: {0}")]
    InvalidDate(String),
    #[error("Time must be in HH:MM format: {0}")]
    InvalidTime(String),
    #[error("Name cannot be empty")]
    EmptyName,
    #[error("Unknown theme: {0}")]
    UnknownTheme(String),
}

/// Task priority, stored as 1-3 in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn from_i64(value: i64) -> Result<Self, ValidationError> {
        match value {
            1 => Ok(Priority::Low),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::High),
            other => Err(ValidationError::InvalidPriority(other)),
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Option<i64>,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub date: String, // ISO 8601: YYYY-MM-DD
    pub time: String, // HH:MM
    pub repeat_daily: bool,
    pub is_completed: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    /// Build tomorrow's occurrence of a repeating task: same
    /// title/description/priority/time/repeat flag, new date, not yet
    /// completed, fresh timestamps.
    pub fn clone_for_date(&self, date: &str, timestamp: &str) -> Task {
        Task {
            id: None,
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority,
            date: date.to_string(),
            time: self.time.clone(),
            repeat_daily: self.repeat_daily,
            is_completed: false,
            created_at: timestamp.to_string(),
            updated_at: timestamp.to_string(),
        }
    }
}

/// Validated payload for inserting a new task.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub date: String,
    pub time: String,
    pub repeat_daily: bool,
}

impl TaskDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)?;
        validate_iso_date(&self.date)?;
        validate_time(&self.time)?;
        Ok(())
    }
}

/// Partial update for an existing task; `None` fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub repeat_daily: Option<bool>,
    pub is_completed: Option<bool>,
}

impl TaskPatch {
    /// Apply the patch on top of the current row and validate the result.
    pub fn apply(&self, current: &Task) -> Result<TaskDraft, ValidationError> {
        let draft = TaskDraft {
            title: self
                .title
                .as_deref()
                .map(str::trim)
                .unwrap_or(&current.title)
                .to_string(),
            description: self
                .description
                .clone()
                .unwrap_or_else(|| current.description.clone()),
            priority: self.priority.unwrap_or(current.priority),
            date: self.date.clone().unwrap_or_else(|| current.date.clone()),
            time: self.time.clone().unwrap_or_else(|| current.time.clone()),
            repeat_daily: self.repeat_daily.unwrap_or(current.repeat_daily),
        };
        draft.validate()?;
        Ok(draft)
    }
}

pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().chars().count() < 2 {
        return Err(ValidationError::TitleTooShort);
    }
    Ok(())
}

pub fn validate_iso_date(value: &str) -> Result<(), ValidationError> {
    jalali::parse_iso_date(value)
        .map(|_| ())
        .ok_or_else(|| ValidationError::InvalidDate(value.to_string()))
}

/// Strict `HH:MM`, 00-23 hours and 00-59 minutes.
pub fn validate_time(value: &str) -> Result<(), ValidationError> {
    let bytes = value.as_bytes();
    let shape_ok = bytes.len() == 5
        && bytes[2] == b':'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 2 || b.is_ascii_digit());
    if shape_ok && NaiveTime::parse_from_str(value, "%H:%M").is_ok() {
        Ok(())
    } else {
        Err(ValidationError::InvalidTime(value.to_string()))
    }
}

/// Theme preference stored in the profile settings blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    System,
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
            ThemeMode::System => "system",
        };
        write!(f, "{label}")
    }
}

impl FromStr for ThemeMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(ThemeMode::Light),
            "dark" => Ok(ThemeMode::Dark),
            "system" => Ok(ThemeMode::System),
            other => Err(ValidationError::UnknownTheme(other.to_string())),
        }
    }
}

/// User settings persisted as a single JSON column on the profile row.
/// Keys stay camelCase on disk; unknown keys are ignored when reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_repeat_check: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<ThemeMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
}

impl ProfileSettings {
    /// Shallow merge: fields present in `other` win.
    pub fn merge(&mut self, other: ProfileSettings) {
        if other.last_repeat_check.is_some() {
            self.last_repeat_check = other.last_repeat_check;
        }
        if other.theme.is_some() {
            self.theme = other.theme;
        }
        if other.email.is_some() {
            self.email = other.email;
        }
        if other.age.is_some() {
            self.age = other.age;
        }
    }

    pub fn theme(&self) -> ThemeMode {
        self.theme.unwrap_or_default()
    }
}

pub const DEFAULT_PROFILE_NAME: &str = "کاربر";

#[derive(Debug, Clone)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub avatar: Option<String>,
    pub settings: ProfileSettings,
}

/// Partial profile update; settings are merged, not replaced.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub settings: Option<ProfileSettings>,
}

impl ProfilePatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ValidationError::EmptyName);
            }
        }
        Ok(())
    }
}
