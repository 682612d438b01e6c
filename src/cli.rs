use chrono::Utc;
use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::warn;

use crate::config::Config;
use crate::database::{Database, DatabaseError};
use crate::jalali::{self, MONTH_NAMES, MonthCursor, WEEKDAY_NAMES};
use crate::models::{Priority, ProfilePatch, ProfileSettings, TaskDraft, TaskPatch, ThemeMode, ValidationError};
use crate::repeat::{self, RepeatError};

#[derive(Parser)]
#[command(name = "roozane")]
#[command(about = "Jalali-calendar daily task manager with repeating tasks")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Use development mode (uses separate dev config/database)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show tasks for a day (default: today); runs the daily repeat check first
    List {
        /// Day to show: YYYY-MM-DD, "today" or "tomorrow"
        date: Option<String>,
    },
    /// Add a new task
    Add {
        /// Task title
        title: String,
        /// Task date: YYYY-MM-DD, "today" or "tomorrow" (default: today)
        #[arg(long)]
        date: Option<String>,
        /// Task time as HH:MM (default from config)
        #[arg(long)]
        time: Option<String>,
        /// Longer description
        #[arg(long)]
        description: Option<String>,
        /// Priority: 1 (low), 2 (medium) or 3 (high)
        #[arg(long, default_value_t = 2)]
        priority: i64,
        /// Repeat this task every day
        #[arg(long)]
        repeat: bool,
    },
    /// Edit an existing task
    Edit {
        /// Task ID
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        priority: Option<i64>,
        /// Turn daily repetition on or off
        #[arg(long)]
        repeat: Option<bool>,
    },
    /// Toggle a task's completion state
    Done {
        /// Task ID
        id: i64,
    },
    /// Delete a task
    Rm {
        /// Task ID
        id: i64,
    },
    /// Toggle daily repetition for a task
    Repeat {
        /// Task ID
        id: i64,
    },
    /// Run the daily repeat check now
    Check,
    /// Show a Jalali month grid
    Cal {
        /// Anchor date: YYYY-MM-DD, "today" or "tomorrow" (default: today)
        date: Option<String>,
        /// Months to move from the anchor (e.g. -1 for the previous month)
        #[arg(long, default_value_t = 0)]
        shift: i32,
    },
    /// Show or update the profile
    Profile {
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Theme: light, dark or system
        #[arg(long)]
        theme: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        age: Option<u32>,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),
    #[error("Repeat check failed: {0}")]
    RepeatError(#[from] RepeatError),
    #[error("{0}")]
    InvalidInput(#[from] ValidationError),
    #[error("Failed to parse date: {0}")]
    DateParseError(String),
}

/// Resolve a user-supplied day to a canonical ISO date string
fn resolve_date(value: Option<&str>) -> Result<String, CliError> {
    match value {
        None | Some("today") => Ok(jalali::today_iso()),
        Some("tomorrow") => jalali::tomorrow_iso()
            .ok_or_else(|| CliError::DateParseError("tomorrow is out of range".to_string())),
        Some(other) => jalali::parse_iso_date(other)
            .map(|_| other.to_string())
            .ok_or_else(|| {
                CliError::DateParseError(format!("Invalid date '{other}', expected YYYY-MM-DD"))
            }),
    }
}

/// Handle the add command
pub fn handle_add(
    db: &Database,
    config: &Config,
    title: String,
    date: Option<String>,
    time: Option<String>,
    description: Option<String>,
    priority: i64,
    repeat: bool,
) -> Result<(), CliError> {
    let draft = TaskDraft {
        title,
        description: description.unwrap_or_default(),
        priority: Priority::from_i64(priority)?,
        date: resolve_date(date.as_deref())?,
        time: time.unwrap_or_else(|| config.default_task_time.clone()),
        repeat_daily: repeat,
    };

    let task = db.insert_task(&draft)?;
    println!(
        "Task created (ID: {}) for {}",
        task.id.unwrap_or_default(),
        jalali::format_jalali_date(&task.date)
    );
    Ok(())
}

/// Handle the list command. Mirrors app startup: the repeat check runs
/// first so tomorrow's occurrences exist before the day view is shown.
pub fn handle_list(db: &mut Database, date: Option<String>) -> Result<(), CliError> {
    match repeat::run_daily_repeat_check(db, Utc::now().date_naive()) {
        Ok(outcome) if outcome.created > 0 => {
            println!("Materialized {} repeating task(s) for tomorrow.", outcome.created);
        }
        Ok(_) => {}
        Err(err) => {
            // Transient: the watermark was not advanced, the next run retries.
            warn!(%err, "daily repeat check failed");
            eprintln!("Warning: could not materialize repeating tasks today: {err}");
        }
    }

    let date = resolve_date(date.as_deref())?;
    let tasks = db.tasks_for_date(&date)?;

    println!("{}  ({})", jalali::format_jalali_date(&date), date);
    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    for task in &tasks {
        let status = if task.is_completed { "[x]" } else { "[ ]" };
        let repeats = if task.repeat_daily { "  (repeats daily)" } else { "" };
        println!(
            "{status} {:>4}  {}  {:<6}  {}{repeats}",
            task.id.unwrap_or_default(),
            task.time,
            task.priority.to_string(),
            task.title
        );
    }
    Ok(())
}

/// Handle the edit command
pub fn handle_edit(
    db: &Database,
    id: i64,
    title: Option<String>,
    date: Option<String>,
    time: Option<String>,
    description: Option<String>,
    priority: Option<i64>,
    repeat: Option<bool>,
) -> Result<(), CliError> {
    let patch = TaskPatch {
        title,
        description,
        priority: priority.map(Priority::from_i64).transpose()?,
        date: date.as_deref().map(|d| resolve_date(Some(d))).transpose()?,
        time,
        repeat_daily: repeat,
        is_completed: None,
    };
    let task = db.update_task(id, &patch)?;
    println!(
        "Task {} updated: {} at {} on {}",
        id,
        task.title,
        task.time,
        jalali::format_jalali_date(&task.date)
    );
    Ok(())
}

/// Handle the done command
pub fn handle_done(db: &Database, id: i64) -> Result<(), CliError> {
    let task = db.set_completed(id, None)?;
    if task.is_completed {
        println!("Task {id} marked as done");
    } else {
        println!("Task {id} marked as not done");
    }
    Ok(())
}

/// Handle the rm command
pub fn handle_rm(db: &Database, id: i64) -> Result<(), CliError> {
    db.delete_task(id)?;
    println!("Task {id} deleted");
    Ok(())
}

/// Handle the repeat command
pub fn handle_repeat(db: &Database, id: i64) -> Result<(), CliError> {
    let task = db.toggle_repeat(id)?;
    if task.repeat_daily {
        println!("Task {id} now repeats daily");
    } else {
        println!("Task {id} no longer repeats");
    }
    Ok(())
}

/// Handle the check command
pub fn handle_check(db: &mut Database) -> Result<(), CliError> {
    let outcome = repeat::run_daily_repeat_check(db, Utc::now().date_naive())?;
    if outcome.created > 0 {
        println!("Materialized {} repeating task(s) for tomorrow.", outcome.created);
    } else {
        println!("Nothing to do; last checked {}.", jalali::format_jalali_date(&outcome.last_checked));
    }
    Ok(())
}

/// Handle the cal command: render one Jalali month, Saturday first
pub fn handle_cal(date: Option<String>, shift: i32) -> Result<(), CliError> {
    let iso = resolve_date(date.as_deref())?;
    let parts = jalali::iso_to_jalali(&iso)
        .ok_or_else(|| CliError::DateParseError(format!("'{iso}' is outside the Jalali range")))?;
    let cursor = MonthCursor::new(parts).step(shift);
    let offset = cursor.first_weekday_offset().ok_or_else(|| {
        CliError::DateParseError(format!("month {}/{} is out of range", cursor.year, cursor.month))
    })?;

    let today = jalali::iso_to_jalali(&jalali::today_iso());

    println!(
        "{:^28}",
        format!("{} {}", MONTH_NAMES[cursor.month as usize - 1], cursor.year)
    );
    let header: String = WEEKDAY_NAMES.iter().map(|w| format!("{w:>3} ")).collect();
    println!("{}", header.trim_end());

    let mut line = "    ".repeat(offset as usize);
    let mut column = offset;
    for day in 1..=cursor.month_length() {
        let is_today = today
            .map(|t| (t.year, t.month, t.day) == (cursor.year, cursor.month, day))
            .unwrap_or(false);
        if is_today {
            line.push_str(&format!("[{day:>2}]"));
        } else {
            line.push_str(&format!(" {day:>2} "));
        }
        column += 1;
        if column == 7 {
            println!("{}", line.trim_end());
            line.clear();
            column = 0;
        }
    }
    if !line.trim().is_empty() {
        println!("{}", line.trim_end());
    }
    Ok(())
}

/// Handle the profile command
pub fn handle_profile(
    db: &Database,
    name: Option<String>,
    theme: Option<String>,
    email: Option<String>,
    age: Option<u32>,
) -> Result<(), CliError> {
    let updating = name.is_some() || theme.is_some() || email.is_some() || age.is_some();

    let profile = if updating {
        let theme = theme.map(|t| t.parse::<ThemeMode>()).transpose()?;
        let settings = if theme.is_some() || email.is_some() || age.is_some() {
            Some(ProfileSettings {
                theme,
                email,
                age,
                ..ProfileSettings::default()
            })
        } else {
            None
        };
        db.upsert_profile(&ProfilePatch {
            name,
            avatar: None,
            settings,
        })?
    } else {
        db.load_or_create_profile()?
    };

    println!("Name:   {}", profile.name);
    println!("Theme:  {}", profile.settings.theme());
    if let Some(email) = &profile.settings.email {
        println!("Email:  {email}");
    }
    if let Some(age) = profile.settings.age {
        println!("Age:    {age}");
    }
    match &profile.settings.last_repeat_check {
        Some(date) => println!("Last repeat check: {}", jalali::format_jalali_date(date)),
        None => println!("Last repeat check: never"),
    }
    Ok(())
}
