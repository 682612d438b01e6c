use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

use crate::database::{self, Database, DatabaseError};
use crate::jalali;
use crate::models::{Task, validate_iso_date, validate_time};

#[derive(Debug, Error)]
pub enum RepeatError {
    #[error("Store error during repeat check: {0}")]
    StoreError(#[from] DatabaseError),
    #[error("Repeating task {id:?} has an invalid {field}: {value}")]
    InvalidTemplate {
        id: Option<i64>,
        field: &'static str,
        value: String,
    },
    #[error("Cannot compute the day after {0}")]
    DateOverflow(NaiveDate),
}

/// Result of one repeat check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatOutcome {
    /// Number of occurrences materialized this run.
    pub created: usize,
    /// The day this check covered; becomes the new watermark.
    pub last_checked: String,
}

impl RepeatOutcome {
    fn nothing_to_do(last_checked: String) -> Self {
        Self {
            created: 0,
            last_checked,
        }
    }
}

/// Ensure every repeating task has exactly one occurrence dated tomorrow.
///
/// The watermark is the day the check last completed; when it equals
/// `today` the whole run short-circuits. Deduplication is on the
/// (title, date, time) triple, so re-running with a stale watermark can
/// never double-insert. The batch runs in a single transaction: either
/// every missing occurrence is created or none are.
///
/// Only one day is projected forward. After N days away, each repeating
/// task still gains a single occurrence (for tomorrow), not N.
pub fn reconcile(
    db: &mut Database,
    today: NaiveDate,
    watermark: Option<&str>,
    templates: &[Task],
) -> Result<RepeatOutcome, RepeatError> {
    let today_iso = jalali::format_iso_date(today);
    if watermark == Some(today_iso.as_str()) {
        return Ok(RepeatOutcome::nothing_to_do(today_iso));
    }
    if templates.is_empty() {
        return Ok(RepeatOutcome::nothing_to_do(today_iso));
    }

    let tomorrow = today.succ_opt().ok_or(RepeatError::DateOverflow(today))?;
    let tomorrow_iso = jalali::format_iso_date(tomorrow);
    let timestamp = jalali::now_iso();

    let created = db.with_transaction(|tx| {
        let mut created = 0;
        for template in templates {
            check_template(template)?;
            if database::occurrence_exists(tx, &template.title, &tomorrow_iso, &template.time)? {
                continue;
            }
            let occurrence = template.clone_for_date(&tomorrow_iso, &timestamp);
            database::insert_task_row(tx, &occurrence)?;
            created += 1;
        }
        Ok::<_, RepeatError>(created)
    })?;

    debug!(created, date = %tomorrow_iso, "repeat check complete");
    Ok(RepeatOutcome {
        created,
        last_checked: today_iso,
    })
}

/// A repeating task with a corrupt date or time fails the whole batch.
/// Skipping it silently would make its occurrences vanish without trace.
fn check_template(task: &Task) -> Result<(), RepeatError> {
    if validate_iso_date(&task.date).is_err() {
        return Err(RepeatError::InvalidTemplate {
            id: task.id,
            field: "date",
            value: task.date.clone(),
        });
    }
    if validate_time(&task.time).is_err() {
        return Err(RepeatError::InvalidTemplate {
            id: task.id,
            field: "time",
            value: task.time.clone(),
        });
    }
    Ok(())
}

/// The app-foreground entry point: read the watermark from the profile,
/// reconcile, and persist the new watermark only after the run succeeded.
/// `today` is passed in rather than read from the clock so callers (and
/// tests) control the day boundary.
pub fn run_daily_repeat_check(
    db: &mut Database,
    today: NaiveDate,
) -> Result<RepeatOutcome, RepeatError> {
    let profile = db.load_or_create_profile()?;
    let watermark = profile.settings.last_repeat_check;
    let templates = db.repeating_tasks()?;

    let outcome = reconcile(db, today, watermark.as_deref(), &templates)?;

    if watermark.as_deref() != Some(outcome.last_checked.as_str()) {
        db.set_last_repeat_check(&outcome.last_checked)?;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, TaskDraft};

    fn seed_repeating(db: &Database, title: &str, date: &str, time: &str) -> Task {
        db.insert_task(&TaskDraft {
            title: title.to_string(),
            description: String::new(),
            priority: Priority::Medium,
            date: date.to_string(),
            time: time.to_string(),
            repeat_daily: true,
        })
        .unwrap()
    }

    fn day(value: &str) -> NaiveDate {
        jalali::parse_iso_date(value).unwrap()
    }

    #[test]
    fn watermark_equal_to_today_short_circuits() {
        let mut db = Database::open_in_memory().unwrap();
        seed_repeating(&db, "ورزش", "2024-03-19", "07:00");
        let templates = db.repeating_tasks().unwrap();

        let outcome = reconcile(&mut db, day("2024-03-19"), Some("2024-03-19"), &templates).unwrap();
        assert_eq!(outcome.created, 0);
        assert_eq!(outcome.last_checked, "2024-03-19");
        assert!(db.tasks_for_date("2024-03-20").unwrap().is_empty());
    }

    #[test]
    fn no_templates_is_a_no_op() {
        let mut db = Database::open_in_memory().unwrap();
        let outcome = reconcile(&mut db, day("2024-03-19"), None, &[]).unwrap();
        assert_eq!(outcome.created, 0);
        assert_eq!(outcome.last_checked, "2024-03-19");
    }

    #[test]
    fn materializes_across_the_nowruz_boundary() {
        // Esfand 29, 1402: the repeat check has to land the new occurrence
        // on 1 Farvardin 1403 without skipping or duplicating.
        let mut db = Database::open_in_memory().unwrap();
        seed_repeating(&db, "ورزش", "2024-03-19", "07:00");
        let templates = db.repeating_tasks().unwrap();

        let outcome = reconcile(&mut db, day("2024-03-19"), Some("2024-03-18"), &templates).unwrap();
        assert_eq!(outcome.created, 1);

        let tomorrow = db.tasks_for_date("2024-03-20").unwrap();
        assert_eq!(tomorrow.len(), 1);
        assert_eq!(tomorrow[0].title, "ورزش");
        assert_eq!(tomorrow[0].time, "07:00");
        assert!(!tomorrow[0].is_completed);
        assert_eq!(
            jalali::format_jalali_date(&tomorrow[0].date),
            "1403/01/01"
        );
    }

    #[test]
    fn second_run_with_fresh_watermark_creates_nothing() {
        let mut db = Database::open_in_memory().unwrap();
        seed_repeating(&db, "ورزش", "2024-03-19", "07:00");
        let templates = db.repeating_tasks().unwrap();
        let today = day("2024-03-19");

        let first = reconcile(&mut db, today, None, &templates).unwrap();
        assert_eq!(first.created, 1);

        let second =
            reconcile(&mut db, today, Some(first.last_checked.as_str()), &templates).unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(db.tasks_for_date("2024-03-20").unwrap().len(), 1);
    }

    #[test]
    fn rerun_with_stale_watermark_deduplicates() {
        // Even without the short-circuit the (title, date, time) probe
        // keeps the run idempotent.
        let mut db = Database::open_in_memory().unwrap();
        seed_repeating(&db, "ورزش", "2024-03-19", "07:00");
        let today = day("2024-03-19");

        for _ in 0..2 {
            let templates = db.repeating_tasks().unwrap();
            reconcile(&mut db, today, Some("2024-03-10"), &templates).unwrap();
        }
        assert_eq!(db.tasks_for_date("2024-03-20").unwrap().len(), 1);
    }

    #[test]
    fn stale_watermark_projects_a_single_day_only() {
        let mut db = Database::open_in_memory().unwrap();
        seed_repeating(&db, "ورزش", "2024-03-14", "07:00");
        let templates = db.repeating_tasks().unwrap();

        // Five days unopened: only tomorrow is materialized, no backfill.
        let outcome = reconcile(&mut db, day("2024-03-19"), Some("2024-03-14"), &templates).unwrap();
        assert_eq!(outcome.created, 1);
        for missed in ["2024-03-15", "2024-03-16", "2024-03-17", "2024-03-18", "2024-03-19"] {
            assert!(
                db.tasks_for_date(missed).unwrap().is_empty(),
                "no backfill for {missed}"
            );
        }
        assert_eq!(db.tasks_for_date("2024-03-20").unwrap().len(), 1);
    }

    #[test]
    fn several_templates_each_get_one_occurrence() {
        let mut db = Database::open_in_memory().unwrap();
        seed_repeating(&db, "ورزش", "2024-03-19", "07:00");
        seed_repeating(&db, "مطالعه", "2024-03-19", "21:00");
        // Same title at a different time is a distinct occurrence.
        seed_repeating(&db, "ورزش", "2024-03-19", "18:00");
        let templates = db.repeating_tasks().unwrap();

        let outcome = reconcile(&mut db, day("2024-03-19"), None, &templates).unwrap();
        assert_eq!(outcome.created, 3);
        assert_eq!(db.tasks_for_date("2024-03-20").unwrap().len(), 3);
    }

    #[test]
    fn invalid_template_aborts_the_whole_batch() {
        let mut db = Database::open_in_memory().unwrap();
        let good = seed_repeating(&db, "ورزش", "2024-03-19", "07:00");
        let mut bad = seed_repeating(&db, "خراب", "2024-03-19", "08:00");
        bad.time = "8 صبح".to_string();
        let templates = vec![good, bad];

        let result = reconcile(&mut db, day("2024-03-19"), None, &templates);
        assert!(matches!(
            result,
            Err(RepeatError::InvalidTemplate { field: "time", .. })
        ));
        // The valid template's insert was rolled back with the batch.
        assert!(db.tasks_for_date("2024-03-20").unwrap().is_empty());
    }

    #[test]
    fn daily_check_persists_the_watermark_once() {
        let mut db = Database::open_in_memory().unwrap();
        seed_repeating(&db, "ورزش", "2024-03-19", "07:00");
        let today = day("2024-03-19");

        let first = run_daily_repeat_check(&mut db, today).unwrap();
        assert_eq!(first.created, 1);
        let profile = db.fetch_profile().unwrap().unwrap();
        assert_eq!(
            profile.settings.last_repeat_check.as_deref(),
            Some("2024-03-19")
        );

        let second = run_daily_repeat_check(&mut db, today).unwrap();
        assert_eq!(second.created, 0);
    }

    #[test]
    fn failed_check_leaves_the_watermark_alone() {
        let mut db = Database::open_in_memory().unwrap();
        db.set_last_repeat_check("2024-03-18").unwrap();
        let mut bad = seed_repeating(&db, "خراب", "2024-03-19", "07:00");
        bad.time = "late".to_string();

        let result = reconcile(&mut db, day("2024-03-19"), Some("2024-03-18"), &[bad]);
        assert!(result.is_err());
        let profile = db.fetch_profile().unwrap().unwrap();
        assert_eq!(
            profile.settings.last_repeat_check.as_deref(),
            Some("2024-03-18")
        );
    }

    #[test]
    fn future_watermark_still_reconciles_today() {
        // Clock skew pushed the watermark past today; the comparison is
        // plain equality, so the check still runs.
        let mut db = Database::open_in_memory().unwrap();
        seed_repeating(&db, "ورزش", "2024-03-19", "07:00");
        let templates = db.repeating_tasks().unwrap();

        let outcome = reconcile(&mut db, day("2024-03-19"), Some("2024-03-25"), &templates).unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.last_checked, "2024-03-19");
    }
}
