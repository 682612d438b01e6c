use chrono::NaiveDate;
use tempfile::TempDir;

use roozane::database::Database;
use roozane::models::{Priority, TaskDraft};
use roozane::repeat;

fn repeating_draft(title: &str, date: &str, time: &str) -> TaskDraft {
    TaskDraft {
        title: title.to_string(),
        description: String::new(),
        priority: Priority::Medium,
        date: date.to_string(),
        time: time.to_string(),
        repeat_daily: true,
    }
}

fn day(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
}

#[test]
fn repeat_check_survives_restarts() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("roozane.db");
    let path = path.to_str().unwrap();

    {
        let mut db = Database::new(path).unwrap();
        db.insert_task(&repeating_draft("ورزش", "2024-03-18", "07:00"))
            .unwrap();

        let outcome = repeat::run_daily_repeat_check(&mut db, day("2024-03-18")).unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(db.tasks_for_date("2024-03-19").unwrap().len(), 1);
    }

    // Restart on the same day: the persisted watermark short-circuits.
    {
        let mut db = Database::new(path).unwrap();
        let profile = db.fetch_profile().unwrap().unwrap();
        assert_eq!(
            profile.settings.last_repeat_check.as_deref(),
            Some("2024-03-18")
        );

        let outcome = repeat::run_daily_repeat_check(&mut db, day("2024-03-18")).unwrap();
        assert_eq!(outcome.created, 0);
        assert_eq!(db.tasks_for_date("2024-03-19").unwrap().len(), 1);
    }
}

#[test]
fn clones_repeat_without_duplicating_occurrences() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("roozane.db");
    let path = path.to_str().unwrap();
    let mut db = Database::new(path).unwrap();

    db.insert_task(&repeating_draft("ورزش", "2024-03-18", "07:00"))
        .unwrap();
    repeat::run_daily_repeat_check(&mut db, day("2024-03-18")).unwrap();

    // The next day both the original and yesterday's clone are repeating
    // templates with the same (title, time); tomorrow still gets exactly
    // one occurrence.
    let outcome = repeat::run_daily_repeat_check(&mut db, day("2024-03-19")).unwrap();
    assert_eq!(outcome.created, 1);

    let nowruz = db.tasks_for_date("2024-03-20").unwrap();
    assert_eq!(nowruz.len(), 1);
    assert_eq!(roozane::jalali::format_jalali_date(&nowruz[0].date), "1403/01/01");

    let profile = db.fetch_profile().unwrap().unwrap();
    assert_eq!(
        profile.settings.last_repeat_check.as_deref(),
        Some("2024-03-19")
    );
}
