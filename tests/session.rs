use chrono::NaiveDate;
use cyclekit::models::{
    ConsistencyLabel, CycleCorrection, CycleTrend, InsightKind, SettingsUpdate, TimeRange, UserId,
};
use cyclekit::storage::StorageError;
use cyclekit::{CyclePredictor, Session, SessionError};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[test]
fn history_survives_lock_and_unlock() {
    let dir = tempfile::tempdir().unwrap();
    let user = UserId::new("alex");
    let session = Session::new(dir.path(), CyclePredictor::new());

    assert!(!session.is_setup(&user).unwrap());
    session.setup(&user, "hunter2").unwrap();
    assert!(session.is_setup(&user).unwrap());

    for start in ["2023-11-04", "2023-12-03", "2024-01-01"] {
        session.log_period(date(start), Some(5)).unwrap();
    }
    let current = session.log_period(date("2024-01-29"), Some(4)).unwrap();
    session.edit_notes(current.id, "started early").unwrap();

    let history = session.history().unwrap();
    let lengths: Vec<Option<u32>> = history.iter().map(|c| c.cycle_length).collect();
    assert_eq!(lengths, vec![None, Some(28), Some(29), Some(29)]);

    session.lock().unwrap();
    assert!(!session.is_unlocked());

    assert!(matches!(
        session.unlock(&user, "hunter3"),
        Err(SessionError::Storage(StorageError::Crypto(_)))
    ));

    session.unlock(&user, "hunter2").unwrap();
    let reloaded = session.history().unwrap();
    assert_eq!(reloaded, history);
    assert_eq!(reloaded[0].notes, "started early");

    let forecast = session.latest_forecast().unwrap().unwrap();
    assert_eq!(forecast.next_period_date, date("2024-02-27"));
    assert_eq!(forecast.ovulation_date, date("2024-02-13"));
    assert_eq!(forecast.fertile_window.start, date("2024-02-08"));
}

#[test]
fn corrections_flow_into_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let user = UserId::new("sam");
    let session = Session::new(dir.path(), CyclePredictor::new());
    session.setup(&user, "pw").unwrap();

    let first = session.log_period(date("2024-01-01"), Some(5)).unwrap();
    session.log_period(date("2024-01-29"), Some(5)).unwrap();
    session.log_period(date("2024-02-26"), Some(5)).unwrap();
    session.log_period(date("2024-03-25"), Some(5)).unwrap();

    let stats = session.statistics(TimeRange::All).unwrap().unwrap();
    assert_eq!(stats.completed_cycles, 3);
    assert_eq!(stats.cycle_variability, 0);
    assert_eq!(stats.regularity_score, 100);
    assert_eq!(stats.consistency, ConsistencyLabel::Regular);
    assert_eq!(session.trend().unwrap(), CycleTrend::Stable);

    session
        .correct_cycle(
            first.id,
            CycleCorrection {
                cycle_length: Some(38),
                period_length: None,
            },
        )
        .unwrap();

    let stats = session.statistics(TimeRange::All).unwrap().unwrap();
    assert_eq!(stats.cycle_variability, 10);
    assert_eq!(stats.regularity_score, 50);
    assert_eq!(stats.consistency, ConsistencyLabel::SomewhatIrregular);
    assert_eq!(stats.longest_cycle.start_date, date("2024-01-01"));

    let insights = session.insights().unwrap();
    assert_eq!(insights[0].kind, InsightKind::Irregular);

    // The corrected length now drives the forecast too: (28 + 28 + 38) / 3 = 31.33
    let forecast = session.forecast().unwrap().unwrap();
    assert_eq!(forecast.next_period_date, date("2024-04-25"));
    assert_eq!(session.fertility_forecast().unwrap().len(), 6);

    session.delete_cycle(first.id).unwrap();
    assert!(session.forecast().unwrap().is_none());
}

#[test]
fn settings_persist_and_do_not_move_the_forecast() {
    let dir = tempfile::tempdir().unwrap();
    let user = UserId::new("kim");
    let session = Session::new(dir.path(), CyclePredictor::new());
    session.setup(&user, "pw").unwrap();

    for start in ["2024-01-01", "2024-01-29", "2024-02-26", "2024-03-25"] {
        session.log_period(date(start), None).unwrap();
    }
    let before = session.forecast().unwrap().unwrap();

    let settings = session
        .update_settings(&SettingsUpdate {
            luteal_phase_days: Some(12),
            show_fertility: Some(true),
            ..SettingsUpdate::default()
        })
        .unwrap();
    assert_eq!(settings.luteal_phase_days, 12);

    let after = session.forecast().unwrap().unwrap();
    assert_eq!(before, after);
    assert_eq!(after.luteal_phase_days, 14);

    session.lock().unwrap();
    session.unlock(&user, "pw").unwrap();
    let settings = session.settings().unwrap();
    assert_eq!(settings.luteal_phase_days, 12);
    assert!(settings.show_fertility);
}

#[test]
fn setup_twice_and_wipe() {
    let dir = tempfile::tempdir().unwrap();
    let user = UserId::new("jo");
    let session = Session::new(dir.path(), CyclePredictor::new());
    session.setup(&user, "pw").unwrap();

    assert!(matches!(
        session.setup(&user, "pw"),
        Err(SessionError::AlreadySetUp(_))
    ));

    session.wipe().unwrap();
    assert!(!session.is_unlocked());
    assert!(!session.is_setup(&user).unwrap());
    assert!(matches!(
        session.unlock(&user, "pw"),
        Err(SessionError::NotSetUp(_))
    ));
}

#[test]
fn temperature_shift_survives_unlock() {
    let dir = tempfile::tempdir().unwrap();
    let user = UserId::new("rae");
    let session = Session::new(dir.path(), CyclePredictor::new());
    session.setup(&user, "pw").unwrap();

    let temps = [36.2, 36.3, 36.2, 36.6, 36.7, 36.6, 36.7];
    for (day, celsius) in date("2024-03-01").iter_days().zip(temps) {
        session.log_temperature(day, celsius).unwrap();
    }

    session.lock().unwrap();
    session.unlock(&user, "pw").unwrap();

    assert_eq!(session.temperatures().unwrap().len(), 7);
    let shift = session.detected_ovulation().unwrap().unwrap();
    assert_eq!(shift.date, date("2024-03-04"));
    assert_eq!(shift.shift_celsius, 0.4);
}
