use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use eyecare_lib::history::{aggregate_at, daily_buckets, decode_rows};
use eyecare_lib::models::{HistoryRecord, RecordId};
use serde_json::json;

fn backend_rows() -> Vec<serde_json::Value> {
    // Most recent first, mixed timestamp styles as the store returns them.
    vec![
        json!({"id": 5, "captured_at": "2026-10-19T09:05:00+00:00", "blink_count": 5,
               "stare_duration_sec": 60, "warning_triggered": true, "note": "Auto-saved"}),
        json!({"id": 4, "captured_at": "2026-10-19T09:00:00", "blink_count": 10,
               "stare_duration_sec": 120}),
        json!({"id": "legacy-3", "captured_at": "2026-10-18T22:30:00Z", "blink_count": 30,
               "stare_duration_sec": 300, "blink_per_minute": 6.0}),
        json!({"id": 2, "captured_at": "2026-10-17T12:00:00Z", "blink_count": 0,
               "stare_duration_sec": 0}),
    ]
}

fn records() -> Vec<HistoryRecord> {
    let (records, skipped) = decode_rows(backend_rows());
    assert_eq!(skipped, 0);
    records
}

#[test]
fn today_and_per_day_series_in_utc() {
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 20, 0, 0).unwrap();
    let result = aggregate_at(&records(), &now);

    let today = result.today.expect("two sessions today");
    let labels: Vec<&str> = today.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(labels, ["09:00:00", "09:05:00"]);
    assert!(today.iter().all(|p| p.rate == 5.0));

    let per_day = result.per_day.expect("three days of history");
    let labels: Vec<&str> = per_day.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(labels, ["2026-10-17", "2026-10-18", "2026-10-19"]);
    assert_eq!(per_day[0].rate, 0.0);
    assert_eq!(per_day[1].rate, 6.0);
    assert_eq!(per_day[2].rate, 5.0);
}

#[test]
fn local_offset_moves_late_sessions_into_the_next_day() {
    let tz = FixedOffset::east_opt(3 * 3600).unwrap();
    let now: DateTime<FixedOffset> = tz.with_ymd_and_hms(2026, 10, 19, 23, 0, 0).unwrap();
    let result = aggregate_at(&records(), &now);

    // 22:30Z on the 18th is 01:30 on the 19th at UTC+3.
    let today = result.today.unwrap();
    assert_eq!(today.len(), 3);
    assert_eq!(today[0].label, "01:30:00");
    assert_eq!(today[0].rate, 6.0);

    let buckets = daily_buckets(&records(), &tz);
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[1].total_blink_count, 45);
    assert_eq!(buckets[1].total_duration_sec, 480.0);
    assert_eq!(result.per_day.unwrap()[1].rate, 5.63);
}

#[test]
fn no_records_means_no_series() {
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 20, 0, 0).unwrap();
    let result = aggregate_at(&[], &now);
    assert_eq!(result.today, None);
    assert_eq!(result.per_day, None);
}

#[test]
fn ids_keep_their_backend_type() {
    let records = records();
    assert_eq!(records[0].id, RecordId::Int(5));
    assert_eq!(records[2].id, RecordId::Text("legacy-3".into()));
    assert!(records[0].warning_triggered);
    assert!(!records[1].warning_triggered);
}
