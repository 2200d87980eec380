use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use serde::Serialize;

use crate::models::{blinks_per_minute, HistoryRecord};

const TIME_LABEL: &str = "%H:%M:%S";
const DATE_LABEL: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SeriesPoint {
    pub label: String,
    /// Blinks per minute, rounded to two decimals.
    pub rate: f64,
}

pub type Series = Vec<SeriesPoint>;

/// `None` means "no data" and is distinct from a series of zero rates.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    pub today: Option<Series>,
    pub per_day: Option<Series>,
}

impl Aggregation {
    pub fn is_empty(&self) -> bool {
        self.today.is_none() && self.per_day.is_none()
    }
}

/// Running totals for one local calendar date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub total_blink_count: u64,
    pub total_duration_sec: f64,
}

impl DailyBucket {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            total_blink_count: 0,
            total_duration_sec: 0.0,
        }
    }

    fn add(&mut self, record: &HistoryRecord) {
        self.total_blink_count += u64::from(record.blink_count);
        self.total_duration_sec += record.stare_duration_sec.max(0.0);
    }

    /// Rate over the summed duration, not the mean of per-record rates.
    pub fn rate(&self) -> f64 {
        blinks_per_minute(self.total_blink_count as f64, self.total_duration_sec)
    }
}

/// Aggregate against the local clock.
pub fn aggregate(records: &[HistoryRecord]) -> Aggregation {
    aggregate_at(records, &Local::now())
}

/// Same as [`aggregate`] with the clock (and so the time zone that defines
/// "today" and calendar dates) supplied by the caller.
pub fn aggregate_at<Tz>(records: &[HistoryRecord], now: &DateTime<Tz>) -> Aggregation
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    if records.is_empty() {
        return Aggregation::default();
    }

    let tz = now.timezone();
    let today = now.date_naive();

    let mut todays: Vec<(DateTime<Tz>, f64)> = records
        .iter()
        .map(|record| (record.captured_at.with_timezone(&tz), record.rate()))
        .filter(|(at, _)| at.date_naive() == today)
        .collect();
    todays.sort_by(|a, b| a.0.cmp(&b.0));

    let today_series: Series = todays
        .into_iter()
        .map(|(at, rate)| SeriesPoint {
            label: at.format(TIME_LABEL).to_string(),
            rate: round2(rate),
        })
        .collect();

    let per_day: Series = daily_buckets(records, &tz)
        .into_iter()
        .map(|bucket| SeriesPoint {
            label: bucket.date.format(DATE_LABEL).to_string(),
            rate: round2(bucket.rate()),
        })
        .collect();

    Aggregation {
        today: (!today_series.is_empty()).then_some(today_series),
        per_day: (!per_day.is_empty()).then_some(per_day),
    }
}

/// One bucket per distinct local date, ascending.
pub fn daily_buckets<Tz: TimeZone>(records: &[HistoryRecord], tz: &Tz) -> Vec<DailyBucket> {
    let mut buckets: BTreeMap<NaiveDate, DailyBucket> = BTreeMap::new();
    for record in records {
        let date = record.captured_at.with_timezone(tz).date_naive();
        buckets
            .entry(date)
            .or_insert_with(|| DailyBucket::new(date))
            .add(record);
    }
    buckets.into_values().collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
