pub mod aggregate;

use std::sync::Arc;

use serde::Serialize;

use crate::error::{AggregationInputError, RetryError};
use crate::models::{HistoryQuery, HistoryRecord, RecordId};
use crate::transport::{send_with_retry, HistoryBackend, RetryPolicy};

pub use aggregate::{aggregate, aggregate_at, daily_buckets, Aggregation, DailyBucket, Series, SeriesPoint};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "eyecare::history";

use crate::{log_info, log_warn};

/// Everything the history view renders from one load.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryView {
    /// Most recent first, as served.
    pub records: Vec<HistoryRecord>,
    pub aggregation: Aggregation,
    /// Rows dropped because they did not decode.
    pub skipped: usize,
    /// Why the view has no data, when it has none.
    #[serde(skip)]
    pub problem: Option<AggregationInputError>,
}

/// Loads saved sessions and turns them into chartable series.
pub struct HistoryService<H> {
    backend: Arc<H>,
    policy: RetryPolicy,
}

impl<H: HistoryBackend> HistoryService<H> {
    pub fn new(backend: Arc<H>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Never fails: fetch and decode problems degrade to an empty view with
    /// `problem` set.
    pub async fn load(&self, query: HistoryQuery) -> HistoryView {
        match self.fetch(query).await {
            Ok((records, skipped)) => {
                let aggregation = aggregate(&records);
                log_info!(
                    "history loaded: {} records ({} skipped)",
                    records.len(),
                    skipped
                );
                HistoryView {
                    records,
                    aggregation,
                    skipped,
                    problem: None,
                }
            }
            Err(problem) => {
                log_warn!("history unavailable: {problem}");
                HistoryView {
                    problem: Some(problem),
                    ..Default::default()
                }
            }
        }
    }

    async fn fetch(
        &self,
        query: HistoryQuery,
    ) -> Result<(Vec<HistoryRecord>, usize), AggregationInputError> {
        let rows = send_with_retry(&self.policy, "fetch_history", || {
            self.backend.fetch_history(query.clone())
        })
        .await?;

        if rows.is_empty() {
            return Err(AggregationInputError::Empty);
        }
        let (records, skipped) = decode_rows(rows);
        if records.is_empty() {
            return Err(AggregationInputError::Malformed(format!(
                "none of {skipped} rows could be decoded"
            )));
        }
        Ok((records, skipped))
    }

    pub async fn delete(&self, id: RecordId) -> Result<(), RetryError> {
        send_with_retry(&self.policy, "delete_record", || {
            self.backend.delete_record(id.clone())
        })
        .await?;
        log_info!("history record {id} deleted");
        Ok(())
    }
}

/// Decode row by row so one bad row does not hide the rest.
pub fn decode_rows(rows: Vec<serde_json::Value>) -> (Vec<HistoryRecord>, usize) {
    let mut skipped = 0;
    let records = rows
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| match serde_json::from_value(row) {
            Ok(record) => Some(record),
            Err(err) => {
                log_warn!("skipping history row {index}: {err}");
                skipped += 1;
                None
            }
        })
        .collect();
    (records, skipped)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::error::RequestError;

    #[derive(Default)]
    struct FakeStore {
        rows: Option<Vec<serde_json::Value>>,
        queries: Mutex<Vec<HistoryQuery>>,
        deleted: Mutex<Vec<RecordId>>,
    }

    impl HistoryBackend for FakeStore {
        async fn fetch_history(
            &self,
            query: HistoryQuery,
        ) -> Result<Vec<serde_json::Value>, RequestError> {
            self.queries.lock().unwrap().push(query);
            self.rows
                .clone()
                .ok_or_else(|| RequestError::Network("connection refused".into()))
        }

        async fn delete_record(&self, id: RecordId) -> Result<(), RequestError> {
            if id == RecordId::Int(404) {
                return Err(RequestError::Status {
                    code: 404,
                    body: "not found".into(),
                });
            }
            self.deleted.lock().unwrap().push(id);
            Ok(())
        }
    }

    fn make_service(store: FakeStore) -> (HistoryService<FakeStore>, Arc<FakeStore>) {
        let store = Arc::new(store);
        let service = HistoryService::new(
            store.clone(),
            RetryPolicy::single_attempt(Duration::from_secs(5)),
        );
        (service, store)
    }

    fn query() -> HistoryQuery {
        HistoryQuery {
            user_id: Some("7".into()),
            device_id: None,
            limit: 50,
        }
    }

    fn row(id: i64, captured_at: &str) -> serde_json::Value {
        json!({
            "id": id,
            "captured_at": captured_at,
            "blink_count": 10,
            "stare_duration_sec": 120,
            "warning_triggered": false
        })
    }

    #[tokio::test]
    async fn load_skips_bad_rows_and_aggregates_the_rest() {
        let (service, store) = make_service(FakeStore {
            rows: Some(vec![
                row(2, "2026-10-18T09:05:00Z"),
                json!({"id": 3, "captured_at": "not a date"}),
                row(1, "2026-10-17T09:00:00Z"),
            ]),
            ..Default::default()
        });

        let view = service.load(query()).await;
        assert_eq!(view.problem, None);
        assert_eq!(view.records.len(), 2);
        assert_eq!(view.records[0].id, RecordId::Int(2));
        assert_eq!(view.skipped, 1);
        assert_eq!(view.aggregation.per_day.unwrap().len(), 2);
        assert_eq!(store.queries.lock().unwrap()[0], query());
    }

    #[tokio::test]
    async fn unreachable_store_degrades_to_no_data() {
        let (service, _) = make_service(FakeStore::default());
        let view = service.load(query()).await;
        assert!(view.records.is_empty());
        assert!(view.aggregation.is_empty());
        assert!(matches!(view.problem, Some(AggregationInputError::Unavailable(_))));
    }

    #[tokio::test]
    async fn empty_and_malformed_history_are_distinguished() {
        let (service, _) = make_service(FakeStore {
            rows: Some(Vec::new()),
            ..Default::default()
        });
        assert_eq!(service.load(query()).await.problem, Some(AggregationInputError::Empty));

        let (service, _) = make_service(FakeStore {
            rows: Some(vec![json!("garbage"), json!({"id": 1})]),
            ..Default::default()
        });
        let view = service.load(query()).await;
        assert!(matches!(view.problem, Some(AggregationInputError::Malformed(_))));
        assert_eq!(view.aggregation, Aggregation::default());
    }

    #[tokio::test]
    async fn delete_forwards_the_id() {
        let (service, store) = make_service(FakeStore::default());
        service.delete(RecordId::Text("abc".into())).await.unwrap();
        assert_eq!(*store.deleted.lock().unwrap(), vec![RecordId::Text("abc".into())]);

        let err = service.delete(RecordId::Int(404)).await.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(matches!(err.last, RequestError::Status { code: 404, .. }));
    }
}
