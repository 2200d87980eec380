pub mod http;
pub mod retry;

use std::future::Future;

use crate::error::RequestError;
use crate::models::{
    FrameRequest, FrameResponse, HistoryQuery, RecordId, StopRequest, StopResponse,
};

pub use http::HttpBackend;
pub use retry::{send_with_retry, RetryPolicy};

/// The remote analysis service a detection session talks to.
pub trait AnalysisBackend: Send + Sync + 'static {
    fn process_frame(
        &self,
        request: FrameRequest,
    ) -> impl Future<Output = Result<FrameResponse, RequestError>> + Send;

    fn stop_detection(
        &self,
        request: StopRequest,
    ) -> impl Future<Output = Result<StopResponse, RequestError>> + Send;
}

/// The remote store holding saved sessions.
pub trait HistoryBackend: Send + Sync + 'static {
    /// Raw rows, most recent first. Rows are decoded by the caller so one bad
    /// row does not discard the rest.
    fn fetch_history(
        &self,
        query: HistoryQuery,
    ) -> impl Future<Output = Result<Vec<serde_json::Value>, RequestError>> + Send;

    fn delete_record(&self, id: RecordId)
        -> impl Future<Output = Result<(), RequestError>> + Send;
}
