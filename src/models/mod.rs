pub mod history;
pub mod session;

pub use history::{blinks_per_minute, HistoryQuery, HistoryRecord, RecordId};
pub use session::{FrameRequest, FrameResponse, SessionSummary, StopRequest, StopResponse};
