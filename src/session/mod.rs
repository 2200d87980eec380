pub mod controller;
pub mod state;

pub use controller::{ControllerConfig, SessionController, SessionSnapshot, StopOutcome};
pub use state::{classify_message, BlinkStats, MessageClass, SessionPhase, Warning, WarningKind};
