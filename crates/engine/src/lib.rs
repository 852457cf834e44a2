//! Engine wiring: the position actor, the emergency monitor, and the
//! scheduler that drives the three independent timer families.

pub mod actor;
pub mod audit_sink;
pub mod commands;
pub mod events;
pub mod handle;
pub mod history;
pub mod monitor;
pub mod scheduler;

pub use actor::PositionActor;
pub use audit_sink::{JsonlAuditSink, NullAuditSink};
pub use commands::{CloseReason, EmergencyReason, PositionCommand};
pub use events::EngineEvent;
pub use handle::PositionHandle;
pub use history::{ClosedTrade, HistorySummary, TradeHistory};
pub use monitor::{EmergencyMonitor, FeedHealth, MonitorVerdict};
pub use scheduler::{Engine, EngineHandle};
