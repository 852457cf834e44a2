pub mod audit;
pub mod config;
pub mod config_loader;
pub mod decision;
pub mod error;
pub mod position;
pub mod retry;
pub mod signal;
pub mod traits;

pub use audit::{DecisionRecord, TransitionRecord};
pub use config::{
    AppConfig, AuditConfig, EmergencyConfig, ExecutionConfig, RiskConfig, ScheduleConfig,
    SourceConfig,
};
pub use config_loader::ConfigLoader;
pub use decision::{ContributingSignal, Decision, DecisionAction};
pub use error::{EngineError, Result};
pub use position::{Position, PositionState, RiskFlag, RiskLevel, Side};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use signal::{Direction, Signal};
pub use traits::{
    AuditSink, ExecutionService, MarketDataFeed, OrderConfirmation, OrderRequest, SignalSource,
};
