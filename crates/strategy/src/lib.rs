pub mod aggregator;
pub mod risk_gate;
pub mod sizing;

pub use aggregator::{SignalAggregator, SourceProfile};
pub use risk_gate::{GateReport, RiskGate};
pub use sizing::confidence_scaled_size;
