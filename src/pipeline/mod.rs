// src/pipeline/mod.rs

pub mod event_log;
pub mod metrics;
pub mod monitor;

pub use event_log::EventLog;
pub use metrics::PipelineMetrics;
pub use monitor::{Notification, PerimeterMonitor};
