pub mod engine;
pub mod features;
pub mod forest;
pub mod rules;
pub mod types;

pub use engine::AnomalyScanner;
pub use types::{AnomalyReport, ScanError, Series, TimeSeriesRecord};
