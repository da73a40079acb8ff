pub mod anomaly;
pub mod api;
pub mod config;
pub mod db;
pub mod llm;
pub mod pipeline;
