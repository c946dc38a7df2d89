//! Cycle forecasting for a single user's history: next period, ovulation,
//! fertile window, regularity statistics and trend, backed by an encrypted
//! on-device vault.

pub mod commands;
pub mod config;
pub mod crypto;
pub mod history;
pub mod models;
pub mod prediction;
pub mod stats;
pub mod storage;

pub use commands::{Session, SessionError};
pub use config::Config;
pub use history::{HistoryStore, MemoryHistoryStore};
pub use models::{CycleRecord, CycleStatistics, PredictionResult, TimeRange};
pub use prediction::CyclePredictor;
pub use stats::{compute_statistics, compute_statistics_at};
