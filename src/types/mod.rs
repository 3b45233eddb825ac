//! Core data types for the scoring pipeline

pub mod event;
pub mod verdict;

pub use event::{Event, Fingerprint, Session, MAX_SESSION_EVENTS};
pub use verdict::{
    ModelVersionInfo, PredictionRecord, StatisticsSnapshot, Verdict, VerdictResponse,
};
