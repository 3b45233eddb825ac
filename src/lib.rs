//! Insider Threat Detection Pipeline Library
//!
//! Real-time scoring of user activity sessions for insider-threat risk,
//! fusing a gradient-boosted tree model and a sequence model into a single
//! low-latency verdict.

pub mod cache;
pub mod config;
pub mod consumer;
pub mod error;
pub mod featurizer;
pub mod fusion;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod postfilter;
pub mod producer;
pub mod ratelimit;
pub mod stats;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use consumer::{SessionConsumer, SessionEnvelope};
pub use error::PipelineError;
pub use featurizer::SessionFeaturizer;
pub use models::registry::{ModelRegistry, ModelVersion};
pub use orchestrator::InferenceOrchestrator;
pub use producer::AlertProducer;
pub use types::{Event, Session, Verdict, VerdictResponse};
