//! Insider Threat Detection Pipeline - Main Entry Point
//!
//! Consumes session envelopes from NATS, runs dual-model inference, and
//! publishes threat alerts. Supports parallel session processing for high
//! throughput.

use anyhow::Result;
use futures::StreamExt;
use insider_threat_pipeline::{
    config::AppConfig,
    consumer::{SessionConsumer, SessionEnvelope},
    metrics::{MetricsReporter, PipelineMetrics},
    models::registry::{ModelRegistry, ModelVersion},
    orchestrator::InferenceOrchestrator,
    producer::AlertProducer,
    store::PredictionStore,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("insider_threat_pipeline=info".parse()?),
        )
        .init();

    info!("Starting Insider Threat Detection Pipeline");

    // Load configuration
    let config = AppConfig::load()?;
    info!(
        xgb_weight = config.ensemble.xgb_weight,
        lstm_weight = config.ensemble.lstm_weight,
        threshold = config.ensemble.threshold,
        cache_ttl_secs = config.cache.ttl_secs,
        rate_limit = config.rate_limit.max_requests,
        "Configuration loaded successfully"
    );

    // Load model artifacts; scoring fails closed without them
    let version = ModelVersion::load(&config.models)?;
    info!(
        version = %version.version_id,
        xgb = %version.xgb_artifact,
        lstm = %version.lstm_artifact,
        "Model version loaded"
    );
    let registry = Arc::new(ModelRegistry::with_active(version));

    // Open the prediction store
    let store = Arc::new(PredictionStore::open(&config.store.path)?);

    // Initialize metrics
    let metrics = Arc::new(PipelineMetrics::new());

    // Wire up the orchestrator
    let orchestrator = Arc::new(InferenceOrchestrator::new(
        &config,
        registry,
        store,
        metrics.clone(),
    ));

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    // Initialize consumer and producer
    let consumer = SessionConsumer::new(client.clone(), &config.nats.session_subject);
    let producer = Arc::new(AlertProducer::new(client.clone(), &config.nats.alert_subject));

    let num_workers = config.pipeline.workers;
    info!(
        "Starting session processing loop with {} parallel workers",
        num_workers
    );
    info!("Listening on subject: {}", config.nats.session_subject);
    info!("Publishing alerts to: {}", config.nats.alert_subject);

    // Semaphore to limit concurrent processing
    let semaphore = Arc::new(Semaphore::new(num_workers));

    // Start metrics reporter (prints summary every 30 seconds)
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        let reporter = MetricsReporter::new(metrics_clone, 30);
        reporter.start().await;
    });

    // Process sessions in parallel
    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let permit = semaphore.clone().acquire_owned().await.unwrap();

        let orchestrator = orchestrator.clone();
        let producer = producer.clone();

        tokio::spawn(async move {
            match serde_json::from_slice::<SessionEnvelope>(&message.payload) {
                Ok(envelope) => {
                    let session_id = envelope.session.session_id.clone();

                    match orchestrator
                        .score_session(&envelope.session, &envelope.client_id)
                        .await
                    {
                        Ok(response) => {
                            if response.verdict.is_alert {
                                if let Err(e) = producer.publish(&response).await {
                                    error!(
                                        session_id = %session_id,
                                        error = %e,
                                        "Failed to publish threat alert"
                                    );
                                } else {
                                    info!(
                                        session_id = %session_id,
                                        fused_score = response.verdict.fused_score,
                                        cached = response.cached,
                                        latency_us = response.latency_us,
                                        "Threat alert published"
                                    );
                                }
                            } else {
                                debug!(
                                    session_id = %session_id,
                                    fused_score = response.verdict.fused_score,
                                    filtered = response.verdict.filtered,
                                    reason = response.verdict.reason.as_deref().unwrap_or(""),
                                    latency_us = response.latency_us,
                                    "Session scored (no alert)"
                                );
                            }
                        }
                        Err(e) if e.is_client_error() => {
                            warn!(
                                session_id = %session_id,
                                client_id = %envelope.client_id,
                                code = e.code(),
                                error = %e,
                                "Request rejected"
                            );
                        }
                        Err(e) => {
                            error!(
                                session_id = %session_id,
                                code = e.code(),
                                error = %e,
                                "Scoring failed"
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to deserialize session envelope");
                }
            }

            drop(permit);
        });
    }

    info!("Pipeline shutting down...");
    metrics.print_summary();

    Ok(())
}
