//! Daemon orchestration -- assembly, event output wiring, and lifecycle.
//!
//! The [`Orchestrator`] loads the rule file, builds the Elasticsearch
//! detector, connects its event channel to the output writer, and runs
//! until a shutdown signal arrives.
//!
//! # Shutdown Order (producer first)
//!
//! 1. Detector (finish the current rule or abort after `stop_timeout_secs`)
//! 2. Event writer (drain buffered events, flush stdout)

use std::future::Future;
use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use tokio::io::AsyncWrite;
use tokio::sync::{broadcast, mpsc};

use esguard_core::config::EsguardConfig;
use esguard_core::event::SecurityEvent;
use esguard_core::pipeline::Pipeline;
use esguard_detector::{
    DataStore, DetectorConfig, ElasticDetector, ElasticDetectorBuilder, RuleLoader, RuleSet,
};

use crate::metrics_server;
use crate::output;

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: EsguardConfig,
    /// The polling detector.
    detector: ElasticDetector,
    /// Shutdown broadcast sender (signals the output task).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time.
    start_time: Instant,
    /// Event receiver, taken by the output task on run.
    event_rx: Option<mpsc::Receiver<SecurityEvent>>,
}

impl Orchestrator {
    /// Build from an already-loaded configuration.
    ///
    /// Loads the rule file named by `detector.rules_path`. Rejected rules
    /// are logged and skipped; a file with no valid rule is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The rule file cannot be loaded or holds no valid rule
    pub async fn build_from_config(config: EsguardConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        let outcome = RuleLoader::load_file(Path::new(&config.detector.rules_path))
            .await
            .map_err(|e| anyhow::anyhow!("failed to load rules: {}", e))?;

        if outcome.rules.is_empty() {
            return Err(anyhow::anyhow!(
                "no valid detection rules in {} ({} rejected)",
                config.detector.rules_path,
                outcome.rejected.len()
            ));
        }

        tracing::info!(
            path = %config.detector.rules_path,
            loaded = outcome.rules.len(),
            rejected = outcome.rejected.len(),
            "detection rules loaded"
        );

        // Install metrics recorder before the detector records its gauges
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        Self::from_parts(config, outcome.rules)
    }

    /// Assemble the orchestrator from a configuration and a parsed rule set.
    pub fn from_parts(config: EsguardConfig, rules: RuleSet) -> Result<Self> {
        let detector_config = DetectorConfig::from_core(&config.detector);

        let (detector, event_rx) = ElasticDetectorBuilder::new()
            .config(detector_config)
            .rules(rules)
            .event_channel_capacity(config.detector.event_channel_capacity)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build detector: {}", e))?;

        let (shutdown_tx, _) = broadcast::channel(4);

        tracing::info!(
            rules = detector.rule_count(),
            plugin_id = %config.detector.plugin_id,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            detector,
            shutdown_tx,
            start_time: Instant::now(),
            event_rx,
        })
    }

    /// Start the detector and write events to stdout until SIGTERM or SIGINT.
    pub async fn run(&mut self) -> Result<()> {
        self.detector
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start detector: {}", e))?;

        self.serve(tokio::io::stdout(), wait_for_shutdown_signal())
            .await
    }

    /// Start the detector against the given store and write events to
    /// `writer` until `shutdown` resolves.
    pub async fn run_with_store<S, W, F>(&mut self, store: S, writer: W, shutdown: F) -> Result<()>
    where
        S: DataStore,
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = Result<&'static str>>,
    {
        self.detector
            .start_with_store(store)
            .map_err(|e| anyhow::anyhow!("failed to start detector: {}", e))?;

        self.serve(writer, shutdown).await
    }

    async fn serve<W, F>(&mut self, writer: W, shutdown: F) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = Result<&'static str>>,
    {
        let uptime_task = if self.config.metrics.enabled {
            record_daemon_metrics();
            Some(spawn_uptime_updater(
                self.start_time,
                self.shutdown_tx.subscribe(),
            ))
        } else {
            None
        };

        let writer_task = match self.event_rx.take() {
            Some(event_rx) => Some(output::spawn_event_writer(
                event_rx,
                writer,
                self.shutdown_tx.subscribe(),
            )),
            None => {
                tracing::warn!("no event receiver available, events will not be written");
                None
            }
        };

        tracing::info!("esguard-daemon running");
        let signal = shutdown.await?;
        tracing::info!(signal = signal, "shutdown signal received");

        let stop_result = self.shutdown().await;

        // Producer is stopped; let the writer drain what is buffered
        let _ = self.shutdown_tx.send(());
        if let Some(task) = writer_task {
            match task.await {
                Ok((_, written)) => tracing::info!(written, "event writer finished"),
                Err(e) => tracing::error!(error = %e, "event writer task failed"),
            }
        }
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        tracing::info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            "esguard-daemon shut down"
        );
        stop_result
    }

    /// Stop the detector, waiting at most `stop_timeout_secs` before aborting it.
    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping detector");
        self.detector
            .stop()
            .await
            .map_err(|e| anyhow::anyhow!("failed to stop detector: {}", e))
    }

    /// The underlying detector.
    pub fn detector(&self) -> &ElasticDetector {
        &self.detector
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &EsguardConfig {
        &self.config
    }
}

/// Record static daemon metrics once at startup.
fn record_daemon_metrics() {
    use esguard_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Spawn a task that refreshes the uptime gauge every 10 seconds.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use esguard_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}
