use std::path::Path;

use anyhow::Result;
use clap::Parser;

use esguard_core::config::EsguardConfig;
use esguard_daemon::cli::DaemonCli;
use esguard_daemon::logging;
use esguard_daemon::orchestrator::Orchestrator;
use esguard_detector::RuleLoader;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // File, then environment, then command line
    let mut config = EsguardConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    logging::init_tracing(&config.general)?;

    if cli.validate {
        return validate_only(&config).await;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "esguard-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await
}

/// Load the rule file and report the result without polling.
async fn validate_only(config: &EsguardConfig) -> Result<()> {
    let path = Path::new(&config.detector.rules_path);
    let outcome = RuleLoader::load_file(path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load rules: {}", e))?;

    for rule in outcome.rules.iter() {
        println!(
            "rule {} index={} plugin_sid={} fields={}",
            rule.name(),
            rule.data_index(),
            rule.plugin_sid(),
            rule.fields().join(",")
        );
    }
    for err in &outcome.rejected {
        println!("rejected: {err}");
    }

    if outcome.rejected.is_empty() && !outcome.rules.is_empty() {
        println!("configuration OK: {} rules", outcome.rules.len());
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{} rules valid, {} rejected in {}",
            outcome.rules.len(),
            outcome.rejected.len(),
            path.display()
        ))
    }
}
