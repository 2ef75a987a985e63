use std::sync::Arc;

use anyhow::{Context, Result};
use dlp_config::Config;
use dlp_core::TracingEventSink;
use dlp_engine::{Pipeline, PipelineOptions, WindowSettings};
use dlp_security::{
    DeidentifyClient, HttpDeidentifyClient, PatternDeidentifyClient, RedactionSettings,
};
use dlp_sources::DiscoveryMode;
use dlp_storage::{LocalObjectStore, LocalShardSink};
use tokio_util::sync::CancellationToken;

use crate::cli::RunArgs;

pub async fn handle(args: RunArgs, mut config: Config) -> Result<()> {
    apply_overrides(&args, &mut config);

    if args.local_patterns {
        config.validate_offline()?;
    } else {
        config.validate()?;
    }

    let client: Arc<dyn DeidentifyClient> = if args.local_patterns {
        tracing::info!("Redacting locally with built-in patterns");
        Arc::new(PatternDeidentifyClient::new())
    } else {
        let token = std::env::var(&config.dlp.access_token_env).ok();
        if token.is_none() {
            tracing::warn!(
                env = %config.dlp.access_token_env,
                "No access token set, calling the de-identify endpoint unauthenticated"
            );
        }
        Arc::new(
            HttpDeidentifyClient::new(config.dlp.endpoint.clone(), token, config.dlp.timeout())
                .context("Failed to set up de-identify client")?,
        )
    };

    let mode = if args.once {
        DiscoveryMode::Once
    } else {
        DiscoveryMode::Continuous
    };

    let pipeline = Pipeline::new(
        pipeline_options(&config, mode),
        Arc::new(LocalObjectStore::new()),
        Arc::new(LocalShardSink::new()),
        client,
        Arc::new(TracingEventSink),
    );

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested, draining in-flight work");
            signal.cancel();
        }
    });

    let report = pipeline.run(cancel).await?;
    println!("✓ {}", report);

    Ok(())
}

fn apply_overrides(args: &RunArgs, config: &mut Config) {
    if let Some(project) = &args.project {
        config.dlp.project = project.clone();
    }
    if let Some(template) = &args.deidentify_template {
        config.dlp.deidentify_template = template.clone();
    }
    if let Some(template) = &args.inspect_template {
        config.dlp.inspect_template = template.clone();
    }
    if let Some(bucket_url) = &args.bucket_url {
        config.input.bucket_url = bucket_url.clone();
    }
    if let Some(output) = &args.output {
        config.output.path = output.clone();
    }
    if let Some(batch_size) = args.batch_size {
        config.input.batch_size = batch_size;
    }
    if let Some(secs) = args.poll_interval {
        config.input.poll_interval_secs = secs;
    }
    if let Some(secs) = args.window {
        config.window.length_secs = secs;
    }
    if let Some(ordering) = args.ordering {
        config.window.ordering = ordering;
    }
    if let Some(compression) = args.compression {
        config.input.compression = compression;
    }
    if let Some(naming) = args.naming {
        config.output.naming = naming;
    }
    config.input.exclude.extend(args.exclude.iter().cloned());
}

fn pipeline_options(config: &Config, mode: DiscoveryMode) -> PipelineOptions {
    let redaction = RedactionSettings::new(
        &config.dlp.project,
        config.dlp.deidentify_template.clone(),
        config.dlp.inspect_template.clone(),
    );
    let output_root = config
        .output
        .path
        .strip_prefix("file://")
        .unwrap_or(config.output.path.as_str());

    let mut options = PipelineOptions::new(config.input.bucket_url.clone(), output_root, redaction);
    options.poll_interval = config.input.poll_interval();
    options.exclude = config.input.exclude.clone();
    options.mode = mode;
    options.batch_size = config.input.batch_size;
    options.compression = config.input.compression;
    options.redaction_retry = config.retry.redaction.to_retry_config();
    options.redaction_timeout = config.dlp.timeout();
    options.window = WindowSettings {
        length: config.window.length(),
        fire_delay: config.window.fire_delay(),
        allowed_lateness: config.window.allowed_lateness(),
        ordering: config.window.ordering,
    };
    options.suffix = config.output.suffix.clone();
    options.naming = config.output.naming;
    options.write_retry = config.retry.write.to_retry_config();
    options.write_timeout = config.output.write_timeout();
    options.max_open_files = config.concurrency.max_open_files;
    options.max_inflight_redactions = config.concurrency.max_inflight_redactions;
    options.channel_capacity = config.concurrency.channel_capacity;
    options
}
