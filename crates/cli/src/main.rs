// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! simtail — tails a simulator's unified-logging stream and emits a stable
//! NDJSON event contract on stdout (§1, §6).
//!
//! Resolves the target device, assembles the producer command, and wires
//! `simtail_daemon::Pipeline` to it. Everything pipeline-internal lives in
//! `simtail-daemon`/`simtail-adapters`/`simtail-storage`; this crate owns
//! only argument parsing, config-file merging, logging setup and exit-code
//! mapping.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod cli_args;
mod config_file;
mod duration;
mod exit_error;
mod logging;

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use simtail_adapters::{CommandProducerSpawner, Device, SimctlTargetResolver, TargetResolver};
use simtail_core::entry::Level;
use simtail_core::{Config, ConfigError, UuidIdGen};
use simtail_daemon::emitter::{Emitter, ErrorPayload, OutputEvent};
use simtail_daemon::filter::compile_predicate;
use simtail_daemon::tracker::SessionContext;
use simtail_daemon::{Pipeline, PipelineArgs};
use simtail_storage::{InMemoryPatternStore, JsonlPatternStore, PatternStore};
use tracing::{error, info};

use crate::cli_args::Cli;
use crate::config_file::{load_file_config, merge_config};
use crate::exit_error::ExitError;

/// Boxing the writer lets `--output`/stdout share one `Pipeline<W>`
/// instantiation instead of monomorphizing the whole pipeline per choice.
type OutWriter = Box<dyn Write + Send>;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        let code = err.downcast_ref::<ExitError>().map_or(1, |e| e.code);
        let message = err.to_string();
        if !message.is_empty() {
            eprintln!("Error: {message}");
        }
        std::process::exit(code);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let file_config = cli.config.as_deref().map(load_file_config).transpose()?;

    let target_query = cli
        .target
        .clone()
        .or_else(|| file_config.as_ref().and_then(|f| f.target.clone()));
    let output_path = cli
        .output
        .clone()
        .or_else(|| file_config.as_ref().and_then(|f| f.output.clone()));
    let pattern_store_path = cli
        .pattern_store
        .clone()
        .or_else(|| file_config.as_ref().and_then(|f| f.pattern_store.clone()));

    let writer = open_writer(output_path.as_deref()).with_context(|| "opening output destination")?;

    let config = match merge_config(file_config.as_ref(), &cli) {
        Ok(config) => config,
        Err(err) => return Err(fail(writer, &err)),
    };

    let resolver = SimctlTargetResolver::new();
    let device = match resolve_device(&resolver, target_query.as_deref()).await {
        Ok(device) => device,
        Err(err) => return Err(fail(writer, &err)),
    };
    info!(udid = %device.udid, name = %device.name, "resolved simulator target");

    resolver
        .ensure_booted(&device.udid)
        .await
        .with_context(|| format!("failed to boot '{}'", device.name))?;

    let app_info = match &config.bundle_id {
        Some(bundle_id) => resolver.get_app_info(&device.udid, bundle_id).await.ok(),
        None => None,
    };

    let session_context = SessionContext {
        app: config.bundle_id.clone().unwrap_or_default(),
        simulator: device.name.clone(),
        udid: device.udid.clone(),
        version: app_info.as_ref().map(|i| i.version.clone()),
        build: app_info.as_ref().map(|i| i.build.clone()),
    };

    let spawner = Box::new(CommandProducerSpawner {
        program: "xcrun".to_string(),
        args: producer_args(&device.udid, &config),
    });

    let pattern_store: Arc<dyn PatternStore> = match pattern_store_path {
        Some(path) => Arc::new(
            JsonlPatternStore::open(&path)
                .with_context(|| format!("opening pattern store '{}'", path.display()))?,
        ),
        None => Arc::new(InMemoryPatternStore::default()),
    };
    let pattern_store = Some(pattern_store);

    let args = PipelineArgs {
        config,
        session_context,
        spawner,
        writer,
        id_gen: Box::new(UuidIdGen),
        pattern_store,
    };

    let (pipeline, init) = match Pipeline::build(args) {
        Ok(pair) => pair,
        Err(err) => {
            error!(code = err.code(), %err, "invalid configuration");
            return Err(ExitError::new(1, err.to_string()).into());
        }
    };

    pipeline.run(init);
    info!(tail_id = %pipeline.tail_id(), "simtail is running");

    wait_for_shutdown_signal().await;
    info!("shutting down");
    pipeline.stop().await;

    Ok(())
}

/// Emits the single `error` event (§7) on the chosen writer before the
/// process exits non-zero.
fn fail(writer: OutWriter, err: &ConfigError) -> anyhow::Error {
    let emitter = Emitter::new(writer);
    let _ = emitter.emit(&OutputEvent::Error(ErrorPayload {
        code: err.code().to_string(),
        message: err.to_string(),
        hint: None,
    }));
    ExitError::new(1, err.to_string()).into()
}

async fn resolve_device(
    resolver: &SimctlTargetResolver,
    query: Option<&str>,
) -> Result<Device, ConfigError> {
    let result = match query {
        Some(q) => resolver.find_by_name_or_udid(q).await,
        None => resolver.find_booted().await,
    };
    result.map_err(|source| {
        error!(%source, "target resolution failed");
        ConfigError::UnknownTarget {
            query: query.unwrap_or("booted").to_string(),
        }
    })
}

/// Assembles `xcrun simctl spawn <udid> log stream ...` from the active
/// config (§4.1, §4.3).
fn producer_args(udid: &str, config: &Config) -> Vec<String> {
    let mut args = vec![
        "simctl".to_string(),
        "spawn".to_string(),
        udid.to_string(),
        "log".to_string(),
        "stream".to_string(),
        "--style".to_string(),
        "ndjson".to_string(),
        "--level".to_string(),
        // `log stream --level` only accepts {debug, info, default}; a
        // coarser floor (error/fault) still asks for `default` upstream and
        // lets the filter chain enforce the real floor (§9 open question:
        // level-to-producer-argument mapping).
        match config.min_level {
            Level::Debug => "debug",
            Level::Info => "info",
            _ => "default",
        }
        .to_string(),
    ];

    if let Some(predicate) = compile_predicate(config) {
        args.push("--predicate".to_string());
        args.push(predicate);
    }
    args
}

fn open_writer(path: Option<&Path>) -> std::io::Result<OutWriter> {
    match path {
        Some(path) => Ok(Box::new(File::create(path)?)),
        None => Ok(Box::new(std::io::stdout())),
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
