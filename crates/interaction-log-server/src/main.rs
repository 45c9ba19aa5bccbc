// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, io, process::ExitCode, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use interaction_log::{
    analyze::{self, AnalyzePaths},
    config::{Config, Mode},
    ingest::IngestServer,
    storage::FileLogStore,
};

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("ILOG_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match Config::new() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match config.mode {
        Mode::Server => run_server(config).await,
        Mode::Analyze => run_analyzer(&config),
    }
}

async fn run_server(config: Arc<Config>) -> ExitCode {
    let store = match FileLogStore::open(&config.logs_path, &config.local_storage_logs_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Error opening log files on ingestion server startup: {e}");
            return ExitCode::FAILURE;
        }
    };

    let server = IngestServer {
        config: Arc::clone(&config),
        sink: store,
    };

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown_token.cancel();
    });

    let res = server.start(cancel_token).await;
    // dropping the server releases the store, which closes both log files
    drop(server);
    match res {
        Ok(()) => {
            info!("Closed log files");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error when running ingestion server: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run_analyzer(config: &Config) -> ExitCode {
    debug!("Starting log analysis");
    let count = match analyze::run(AnalyzePaths {
        json: &config.local_storage_path,
        json_lines: &config.logs_path,
        json_lines_array: &config.local_storage_logs_path,
    }) {
        Ok(count) => count,
        Err(e) => {
            error!("Error analyzing logs: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = analyze::write_csv(&count, io::stdout().lock()) {
        error!("Error writing analysis output: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                error!("Unable to listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
