// Copyright 2024 Tally Labs Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tally Relayer Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal::unix;

use tally_relayer::routes::build_routes;
use tally_relayer::TallyRelayer;
use tally_relayer_config::cli::{load_config, setup_logger, Opts};
use tally_relayer_context::RelayerContext;

/// The main entry point for the relayer.
///
/// # Arguments
///
/// * `args` - The command line arguments.
#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    setup_logger(args.verbose, "tally_relayer")?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    // The configuration is validated and loaded from the given directory.
    let config = load_config(args.config_dir.clone())?;

    // The RelayerContext takes a configuration, and populates objects
    // that are needed throughout the lifetime of the relayer.
    let ctx = RelayerContext::new(config)?;
    let relayer = Arc::new(TallyRelayer::new(ctx.clone())?);
    tracing::info!("Relayer address: {:?}", relayer.address());

    // the monitor HTTP API, so dashboards can watch the relayer.
    let app = build_routes(relayer.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], ctx.config.port));
    tracing::info!("Starting the monitor API on {}", addr);
    let mut server_shutdown = ctx.shutdown_signal();
    let server = axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move { server_shutdown.recv().await });
    let server_handle = tokio::spawn(server);

    // start polling the configured watch-list.
    relayer.start_watching(None);
    tracing::event!(
        target: tally_relayer_utils::probe::TARGET,
        tracing::Level::DEBUG,
        kind = %tally_relayer_utils::probe::Kind::Lifecycle,
        started = true
    );

    // watch for signals
    let mut ctrlc_signal = unix::signal(unix::SignalKind::interrupt())?;
    let mut termination_signal = unix::signal(unix::SignalKind::terminate())?;
    let mut quit_signal = unix::signal(unix::SignalKind::quit())?;
    let shutdown = || {
        tracing::event!(
            target: tally_relayer_utils::probe::TARGET,
            tracing::Level::DEBUG,
            kind = %tally_relayer_utils::probe::Kind::Lifecycle,
            shutdown = true
        );
        tracing::warn!("Shutting down...");
        // stop the scheduler and detach the event stream,
        relayer.stop_watching();
        // then send the shutdown signal to everything else.
        ctx.shutdown();
        server_handle.abort();
        std::thread::sleep(std::time::Duration::from_millis(300));
        tracing::info!("Clean Exit ..");
    };
    tokio::select! {
        _ = ctrlc_signal.recv() => {
            tracing::warn!("Interrupted (Ctrl+C) ...");
            shutdown();
        },
        _ = termination_signal.recv() => {
            tracing::warn!("Got Terminate signal ...");
            shutdown();
        },
        _ = quit_signal.recv() => {
            tracing::warn!("Quitting ...");
            shutdown();
        },
    }
    Ok(())
}
