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

//! The HTTP monitor API: the surface an operational dashboard polls.
//! Read-mostly; the two POST routes drive the same coordinator entry
//! points the scheduler uses.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use ethers::types::Address;
use serde::Serialize;

use tally_relayer_monitor::{LogEntry, RelayerState};
use tally_relayer_utils::HandlerError;

use crate::coordinator::{Outcome, TargetStatus};
use crate::relayer::TallyRelayer;

/// Builds the monitor API router.
pub fn build_routes(relayer: Arc<TallyRelayer>) -> Router {
    Router::new()
        .route("/api/v1/info", get(handle_relayer_info))
        .route("/api/v1/state", get(handle_state))
        .route("/api/v1/logs", get(handle_logs))
        .route("/api/v1/targets/:uuid", get(handle_target_status))
        .route("/api/v1/targets/:uuid/decrypt", post(handle_check_and_decrypt))
        .route("/api/v1/targets/:uuid/decrypt-fast", post(handle_decrypt_fast))
        .route("/metrics", get(handle_metrics))
        .with_state(relayer)
}

/// Handles relayer configuration requests.
async fn handle_relayer_info(
    State(relayer): State<Arc<TallyRelayer>>,
) -> Json<RelayerInfoResponse> {
    let config = &relayer.context().config;
    Json(RelayerInfoResponse {
        address: relayer.address(),
        chain: config.evm.name.clone(),
        chain_id: config.evm.chain_id,
        vault: config.evm.vault.address,
        acl: config.evm.acl.address,
        poll_interval_ms: config.poller.interval_ms,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayerInfoResponse {
    address: Address,
    chain: String,
    chain_id: u32,
    vault: Address,
    acl: Address,
    poll_interval_ms: u64,
}

/// Returns the operational state snapshot the dashboard polls.
async fn handle_state(
    State(relayer): State<Arc<TallyRelayer>>,
) -> Json<RelayerState> {
    Json(relayer.state())
}

/// Returns only the bounded log, most recent last.
async fn handle_logs(
    State(relayer): State<Arc<TallyRelayer>>,
) -> Json<Vec<LogEntry>> {
    Json(relayer.state().logs)
}

/// Reads one target's status.
async fn handle_target_status(
    State(relayer): State<Arc<TallyRelayer>>,
    Path(uuid): Path<String>,
) -> Result<Json<TargetStatus>, HandlerError> {
    let status = relayer.check_target(&uuid).await?;
    Ok(Json(status))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckAndDecryptResponse {
    status: TargetStatus,
    #[serde(flatten)]
    outcome: Outcome,
}

/// The manual "check now" action: decrypts only if votes are pending.
async fn handle_check_and_decrypt(
    State(relayer): State<Arc<TallyRelayer>>,
    Path(uuid): Path<String>,
) -> Result<Json<CheckAndDecryptResponse>, HandlerError> {
    let (status, outcome) = relayer.check_and_decrypt(&uuid).await?;
    Ok(Json(CheckAndDecryptResponse { status, outcome }))
}

/// Fast-only decryption; 409 when the ACL does not allow it yet.
async fn handle_decrypt_fast(
    State(relayer): State<Arc<TallyRelayer>>,
    Path(uuid): Path<String>,
) -> Result<Json<Outcome>, HandlerError> {
    let outcome = relayer.decrypt_fast(&uuid).await?;
    Ok(Json(outcome))
}

/// Prometheus text-format scrape endpoint.
async fn handle_metrics(
    State(relayer): State<Arc<TallyRelayer>>,
) -> Result<String, HandlerError> {
    let text = relayer
        .context()
        .metrics
        .gather()
        .map_err(tally_relayer_utils::Error::from)?;
    Ok(text)
}
