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

#![warn(missing_docs)]
//! # Tally Relayer
//!
//! The confidential-vote decryption relayer: watches on-chain encrypted
//! vote aggregates, coordinates with the decryption gateway, and writes
//! recovered plaintexts back on-chain, all under the relayer's own key.
//! End users never sign anything for this flow.

/// The decryption coordinator state machine.
pub mod coordinator;
/// The watch-list poll scheduler and the vote-event stream.
pub mod poller;
/// The relayer service object exposed to the host application.
pub mod relayer;
/// The HTTP monitor API.
pub mod routes;

pub use coordinator::{DecryptionCoordinator, Outcome, SkipReason, TargetStatus};
pub use relayer::TallyRelayer;
