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
//! Configuration leaf types that know how to read themselves from the
//! environment, so secrets and endpoints never have to live in config
//! files verbatim.

/// The relayer signing key.
pub mod private_key;
/// RPC and gateway URLs.
pub mod rpc_url;

pub use private_key::PrivateKey;
pub use rpc_url::RpcUrl;
