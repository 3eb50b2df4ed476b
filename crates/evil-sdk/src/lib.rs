// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

pub mod client;
pub mod connector;
pub mod http_client;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use client::{Client, ClientError};
pub use connector::Connector;
pub use http_client::HttpClient;
