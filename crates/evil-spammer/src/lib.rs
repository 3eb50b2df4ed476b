// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Rate-limited spam of blocks, transactions and conflict scenarios.

pub mod config;
pub mod errors;
pub mod metrics;
pub mod spammer;
pub mod spamming_functions;

pub use config::{SpamType, SpammerConfig};
pub use errors::{ErrorCounter, SpamError, SpamErrorKind};
pub use metrics::SpammerMetrics;
pub use spammer::{Schedule, SpamSummary, Spammer, StopReason};
pub use spamming_functions::{DataSpam, ScenarioSpam, SpamFunction};
