// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::fmt::Write as _;

use parking_lot::Mutex;
use strum_macros::{Display, EnumDiscriminants};
use thiserror::Error;

use evil_sdk::ClientError;
use evil_wallet::{AcceptanceError, WalletError};

#[derive(Error, Debug, EnumDiscriminants)]
#[strum_discriminants(name(SpamErrorKind), derive(Display, Hash, PartialOrd, Ord))]
pub enum SpamError {
    #[error("no fresh outputs available")]
    NoFreshOutputs,

    #[error("scenario needs {needed} clients, only {available} connected")]
    InsufficientClients { needed: usize, available: usize },

    #[error("failed to build transaction: {0}")]
    Build(WalletError),

    #[error("client error: {0}")]
    Client(ClientError),

    #[error("{0} inputs not solid on the target node")]
    InputsNotSolid(usize),

    #[error("{0}")]
    BlockFailed(AcceptanceError),

    #[error("{0}")]
    TransactionFailed(AcceptanceError),

    #[error("{0}")]
    AcceptanceTimeout(AcceptanceError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SpamError {
    /// Running out of funds is the only error that stops a spam run.
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, SpamError::NoFreshOutputs)
    }
}

impl From<AcceptanceError> for SpamError {
    fn from(e: AcceptanceError) -> Self {
        match e {
            AcceptanceError::BlockFailed { .. } => SpamError::BlockFailed(e),
            AcceptanceError::TransactionFailed { .. } => SpamError::TransactionFailed(e),
            AcceptanceError::Timeout { .. } => SpamError::AcceptanceTimeout(e),
            AcceptanceError::Client(e) => SpamError::Client(e),
        }
    }
}

impl From<ClientError> for SpamError {
    fn from(e: ClientError) -> Self {
        SpamError::Client(e)
    }
}

impl From<WalletError> for SpamError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::NoFreshOutputsAvailable => SpamError::NoFreshOutputs,
            WalletError::InputsNotSolid(missing) => SpamError::InputsNotSolid(missing),
            WalletError::Client(e) => SpamError::Client(e),
            WalletError::Acceptance(e) => e.into(),
            WalletError::InvalidConfig(e) => SpamError::InvalidConfig(e),
            e => SpamError::Build(e),
        }
    }
}

/// Tally of spam errors by kind.
#[derive(Default)]
pub struct ErrorCounter {
    counts: Mutex<BTreeMap<SpamErrorKind, u64>>,
}

impl ErrorCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_error(&self, error: &SpamError) {
        *self.counts.lock().entry(error.into()).or_default() += 1;
    }

    pub fn get(&self, kind: SpamErrorKind) -> u64 {
        self.counts.lock().get(&kind).copied().unwrap_or_default()
    }

    pub fn total(&self) -> u64 {
        self.counts.lock().values().sum()
    }

    pub fn snapshot(&self) -> BTreeMap<SpamErrorKind, u64> {
        self.counts.lock().clone()
    }

    pub fn get_errors_summary(&self) -> String {
        errors_summary(&self.counts.lock())
    }
}

pub(crate) fn errors_summary(counts: &BTreeMap<SpamErrorKind, u64>) -> String {
    if counts.is_empty() {
        return "No errors encountered".to_string();
    }
    let mut summary = String::from("Errors encountered during spam:\n");
    for (kind, count) in counts {
        let _ = writeln!(summary, "{kind}: {count}");
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn wallet_errors_map_to_kinds() {
        let kind = |e: WalletError| SpamErrorKind::from(SpamError::from(e));
        assert_eq!(
            kind(WalletError::NoFreshOutputsAvailable),
            SpamErrorKind::NoFreshOutputs
        );
        assert_eq!(kind(WalletError::InputsNotSolid(2)), SpamErrorKind::InputsNotSolid);
        assert_eq!(kind(WalletError::MixedInputs), SpamErrorKind::Build);
        assert_eq!(
            kind(WalletError::Acceptance(AcceptanceError::Timeout {
                item: "transaction".into(),
                timeout: Duration::from_secs(1),
            })),
            SpamErrorKind::AcceptanceTimeout
        );
        assert_eq!(
            kind(WalletError::Acceptance(AcceptanceError::Client(
                ClientError::NoClients
            ))),
            SpamErrorKind::Client
        );
        assert!(SpamError::from(WalletError::NoFreshOutputsAvailable).is_exhaustion());
    }

    #[test]
    fn summary_lists_counts_by_kind() {
        let counter = ErrorCounter::new();
        assert_eq!(counter.get_errors_summary(), "No errors encountered");

        counter.count_error(&SpamError::InputsNotSolid(1));
        counter.count_error(&SpamError::InputsNotSolid(3));
        counter.count_error(&SpamError::NoFreshOutputs);
        assert_eq!(counter.get(SpamErrorKind::InputsNotSolid), 2);
        assert_eq!(counter.total(), 3);
        assert_eq!(
            counter.get_errors_summary(),
            "Errors encountered during spam:\nNoFreshOutputs: 1\nInputsNotSolid: 2\n"
        );
    }
}
