// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use thiserror::Error;

use evil_sdk::ClientError;
use evil_types::{Address, BaseToken, BlockId, BuildError, OutputId, TransactionId};

use crate::wallet::WalletId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("no fresh outputs available, request more faucet funds")]
    NoFreshOutputsAvailable,

    #[error("wallet {0} has no unspent outputs left")]
    NoUnspentOutput(WalletId),

    #[error("alias count {aliases} does not match output count {outputs}")]
    AliasLengthMismatch { aliases: usize, outputs: usize },

    #[error("no inputs or no outputs provided")]
    NoInputsOrOutputs,

    #[error("can not provide both explicit inputs and input aliases")]
    MixedInputs,

    #[error("can not provide both explicit outputs and output aliases")]
    MixedOutputs,

    #[error("explicit inputs require an input wallet")]
    MissingInputWallet,

    #[error("explicit outputs require an output wallet")]
    MissingOutputWallet,

    #[error("insufficient balance: inputs hold {available}, outputs need {required}")]
    InsufficientBalance {
        available: BaseToken,
        required: BaseToken,
    },

    #[error("no wallet owns output {0}")]
    UnknownOutput(OutputId),

    #[error("no funded output found for address {0}")]
    FaucetOutputNotFound(Address),

    #[error("{0} inputs are not solid on the target node")]
    InputsNotSolid(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Acceptance(#[from] AcceptanceError),
}

/// Outcome of waiting for a block, transaction or output to be accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcceptanceError {
    #[error("block {block_id} failed: {reason}")]
    BlockFailed { block_id: BlockId, reason: String },

    #[error("transaction {transaction_id} failed: {reason}")]
    TransactionFailed {
        transaction_id: TransactionId,
        reason: String,
    },

    #[error("{item} not accepted within {timeout:?}")]
    Timeout { item: String, timeout: Duration },

    #[error("cannot query acceptance: {0}")]
    Client(ClientError),
}
