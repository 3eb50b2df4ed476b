// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::base_types::{Address, BaseToken, Mana};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid hex: {0}")]
    Hex(String),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("signature does not belong to address {0}")]
    AddressMismatch(Address),

    #[error("invalid unlock for input {0}")]
    InvalidUnlock(usize),
}

/// Errors raised while assembling and signing a transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("transaction has no inputs")]
    NoInputs,

    #[error("transaction has no outputs")]
    NoOutputs,

    #[error("too many outputs: {0}")]
    TooManyOutputs(usize),

    #[error("base token amounts do not balance: inputs {inputs}, outputs {outputs}")]
    UnbalancedTokens {
        inputs: BaseToken,
        outputs: BaseToken,
    },

    #[error("not enough mana: available {available}, required {required}")]
    InsufficientMana { available: Mana, required: Mana },

    #[error("output index {0} can not store mana")]
    InvalidManaOutput(usize),

    #[error("no signing key for address {0}")]
    MissingKey(Address),
}
