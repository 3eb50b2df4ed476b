// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Ledger types used by the evil tools: identifiers, outputs, transactions, blocks,
//! key derivation and the transaction builder.

pub mod api;
pub mod base_types;
pub mod block;
pub mod crypto;
pub mod error;
pub mod output;
pub mod transaction;

pub use base_types::{
    AccountId, Address, BaseToken, BlockId, Mana, OutputId, SlotIndex, TransactionId,
};
pub use error::{BuildError, CryptoError, ParseError};
pub use output::{Output, OutputType};
