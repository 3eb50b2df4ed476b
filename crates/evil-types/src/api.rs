// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Node API payloads: protocol parameters, issuance data and acceptance states.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::base_types::{BlockId, Mana, OutputId, SlotIndex, TransactionId};
use crate::output::Output;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolParameters {
    pub network_name: String,
    pub network_id: u64,
    /// Unix time in seconds of the start of slot 1.
    pub genesis_unix_timestamp: u64,
    pub slot_duration_in_seconds: u64,
    pub token_supply: u64,
}

impl Default for ProtocolParameters {
    fn default() -> Self {
        Self {
            network_name: "testnet".to_string(),
            network_id: 1,
            genesis_unix_timestamp: 1_700_000_000,
            slot_duration_in_seconds: 10,
            token_supply: 1_813_620_509_061_365,
        }
    }
}

impl ProtocolParameters {
    pub fn slot_from_time(&self, time: SystemTime) -> SlotIndex {
        let nanos = time
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        self.slot_from_unix_nanos(nanos)
    }

    pub fn slot_from_unix_nanos(&self, nanos: u64) -> SlotIndex {
        let genesis = Duration::from_secs(self.genesis_unix_timestamp).as_nanos() as u64;
        if nanos < genesis || self.slot_duration_in_seconds == 0 {
            return 0;
        }
        let slot_nanos = Duration::from_secs(self.slot_duration_in_seconds).as_nanos() as u64;
        ((nanos - genesis) / slot_nanos + 1) as SlotIndex
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commitment {
    pub slot: SlotIndex,
    pub commitment_id: BlockId,
    pub reference_mana_cost: Mana,
}

/// Everything needed to attach a new block to the tangle of a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockIssuanceResponse {
    pub strong_parents: Vec<BlockId>,
    pub weak_parents: Vec<BlockId>,
    pub shallow_like_parents: Vec<BlockId>,
    pub latest_commitment: Commitment,
    pub latest_finalized_slot: SlotIndex,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CongestionResponse {
    pub slot: SlotIndex,
    pub ready: bool,
    pub reference_mana_cost: Mana,
    pub block_issuance_credits: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BlockState {
    Pending,
    Accepted,
    Confirmed,
    Finalized,
    Rejected,
    Failed,
}

impl BlockState {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted | Self::Confirmed | Self::Finalized)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Rejected | Self::Failed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionState {
    Pending,
    Accepted,
    Committed,
    Finalized,
    Failed,
}

impl TransactionState {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted | Self::Committed | Self::Finalized)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMetadata {
    pub block_id: BlockId,
    pub block_state: BlockState,
    pub failure_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMetadata {
    pub transaction_id: TransactionId,
    pub transaction_state: TransactionState,
    pub earliest_attachment_slot: SlotIndex,
    pub failure_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMetadata {
    pub output_id: OutputId,
    pub block_id: BlockId,
    pub included_slot: SlotIndex,
    pub is_spent: bool,
}

/// An output as returned by the node together with its metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputWithMetadata {
    pub output: Output,
    pub metadata: OutputMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_from_time() {
        let params = ProtocolParameters::default();
        let genesis = UNIX_EPOCH + Duration::from_secs(params.genesis_unix_timestamp);
        assert_eq!(params.slot_from_time(genesis - Duration::from_secs(1)), 0);
        assert_eq!(params.slot_from_time(genesis), 1);
        assert_eq!(params.slot_from_time(genesis + Duration::from_secs(25)), 3);
    }

    #[test]
    fn accepted_states() {
        assert!(TransactionState::Committed.is_accepted());
        assert!(!TransactionState::Pending.is_accepted());
        assert!(BlockState::Rejected.is_failed());
        assert_eq!(
            serde_json::to_string(&TransactionState::Finalized).unwrap(),
            "\"finalized\""
        );
    }
}
