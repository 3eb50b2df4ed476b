// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::api::{BlockIssuanceResponse, ProtocolParameters};
use crate::base_types::{bcs_digest, AccountId, BlockId, Mana, SlotIndex};
use crate::crypto::{KeyPair, SignatureUnlock};
use crate::error::CryptoError;
use crate::transaction::{SignedTransaction, TaggedData};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockPayload {
    TaggedData(TaggedData),
    SignedTransaction(Box<SignedTransaction>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub network_id: u64,
    /// Unix time in nanoseconds.
    pub issuing_time: u64,
    pub slot_commitment_id: BlockId,
    pub latest_finalized_slot: SlotIndex,
    pub issuer_id: AccountId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicBlockBody {
    pub strong_parents: Vec<BlockId>,
    pub weak_parents: Vec<BlockId>,
    pub shallow_like_parents: Vec<BlockId>,
    pub payload: Option<BlockPayload>,
    pub max_burned_mana: Mana,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub body: BasicBlockBody,
    pub signature: SignatureUnlock,
}

impl Block {
    pub fn id(&self) -> BlockId {
        block_id(&self.header, &self.body)
    }

    pub fn slot(&self, params: &ProtocolParameters) -> SlotIndex {
        params.slot_from_unix_nanos(self.header.issuing_time)
    }

    pub fn signed_transaction(&self) -> Option<&SignedTransaction> {
        match &self.body.payload {
            Some(BlockPayload::SignedTransaction(tx)) => Some(tx),
            _ => None,
        }
    }

    pub fn verify_signature(&self) -> Result<(), CryptoError> {
        self.signature
            .public_key
            .verify(self.id().as_bytes(), &self.signature.signature)
    }
}

fn block_id(header: &BlockHeader, body: &BasicBlockBody) -> BlockId {
    BlockId::new(bcs_digest(&(header, body)))
}

/// The account blocks are issued for, with the key that signs them.
#[derive(Clone, Debug)]
pub struct BlockIssuer {
    pub account_id: AccountId,
    keys: KeyPair,
}

impl BlockIssuer {
    pub fn new(account_id: AccountId, keys: KeyPair) -> Self {
        Self { account_id, keys }
    }

    /// Build a block on top of the parents and commitment in `issuance` and sign it.
    pub fn issue(
        &self,
        params: &ProtocolParameters,
        issuance: &BlockIssuanceResponse,
        payload: Option<BlockPayload>,
        max_burned_mana: Mana,
    ) -> Block {
        let issuing_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let header = BlockHeader {
            network_id: params.network_id,
            issuing_time,
            slot_commitment_id: issuance.latest_commitment.commitment_id,
            latest_finalized_slot: issuance.latest_finalized_slot,
            issuer_id: self.account_id,
        };
        let body = BasicBlockBody {
            strong_parents: issuance.strong_parents.clone(),
            weak_parents: issuance.weak_parents.clone(),
            shallow_like_parents: issuance.shallow_like_parents.clone(),
            payload,
            max_burned_mana,
        };
        let signature = self.keys.sign(block_id(&header, &body).as_bytes());
        Block {
            header,
            body,
            signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Commitment;

    #[test]
    fn issued_block_is_signed_by_issuer() {
        let issuer = BlockIssuer::new(AccountId::random(), KeyPair::generate());
        let issuance = BlockIssuanceResponse {
            strong_parents: vec![BlockId::random()],
            weak_parents: vec![],
            shallow_like_parents: vec![],
            latest_commitment: Commitment {
                slot: 3,
                commitment_id: BlockId::random(),
                reference_mana_cost: 1,
            },
            latest_finalized_slot: 2,
        };
        let payload = BlockPayload::TaggedData(TaggedData {
            tag: b"tag".to_vec(),
            data: vec![],
        });
        let block = issuer.issue(&ProtocolParameters::default(), &issuance, Some(payload), 0);
        block.verify_signature().unwrap();
        assert_eq!(block.header.issuer_id, issuer.account_id);
        assert_eq!(block.body.strong_parents, issuance.strong_parents);
        assert!(block.signed_transaction().is_none());
    }
}
