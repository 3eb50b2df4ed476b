// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::base_types::{
    bcs_digest, AccountId, Address, BaseToken, Mana, OutputId, SlotIndex, TransactionId,
};
use crate::crypto::{AddressSigner, SignatureUnlock};
use crate::error::{BuildError, CryptoError};
use crate::output::Output;

pub const MAX_OUTPUTS_COUNT: usize = 128;

pub const WORK_SCORE_BLOCK: u64 = 100;
pub const WORK_SCORE_INPUT: u64 = 20;
pub const WORK_SCORE_OUTPUT: u64 = 20;
pub const WORK_SCORE_ALLOTMENT: u64 = 10;
pub const WORK_SCORE_SIGNATURE: u64 = 50;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedData {
    pub tag: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManaAllotment {
    pub account_id: AccountId,
    pub mana: Mana,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub network_id: u64,
    pub creation_slot: SlotIndex,
    pub inputs: Vec<OutputId>,
    pub outputs: Vec<Output>,
    pub allotments: Vec<ManaAllotment>,
    pub payload: Option<TaggedData>,
}

impl Transaction {
    pub fn id(&self) -> TransactionId {
        TransactionId::new(bcs_digest(self))
    }

    pub fn output_id(&self, index: u16) -> OutputId {
        OutputId::new(self.id(), index)
    }

    /// Ids of all outputs created by this transaction, in output order.
    pub fn output_ids(&self) -> Vec<OutputId> {
        let id = self.id();
        (0..self.outputs.len())
            .map(|i| OutputId::new(id, i as u16))
            .collect()
    }

    pub fn work_score(&self) -> u64 {
        work_score(self.inputs.len(), self.outputs.len(), self.allotments.len())
    }
}

fn work_score(inputs: usize, outputs: usize, allotments: usize) -> u64 {
    WORK_SCORE_BLOCK
        + WORK_SCORE_SIGNATURE
        + WORK_SCORE_INPUT * inputs as u64
        + WORK_SCORE_OUTPUT * outputs as u64
        + WORK_SCORE_ALLOTMENT * allotments as u64
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unlock {
    Signature(SignatureUnlock),
    /// Points to an earlier signature unlock for the same address.
    Reference(u16),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub unlocks: Vec<Unlock>,
}

impl SignedTransaction {
    pub fn id(&self) -> TransactionId {
        self.transaction.id()
    }

    /// Check that every input is unlocked by its owner. `inputs` must be the consumed
    /// outputs in input order.
    pub fn verify_unlocks(&self, inputs: &[Output]) -> Result<(), CryptoError> {
        if inputs.len() != self.unlocks.len() {
            return Err(CryptoError::InvalidUnlock(self.unlocks.len()));
        }
        let message = self.id();
        for (i, (input, unlock)) in inputs.iter().zip(&self.unlocks).enumerate() {
            let address = input.unlock_address();
            match unlock {
                Unlock::Signature(sig) => sig.verify(address, message.as_bytes())?,
                Unlock::Reference(r) => {
                    let r = *r as usize;
                    let valid = r < i
                        && matches!(self.unlocks[r], Unlock::Signature(_))
                        && inputs[r].unlock_address() == address;
                    if !valid {
                        return Err(CryptoError::InvalidUnlock(i));
                    }
                }
            }
        }
        Ok(())
    }
}

/// An output to be consumed, together with the address that has to sign for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxInput {
    pub unlock_target: Address,
    pub input_id: OutputId,
    pub input: Output,
}

#[derive(Clone, Debug)]
enum Allotment {
    None,
    All(AccountId),
    MinRequired {
        account_id: AccountId,
        reference_mana_cost: Mana,
        output_index: usize,
    },
}

/// Assembles a transaction from resolved inputs and outputs and signs it.
#[derive(Clone, Debug)]
pub struct TransactionBuilder {
    network_id: u64,
    creation_slot: SlotIndex,
    inputs: Vec<TxInput>,
    outputs: Vec<Output>,
    payload: Option<TaggedData>,
    allotment: Allotment,
}

impl TransactionBuilder {
    pub fn new(network_id: u64) -> Self {
        Self {
            network_id,
            creation_slot: 0,
            inputs: vec![],
            outputs: vec![],
            payload: None,
            allotment: Allotment::None,
        }
    }

    pub fn add_input(&mut self, input: TxInput) -> &mut Self {
        self.inputs.push(input);
        self
    }

    pub fn add_output(&mut self, output: Output) -> &mut Self {
        self.outputs.push(output);
        self
    }

    pub fn add_tagged_data_payload(&mut self, payload: TaggedData) -> &mut Self {
        self.payload = Some(payload);
        self
    }

    pub fn set_creation_slot(&mut self, slot: SlotIndex) -> &mut Self {
        self.creation_slot = slot;
        self
    }

    /// Allot all mana not held by outputs to `account_id`.
    pub fn allot_all_mana(&mut self, account_id: AccountId) -> &mut Self {
        self.allotment = Allotment::All(account_id);
        self
    }

    /// Allot only the mana needed to issue the transaction at `reference_mana_cost` and
    /// keep what is left in the output at `output_index`.
    pub fn allot_min_required_mana_and_store_remaining_mana_in_output(
        &mut self,
        account_id: AccountId,
        reference_mana_cost: Mana,
        output_index: usize,
    ) -> &mut Self {
        self.allotment = Allotment::MinRequired {
            account_id,
            reference_mana_cost,
            output_index,
        };
        self
    }

    pub fn build(mut self, signer: &impl AddressSigner) -> Result<SignedTransaction, BuildError> {
        if self.inputs.is_empty() {
            return Err(BuildError::NoInputs);
        }
        if self.outputs.is_empty() {
            return Err(BuildError::NoOutputs);
        }
        if self.outputs.len() > MAX_OUTPUTS_COUNT {
            return Err(BuildError::TooManyOutputs(self.outputs.len()));
        }

        let input_amount: BaseToken = self.inputs.iter().map(|i| i.input.amount()).sum();
        let output_amount: BaseToken = self.outputs.iter().map(Output::amount).sum();
        if input_amount != output_amount {
            return Err(BuildError::UnbalancedTokens {
                inputs: input_amount,
                outputs: output_amount,
            });
        }

        let allotments = self.allot_mana()?;

        let transaction = Transaction {
            network_id: self.network_id,
            creation_slot: self.creation_slot,
            inputs: self.inputs.iter().map(|i| i.input_id).collect(),
            outputs: self.outputs,
            allotments,
            payload: self.payload,
        };

        let message = transaction.id();
        let mut signed_at: HashMap<Address, u16> = HashMap::new();
        let mut unlocks = Vec::with_capacity(self.inputs.len());
        for (index, input) in self.inputs.iter().enumerate() {
            match signed_at.get(&input.unlock_target) {
                Some(reference) => unlocks.push(Unlock::Reference(*reference)),
                None => {
                    let signature = signer.sign_for(&input.unlock_target, message.as_bytes())?;
                    signed_at.insert(input.unlock_target, index as u16);
                    unlocks.push(Unlock::Signature(signature));
                }
            }
        }

        Ok(SignedTransaction {
            transaction,
            unlocks,
        })
    }

    fn allot_mana(&mut self) -> Result<Vec<ManaAllotment>, BuildError> {
        let available: Mana = self.inputs.iter().map(|i| i.input.mana()).sum();
        let stored: Mana = self.outputs.iter().map(Output::mana).sum();
        if stored > available {
            return Err(BuildError::InsufficientMana {
                available,
                required: stored,
            });
        }
        let free = available - stored;

        match self.allotment.clone() {
            Allotment::None => Ok(vec![]),
            Allotment::All(account_id) => Ok(vec![ManaAllotment {
                account_id,
                mana: free,
            }]),
            Allotment::MinRequired {
                account_id,
                reference_mana_cost,
                output_index,
            } => {
                let required =
                    reference_mana_cost * work_score(self.inputs.len(), self.outputs.len(), 1);
                if required > free {
                    return Err(BuildError::InsufficientMana {
                        available: free,
                        required,
                    });
                }
                let output = self
                    .outputs
                    .get_mut(output_index)
                    .ok_or(BuildError::InvalidManaOutput(output_index))?;
                output.add_mana(free - required);
                Ok(vec![ManaAllotment {
                    account_id,
                    mana: required,
                }])
            }
        }
    }
}
