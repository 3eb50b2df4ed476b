// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory ledger and client for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use evil_types::api::{
    BlockIssuanceResponse, BlockMetadata, BlockState, Commitment, CongestionResponse,
    OutputMetadata, ProtocolParameters, TransactionMetadata, TransactionState,
};
use evil_types::block::Block;
use evil_types::{AccountId, Address, BaseToken, BlockId, Mana, Output, OutputId, TransactionId};

use crate::client::{Client, ClientError};

pub const DEFAULT_FAUCET_AMOUNT: BaseToken = 1_200_000;
pub const DEFAULT_FAUCET_MANA: Mana = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    PostBlock,
    GetOutput,
    GetOutputMetadata,
    GetBlockMetadata,
    GetTransactionMetadata,
    GetBlockIssuance,
    GetCongestion,
    RequestFaucetFunds,
    OutputsByAddress,
}

#[derive(Default)]
struct LedgerState {
    outputs: HashMap<OutputId, (Output, BlockId)>,
    /// Inputs consumed by accepted transactions, with the spender.
    spent: HashMap<OutputId, TransactionId>,
    transactions: HashMap<TransactionId, TransactionMetadata>,
    pending: HashSet<TransactionId>,
    transaction_inputs: HashMap<TransactionId, Vec<OutputId>>,
    blocks: HashMap<BlockId, BlockMetadata>,
    tips: Vec<BlockId>,
}

/// A single-node ledger kept in memory.
///
/// Every valid transaction is booked and its outputs become visible immediately, the way
/// a node books conflicting transactions before resolving them. Only the first spender of
/// an output is accepted; later spenders fail as conflicting.
pub struct MockLedger {
    params: ProtocolParameters,
    state: Mutex<LedgerState>,
    auto_accept: AtomicBool,
    faucet_amount: BaseToken,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new(DEFAULT_FAUCET_AMOUNT)
    }
}

impl MockLedger {
    pub fn new(faucet_amount: BaseToken) -> Self {
        Self {
            params: ProtocolParameters::default(),
            state: Mutex::new(LedgerState::default()),
            auto_accept: AtomicBool::new(true),
            faucet_amount,
        }
    }

    /// When disabled, transactions stay pending until [MockLedger::accept_pending].
    pub fn set_auto_accept(&self, auto_accept: bool) {
        self.auto_accept.store(auto_accept, Ordering::SeqCst);
    }

    pub fn accept_pending(&self) {
        let mut state = self.state.lock();
        let pending: Vec<_> = state.pending.drain().collect();
        for tx_id in pending {
            Self::resolve(&mut state, tx_id);
        }
    }

    /// Create an output for `address` out of thin air.
    pub fn fund(&self, address: Address, amount: BaseToken, mana: Mana) -> OutputId {
        let mut output = Output::new_basic(address, amount);
        output.add_mana(mana);
        let output_id = OutputId::new(TransactionId::random(), 0);
        self.state
            .lock()
            .outputs
            .insert(output_id, (output, BlockId::random()));
        output_id
    }

    pub fn transaction_state(&self, tx_id: &TransactionId) -> Option<TransactionState> {
        self.state
            .lock()
            .transactions
            .get(tx_id)
            .map(|m| m.transaction_state)
    }

    pub fn transaction_inputs(&self, tx_id: &TransactionId) -> Vec<OutputId> {
        self.state
            .lock()
            .transaction_inputs
            .get(tx_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn transaction_ids(&self) -> Vec<TransactionId> {
        self.state.lock().transactions.keys().copied().collect()
    }

    pub fn is_spent(&self, output_id: &OutputId) -> bool {
        self.state.lock().spent.contains_key(output_id)
    }

    fn book(&self, block: &Block) -> Result<BlockId, String> {
        block
            .verify_signature()
            .map_err(|e| format!("invalid block signature: {e}"))?;
        let block_id = block.id();
        let mut state = self.state.lock();

        if let Some(signed) = block.signed_transaction() {
            let tx = &signed.transaction;
            let tx_id = signed.id();
            let consumed = tx
                .inputs
                .iter()
                .map(|id| {
                    state
                        .outputs
                        .get(id)
                        .map(|(o, _)| o.clone())
                        .ok_or_else(|| format!("input {id} not found"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            signed
                .verify_unlocks(&consumed)
                .map_err(|e| format!("invalid unlocks: {e}"))?;
            let input_amount: BaseToken = consumed.iter().map(Output::amount).sum();
            let output_amount: BaseToken = tx.outputs.iter().map(Output::amount).sum();
            if input_amount != output_amount {
                return Err(format!(
                    "unbalanced transaction: inputs {input_amount}, outputs {output_amount}"
                ));
            }

            for (index, output) in tx.outputs.iter().enumerate() {
                state
                    .outputs
                    .insert(OutputId::new(tx_id, index as u16), (output.clone(), block_id));
            }
            state.transaction_inputs.insert(tx_id, tx.inputs.clone());
            state.transactions.insert(
                tx_id,
                TransactionMetadata {
                    transaction_id: tx_id,
                    transaction_state: TransactionState::Pending,
                    earliest_attachment_slot: block.slot(&self.params),
                    failure_reason: None,
                },
            );
            if self.auto_accept.load(Ordering::SeqCst) {
                Self::resolve(&mut state, tx_id);
            } else {
                state.pending.insert(tx_id);
            }
        }

        state.blocks.insert(
            block_id,
            BlockMetadata {
                block_id,
                block_state: BlockState::Accepted,
                failure_reason: None,
            },
        );
        state.tips = vec![block_id];
        Ok(block_id)
    }

    fn resolve(state: &mut LedgerState, tx_id: TransactionId) {
        let inputs = state
            .transaction_inputs
            .get(&tx_id)
            .cloned()
            .unwrap_or_default();
        let conflicting = inputs.iter().any(|i| state.spent.contains_key(i));
        let (transaction_state, failure_reason) = if conflicting {
            (TransactionState::Failed, Some("conflicting input".to_string()))
        } else {
            for input in inputs {
                state.spent.insert(input, tx_id);
            }
            (TransactionState::Accepted, None)
        };
        if let Some(metadata) = state.transactions.get_mut(&tx_id) {
            metadata.transaction_state = transaction_state;
            metadata.failure_reason = failure_reason;
        }
    }
}

/// A [Client] backed by a shared [MockLedger], with call counters and scripted failures.
pub struct MockClient {
    url: String,
    ledger: Arc<MockLedger>,
    calls: Mutex<HashMap<Operation, usize>>,
    failing_posts: AtomicUsize,
    latency: Mutex<Option<Duration>>,
}

impl MockClient {
    pub fn new(url: impl Into<String>, ledger: Arc<MockLedger>) -> Self {
        Self {
            url: url.into(),
            ledger,
            calls: Mutex::new(HashMap::new()),
            failing_posts: AtomicUsize::new(0),
            latency: Mutex::new(None),
        }
    }

    pub fn ledger(&self) -> &Arc<MockLedger> {
        &self.ledger
    }

    pub fn calls(&self, operation: Operation) -> usize {
        self.calls.lock().get(&operation).copied().unwrap_or_default()
    }

    /// Make the next `n` block posts fail with a server error.
    pub fn fail_next_posts(&self, n: usize) {
        self.failing_posts.store(n, Ordering::SeqCst);
    }

    /// Delay every block post by `latency`.
    pub fn set_post_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    fn record(&self, operation: Operation) {
        *self.calls.lock().entry(operation).or_default() += 1;
    }

    fn status(&self, message: String) -> ClientError {
        ClientError::Status {
            url: self.url.clone(),
            status: 400,
            message,
        }
    }
}

#[async_trait]
impl Client for MockClient {
    fn url(&self) -> &str {
        &self.url
    }

    async fn protocol_parameters(&self) -> Result<ProtocolParameters, ClientError> {
        Ok(self.ledger.params.clone())
    }

    async fn post_block(&self, block: &Block) -> Result<BlockId, ClientError> {
        self.record(Operation::PostBlock);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let scripted_failure = self
            .failing_posts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure {
            return Err(ClientError::Status {
                url: self.url.clone(),
                status: 500,
                message: "scripted failure".to_string(),
            });
        }
        self.ledger.book(block).map_err(|e| self.status(e))
    }

    async fn get_output(&self, output_id: &OutputId) -> Result<Output, ClientError> {
        self.record(Operation::GetOutput);
        self.ledger
            .state
            .lock()
            .outputs
            .get(output_id)
            .map(|(o, _)| o.clone())
            .ok_or_else(|| ClientError::NotFound(format!("output {output_id}")))
    }

    async fn get_output_metadata(
        &self,
        output_id: &OutputId,
    ) -> Result<OutputMetadata, ClientError> {
        self.record(Operation::GetOutputMetadata);
        let state = self.ledger.state.lock();
        let (_, block_id) = state
            .outputs
            .get(output_id)
            .ok_or_else(|| ClientError::NotFound(format!("output {output_id}")))?;
        Ok(OutputMetadata {
            output_id: *output_id,
            block_id: *block_id,
            included_slot: 1,
            is_spent: state.spent.contains_key(output_id),
        })
    }

    async fn get_block_metadata(&self, block_id: &BlockId) -> Result<BlockMetadata, ClientError> {
        self.record(Operation::GetBlockMetadata);
        self.ledger
            .state
            .lock()
            .blocks
            .get(block_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("block {block_id}")))
    }

    async fn get_transaction_metadata(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<TransactionMetadata, ClientError> {
        self.record(Operation::GetTransactionMetadata);
        self.ledger
            .state
            .lock()
            .transactions
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("transaction {transaction_id}")))
    }

    async fn get_block_issuance(&self) -> Result<BlockIssuanceResponse, ClientError> {
        self.record(Operation::GetBlockIssuance);
        let tips = self.ledger.state.lock().tips.clone();
        Ok(BlockIssuanceResponse {
            strong_parents: if tips.is_empty() {
                vec![BlockId::new([0u8; 32])]
            } else {
                tips
            },
            weak_parents: vec![],
            shallow_like_parents: vec![],
            latest_commitment: Commitment {
                slot: 1,
                commitment_id: BlockId::new([0u8; 32]),
                reference_mana_cost: 1,
            },
            latest_finalized_slot: 0,
        })
    }

    async fn get_congestion(
        &self,
        _account_id: &AccountId,
    ) -> Result<CongestionResponse, ClientError> {
        self.record(Operation::GetCongestion);
        Ok(CongestionResponse {
            slot: 1,
            ready: true,
            reference_mana_cost: 1,
            block_issuance_credits: 1_000_000,
        })
    }

    async fn request_faucet_funds(&self, address: &Address) -> Result<(), ClientError> {
        self.record(Operation::RequestFaucetFunds);
        self.ledger
            .fund(*address, self.ledger.faucet_amount, DEFAULT_FAUCET_MANA);
        Ok(())
    }

    async fn outputs_by_address(&self, address: &Address) -> Result<Vec<OutputId>, ClientError> {
        self.record(Operation::OutputsByAddress);
        let state = self.ledger.state.lock();
        Ok(state
            .outputs
            .iter()
            .filter(|(id, (output, _))| {
                output.address_unlock() == Some(address) && !state.spent.contains_key(*id)
            })
            .map(|(id, _)| *id)
            .collect())
    }
}
