// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Instant};
use tokio_util::task::TaskTracker;
use tracing::{debug, info_span, warn, Instrument, Span};

use evil_sdk::{Client, Connector};
use evil_types::api::TransactionState;
use evil_types::{Address, BlockId, Output, OutputId, TransactionId};

use crate::config::WalletConfig;
use crate::error::{AcceptanceError, WalletError};
use crate::wallet::{Wallet, WalletOutput, WalletType};

/// Tracks which wallet owns each output and what the nodes have observed about them.
pub struct OutputManager {
    connector: Arc<Connector>,
    config: WalletConfig,
    output_wallets: RwLock<HashMap<OutputId, Arc<Wallet>>>,
    output_addresses: RwLock<HashMap<OutputId, Address>>,
    /// Outputs known to be present on a node, by node url.
    solid_outputs: RwLock<HashMap<String, HashSet<OutputId>>>,
    status_queries: Arc<Semaphore>,
    pending_registrations: TaskTracker,
    span: Span,
}

impl OutputManager {
    pub fn new(connector: Arc<Connector>, config: WalletConfig) -> Self {
        let status_queries = Arc::new(Semaphore::new(config.max_concurrent_status_queries));
        Self {
            connector,
            config,
            output_wallets: RwLock::new(HashMap::new()),
            output_addresses: RwLock::new(HashMap::new()),
            solid_outputs: RwLock::new(HashMap::new()),
            status_queries,
            pending_registrations: TaskTracker::new(),
            span: info_span!("output_manager"),
        }
    }

    /// Register an output created for `wallet`. Outputs without an address unlock are not
    /// tracked.
    pub fn add_output(
        &self,
        wallet: &Arc<Wallet>,
        output_id: OutputId,
        output: Output,
    ) -> Option<WalletOutput> {
        let address = *output.address_unlock()?;
        Some(self.create_output_from_address(wallet, address, output_id, output))
    }

    /// Register an output owned by `address` of `wallet`. Outputs of reuse wallets only
    /// become spendable once the output is accepted.
    pub fn create_output_from_address(
        &self,
        wallet: &Arc<Wallet>,
        address: Address,
        output_id: OutputId,
        output: Output,
    ) -> WalletOutput {
        let wallet_output = WalletOutput {
            output_id,
            address,
            address_index: wallet.address_index(&address).unwrap_or_default(),
            balance: output.amount(),
            output,
        };
        self.output_wallets.write().insert(output_id, wallet.clone());
        self.output_addresses.write().insert(output_id, address);

        match wallet.wallet_type() {
            WalletType::Reuse | WalletType::RestrictedReuse => {
                self.defer_registration(wallet.clone(), wallet_output.clone())
            }
            WalletType::Fresh | WalletType::Other => {
                wallet.add_unspent_output(wallet_output.clone())
            }
        }
        wallet_output
    }

    fn defer_registration(&self, wallet: Arc<Wallet>, output: WalletOutput) {
        let connector = self.connector.clone();
        let status_queries = self.status_queries.clone();
        let interval = self.config.reuse_registration_interval;
        let timeout = interval * self.config.reuse_registration_retries as u32;
        self.pending_registrations.spawn(
            async move {
                let Ok(client) = connector.get_indexer_client() else {
                    warn!("no client to confirm reuse output");
                    return;
                };
                let Ok(_permit) = status_queries.acquire().await else {
                    return;
                };
                let transaction_id = *output.output_id.transaction_id();
                match poll_acceptance(client.as_ref(), transaction_id, None, timeout, interval)
                    .await
                {
                    Ok(()) => {
                        debug!(output_id = ?output.output_id, wallet = wallet.id(), "reuse output accepted");
                        wallet.add_unspent_output(output);
                    }
                    Err(e) => warn!(output_id = ?output.output_id, "dropping reuse output: {e}"),
                }
            }
            .instrument(self.span.clone()),
        );
    }

    /// Wait until every deferred reuse registration has finished.
    pub async fn wait_pending_registrations(&self) {
        self.pending_registrations.close();
        self.pending_registrations.wait().await;
        self.pending_registrations.reopen();
    }

    /// Stop tracking spent outputs, including their solidity on every node.
    pub fn forget_outputs(&self, output_ids: &[OutputId]) {
        if output_ids.is_empty() {
            return;
        }
        {
            let mut wallets = self.output_wallets.write();
            let mut addresses = self.output_addresses.write();
            for output_id in output_ids {
                wallets.remove(output_id);
                addresses.remove(output_id);
            }
        }
        let mut solid = self.solid_outputs.write();
        for outputs in solid.values_mut() {
            for output_id in output_ids {
                outputs.remove(output_id);
            }
        }
        solid.retain(|_, outputs| !outputs.is_empty());
    }

    /// Number of outputs with a known owning wallet.
    pub fn tracked_outputs(&self) -> usize {
        self.output_wallets.read().len()
    }

    pub fn wallet_of(&self, output_id: &OutputId) -> Option<Arc<Wallet>> {
        self.output_wallets.read().get(output_id).cloned()
    }

    fn cached_output(&self, output_id: &OutputId) -> Option<WalletOutput> {
        let wallet = self.wallet_of(output_id)?;
        let address = self.output_addresses.read().get(output_id).copied()?;
        wallet.unspent_output(&address)
    }

    /// The output from its owning wallet, or from a node when no wallet holds it.
    pub async fn get_output(&self, output_id: &OutputId) -> Result<WalletOutput, WalletError> {
        if let Some(output) = self.cached_output(output_id) {
            return Ok(output);
        }
        let client = self.connector.get_client()?;
        let output = client.get_output(output_id).await?;
        let address = *output
            .address_unlock()
            .ok_or(WalletError::UnknownOutput(*output_id))?;
        Ok(WalletOutput {
            output_id: *output_id,
            address,
            address_index: 0,
            balance: output.amount(),
            output,
        })
    }

    pub fn set_output_solid_for_issuer(&self, url: &str, output_id: OutputId) {
        self.solid_outputs
            .write()
            .entry(url.to_string())
            .or_default()
            .insert(output_id);
    }

    pub fn is_output_solid_for_issuer(&self, url: &str, output_id: &OutputId) -> bool {
        self.solid_outputs
            .read()
            .get(url)
            .is_some_and(|outputs| outputs.contains(output_id))
    }

    /// Wait until `client` knows every output. Fails with the number of outputs still
    /// missing after the solidity timeout.
    pub async fn await_outputs_to_be_solid(
        &self,
        output_ids: &[OutputId],
        client: &Arc<dyn Client>,
    ) -> Result<(), WalletError> {
        let url = client.url().to_string();
        let pending: Vec<OutputId> = output_ids
            .iter()
            .filter(|id| !self.is_output_solid_for_issuer(&url, id))
            .copied()
            .collect();
        let url = url.as_str();
        let results = join_all(pending.iter().map(|output_id| async move {
            let Ok(_permit) = self.status_queries.acquire().await else {
                return false;
            };
            let solid = self.await_output_to_be_solid(output_id, client.as_ref()).await;
            if solid {
                self.set_output_solid_for_issuer(url, *output_id);
            }
            solid
        }))
        .await;
        let missing = results.iter().filter(|solid| !**solid).count();
        if missing > 0 {
            return Err(WalletError::InputsNotSolid(missing));
        }
        Ok(())
    }

    async fn await_output_to_be_solid(&self, output_id: &OutputId, client: &dyn Client) -> bool {
        let deadline = Instant::now() + self.config.solidity_timeout;
        loop {
            match client.get_output(output_id).await {
                Ok(_) => return true,
                Err(e) if !e.is_not_found() => debug!(?output_id, "solidity check failed: {e}"),
                Err(_) => {}
            }
            if Instant::now() >= deadline {
                debug!(?output_id, url = client.url(), "output not solid in time");
                return false;
            }
            sleep(self.config.solidity_poll_interval).await;
        }
    }

    /// Wait for a transaction issued in `block_id` to be accepted by `client`.
    pub async fn await_transaction_to_be_accepted(
        &self,
        client: &dyn Client,
        transaction_id: TransactionId,
        block_id: Option<BlockId>,
    ) -> Result<(), AcceptanceError> {
        poll_acceptance(
            client,
            transaction_id,
            block_id,
            self.config.acceptance_timeout,
            self.config.acceptance_poll_interval,
        )
        .await
    }

    /// Wait for each transaction independently, with at most
    /// `max_concurrent_status_queries` polls in flight. Results are in input order.
    pub async fn await_transactions_acceptance(
        &self,
        transaction_ids: &[TransactionId],
    ) -> Vec<(TransactionId, Result<(), AcceptanceError>)> {
        let client = self.connector.get_indexer_client();
        let polls = transaction_ids.iter().map(|transaction_id| {
            let client = client.clone();
            async move {
                let result = match client {
                    Ok(client) => {
                        // the semaphore is never closed
                        let _permit = self.status_queries.acquire().await.ok();
                        self.await_transaction_to_be_accepted(client.as_ref(), *transaction_id, None)
                            .await
                    }
                    Err(e) => Err(AcceptanceError::Client(e)),
                };
                if let Err(e) = &result {
                    warn!(?transaction_id, "transaction not accepted: {e}");
                }
                (*transaction_id, result)
            }
        });
        join_all(polls).instrument(self.span.clone()).await
    }

    /// Wait for the transaction that created `output_id` to be accepted.
    pub async fn await_output_to_be_accepted(
        &self,
        output_id: &OutputId,
        timeout: Duration,
    ) -> Result<(), AcceptanceError> {
        let client = self
            .connector
            .get_indexer_client()
            .map_err(AcceptanceError::Client)?;
        poll_acceptance(
            client.as_ref(),
            *output_id.transaction_id(),
            None,
            timeout,
            self.config.acceptance_poll_interval,
        )
        .await
    }

    /// Poll the indexer until `address` owns an unspent output and fetch it.
    pub async fn await_address_unspent_output_to_be_accepted(
        &self,
        address: Address,
        timeout: Duration,
    ) -> Result<(OutputId, Output), WalletError> {
        let client = self.connector.get_indexer_client()?;
        let deadline = Instant::now() + timeout;
        loop {
            match client.outputs_by_address(&address).await {
                Ok(ids) => {
                    if let Some(output_id) = ids.first() {
                        let output = client.get_output(output_id).await?;
                        return Ok((*output_id, output));
                    }
                }
                Err(e) => debug!(%address, "indexer lookup failed: {e}"),
            }
            if Instant::now() >= deadline {
                return Err(WalletError::FaucetOutputNotFound(address));
            }
            sleep(self.config.acceptance_poll_interval).await;
        }
    }
}

async fn poll_acceptance(
    client: &dyn Client,
    transaction_id: TransactionId,
    block_id: Option<BlockId>,
    timeout: Duration,
    interval: Duration,
) -> Result<(), AcceptanceError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(block_id) = block_id {
            if let Ok(metadata) = client.get_block_metadata(&block_id).await {
                if metadata.block_state.is_failed() {
                    return Err(AcceptanceError::BlockFailed {
                        block_id,
                        reason: metadata.failure_reason.unwrap_or_default(),
                    });
                }
            }
        }
        match client.get_transaction_metadata(&transaction_id).await {
            Ok(metadata) if metadata.transaction_state.is_accepted() => return Ok(()),
            Ok(metadata) if metadata.transaction_state == TransactionState::Failed => {
                return Err(AcceptanceError::TransactionFailed {
                    transaction_id,
                    reason: metadata.failure_reason.unwrap_or_default(),
                })
            }
            Ok(_) => {}
            Err(e) if !e.is_not_found() => debug!(?transaction_id, "status query failed: {e}"),
            Err(_) => {}
        }
        if Instant::now() >= deadline {
            return Err(AcceptanceError::Timeout {
                item: format!("transaction {transaction_id}"),
                timeout,
            });
        }
        sleep(interval).await;
    }
}
