// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use rand::Rng;
use tracing::{debug, warn};

use evil_sdk::Client;
use evil_types::block::BlockPayload;
use evil_types::transaction::SignedTransaction;
use evil_types::TransactionId;
use evil_wallet::scenario::{n_spend_batch, single_transaction_batch};
use evil_wallet::{
    AllotmentStrategy, EvilBatch, EvilScenario, EvilWallet, ScenarioOptions, Wallet, WalletType,
};

use crate::config::{SpamType, SpammerConfig};
use crate::errors::{ErrorCounter, SpamError};

/// Upper bound of the random delay before each branch of a level is posted.
const MAX_POST_JITTER_MS: u64 = 20;

/// One unit of spam work.
#[async_trait]
pub trait SpamFunction: Send + Sync {
    /// Issue one unit and return the number of blocks posted. Errors of single items
    /// are tallied in `errors`; the returned error fails the whole unit.
    async fn spam(&self, wallet: &EvilWallet, errors: &ErrorCounter) -> Result<usize, SpamError>;

    /// Wallet collecting the outputs of this spam, if any.
    fn output_wallet(&self) -> Option<&Arc<Wallet>> {
        None
    }
}

/// Build the spam function for the configured spam type.
pub fn spam_function(
    config: &SpammerConfig,
    wallet: &EvilWallet,
) -> Result<Arc<dyn SpamFunction>, SpamError> {
    let batch = match config.spam_type {
        SpamType::Blk => return Ok(Arc::new(DataSpam)),
        SpamType::Tx => single_transaction_batch(),
        SpamType::Ds => n_spend_batch(2),
        SpamType::Custom => config.scenario_batch().ok_or_else(|| {
            SpamError::InvalidConfig(format!("unknown scenario {}", config.scenario))
        })?,
    };
    Ok(Arc::new(ScenarioSpam::new(
        batch,
        config.deep,
        config.allotment,
        config.await_acceptance,
        wallet,
    )))
}

/// Posts blocks with random tagged data.
pub struct DataSpam;

#[async_trait]
impl SpamFunction for DataSpam {
    async fn spam(&self, wallet: &EvilWallet, _errors: &ErrorCounter) -> Result<usize, SpamError> {
        let client = wallet.connector().get_client()?;
        wallet.post_data_block(client.as_ref()).await?;
        Ok(1)
    }
}

/// Issues one prefixed batch of a conflict scenario per unit.
pub struct ScenarioSpam {
    scenario: EvilScenario,
    strategy: AllotmentStrategy,
    await_acceptance: bool,
}

impl ScenarioSpam {
    pub fn new(
        batch: EvilBatch,
        deep: bool,
        strategy: AllotmentStrategy,
        await_acceptance: bool,
        wallet: &EvilWallet,
    ) -> Self {
        let scenario = EvilScenario::new(
            ScenarioOptions {
                batch,
                reuse: deep,
                ..Default::default()
            },
            wallet.wallets(),
        );
        Self {
            scenario,
            strategy,
            await_acceptance,
        }
    }

    pub fn scenario(&self) -> &EvilScenario {
        &self.scenario
    }

    async fn post_level(
        &self,
        wallet: &EvilWallet,
        level: Vec<SignedTransaction>,
        clients: &[Arc<dyn Client>],
    ) -> Vec<Result<TransactionId, SpamError>> {
        let keep_solidity = self.scenario.output_wallet().wallet_type() != WalletType::Reuse;
        let posts = level.into_iter().zip(clients).map(|(transaction, client)| {
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_POST_JITTER_MS));
            async move {
                tokio::time::sleep(jitter).await;
                wallet.await_inputs_solidity(&transaction, client).await?;
                let transaction_id = transaction.id();
                wallet
                    .prepare_and_post_block(
                        client.as_ref(),
                        BlockPayload::SignedTransaction(Box::new(transaction.clone())),
                        self.strategy,
                    )
                    .await?;
                if keep_solidity {
                    wallet.set_tx_outputs_solid(&transaction, client.url());
                }
                debug!(?transaction_id, url = client.url(), "posted transaction");
                Ok::<_, SpamError>(transaction_id)
            }
        });
        join_all(posts).await
    }
}

#[async_trait]
impl SpamFunction for ScenarioSpam {
    async fn spam(&self, wallet: &EvilWallet, errors: &ErrorCounter) -> Result<usize, SpamError> {
        let needed = self.scenario.num_clients_needed();
        let clients = wallet.connector().get_clients(needed);
        if clients.len() < needed {
            return Err(SpamError::InsufficientClients {
                needed,
                available: clients.len(),
            });
        }

        let (levels, aliases) = wallet
            .prepare_custom_conflicts_spam(&self.scenario, self.strategy)
            .await?;

        let mut sent = vec![];
        for level in levels {
            for result in self.post_level(wallet, level, &clients).await {
                match result {
                    Ok(transaction_id) => sent.push(transaction_id),
                    Err(e) => {
                        warn!("failed to post scenario transaction: {e}");
                        errors.count_error(&e);
                    }
                }
            }
        }

        if self.await_acceptance {
            for (_, result) in wallet
                .output_manager()
                .await_transactions_acceptance(&sent)
                .await
            {
                if let Err(e) = result {
                    errors.count_error(&e.into());
                }
            }
        }
        wallet.clear_aliases(&aliases);
        Ok(sent.len())
    }

    fn output_wallet(&self) -> Option<&Arc<Wallet>> {
        Some(self.scenario.output_wallet())
    }
}
