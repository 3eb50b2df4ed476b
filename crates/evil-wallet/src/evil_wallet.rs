// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::SystemTime;

use futures::future::join_all;
use rand::RngCore;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use evil_sdk::{Client, Connector};
use evil_types::api::CongestionResponse;
use evil_types::block::{BlockIssuer, BlockPayload};
use evil_types::crypto::InMemoryAddressSigner;
use evil_types::transaction::{
    SignedTransaction, TaggedData, TransactionBuilder, TxInput, WORK_SCORE_BLOCK,
};
use evil_types::{BaseToken, BlockId, Output, OutputId, TransactionId};

use crate::alias_manager::AliasManager;
use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::options::{split_balance_equally, AllotmentStrategy, BuildOptions, OutputOption};
use crate::output_manager::OutputManager;
use crate::scenario::{EvilScenario, ScenarioAlias};
use crate::wallet::{Wallet, WalletOutput, WalletType};
use crate::wallets::Wallets;

const TAGGED_DATA_LENGTH: usize = 12;

/// Where aliased inputs are drawn from.
enum InputSource {
    Wallet(Arc<Wallet>),
    Fresh,
    /// The first alias is already bound; owners are looked up per input.
    Inferred,
}

/// The wallet a new output is registered in.
enum OutputRoute {
    Temporary,
    OutputWallet,
    Owner(Arc<Wallet>),
    Untracked,
}

struct PreparedOutput {
    output: Output,
    route: OutputRoute,
    alias: Option<String>,
    /// Aliases bound to the remainder only name it as an output.
    remainder: bool,
}

/// Assembles, signs and issues spam transactions from pooled wallets.
pub struct EvilWallet {
    config: WalletConfig,
    connector: Arc<Connector>,
    wallets: Arc<Wallets>,
    output_manager: Arc<OutputManager>,
    alias_manager: AliasManager,
    block_issuer: BlockIssuer,
    span: Span,
}

impl EvilWallet {
    pub fn new(
        config: WalletConfig,
        connector: Arc<Connector>,
        block_issuer: BlockIssuer,
    ) -> Result<Self, WalletError> {
        config.validate()?;
        let output_manager = Arc::new(OutputManager::new(connector.clone(), config.clone()));
        Ok(Self {
            config,
            connector,
            wallets: Arc::new(Wallets::new()),
            output_manager,
            alias_manager: AliasManager::new(),
            block_issuer,
            span: info_span!("evil_wallet"),
        })
    }

    pub fn connector(&self) -> &Arc<Connector> {
        &self.connector
    }

    pub fn wallets(&self) -> &Arc<Wallets> {
        &self.wallets
    }

    pub fn output_manager(&self) -> &Arc<OutputManager> {
        &self.output_manager
    }

    pub fn alias_manager(&self) -> &AliasManager {
        &self.alias_manager
    }

    pub fn block_issuer(&self) -> &BlockIssuer {
        &self.block_issuer
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn new_wallet(&self, wallet_type: WalletType) -> Arc<Wallet> {
        self.wallets.new_wallet(wallet_type)
    }

    pub fn set_wallet_ready(&self, wallet: &Arc<Wallet>) {
        self.wallets.set_wallet_ready(wallet)
    }

    pub fn unspent_outputs_left(&self, wallet_type: WalletType) -> usize {
        self.wallets.unspent_outputs_left(wallet_type)
    }

    /// Drop the names of a batch. Outputs bound to its input names were spent by the
    /// batch and are no longer tracked.
    pub fn clear_aliases(&self, aliases: &ScenarioAlias) {
        let spent: Vec<OutputId> = aliases
            .inputs
            .iter()
            .filter_map(|alias| self.alias_manager.get_input(alias))
            .map(|input| input.output_id)
            .collect();
        self.output_manager.forget_outputs(&spent);
        self.alias_manager.clear_aliases(aliases)
    }

    pub fn clear_all_aliases(&self) {
        self.alias_manager.clear_all_aliases()
    }

    // Faucet funding

    /// Request `n` faucet outputs concurrently and turn each into a fresh wallet. Returns
    /// the number of wallets created.
    pub async fn request_fresh_big_faucet_wallets(&self, n: usize) -> usize {
        let requests = (0..n).map(|_| self.request_fresh_faucet_wallet());
        let results = join_all(requests).instrument(self.span.clone()).await;
        let created = results.iter().filter(|r| r.is_ok()).count();
        for e in results.into_iter().filter_map(Result::err) {
            warn!("faucet request failed: {e}");
        }
        info!(
            created,
            outputs = self.unspent_outputs_left(WalletType::Fresh),
            "requested faucet funds"
        );
        created
    }

    /// Fund a scratch address from the faucet and split the output into a new fresh
    /// wallet, which becomes available once the split is accepted.
    pub async fn request_fresh_faucet_wallet(&self) -> Result<Arc<Wallet>, WalletError> {
        let funds_wallet = self.new_wallet(WalletType::Other);
        let faucet_output = self.request_faucet_funds(&funds_wallet).await?;
        let fresh_wallet = self.new_wallet(WalletType::Fresh);
        let transaction_id = self
            .split_outputs(faucet_output, &funds_wallet, &fresh_wallet)
            .await?;
        for (_, result) in self
            .output_manager
            .await_transactions_acceptance(&[transaction_id])
            .await
        {
            result?;
        }
        self.set_wallet_ready(&fresh_wallet);
        debug!(
            wallet = fresh_wallet.id(),
            outputs = fresh_wallet.unspent_outputs_left(),
            "fresh wallet ready"
        );
        Ok(fresh_wallet)
    }

    async fn request_faucet_funds(&self, wallet: &Arc<Wallet>) -> Result<WalletOutput, WalletError> {
        let address = wallet.address_on_index(0);
        let client = self.connector.get_indexer_client()?;
        client.request_faucet_funds(&address).await?;
        let (output_id, output) = self
            .output_manager
            .await_address_unspent_output_to_be_accepted(address, self.config.faucet_timeout)
            .await?;
        Ok(self
            .output_manager
            .create_output_from_address(wallet, address, output_id, output))
    }

    async fn split_outputs(
        &self,
        input: WalletOutput,
        input_wallet: &Arc<Wallet>,
        output_wallet: &Arc<Wallet>,
    ) -> Result<TransactionId, WalletError> {
        let outputs = split_balance_equally(self.config.faucet_split_number, input.balance)
            .into_iter()
            .map(|amount| Output::new_basic(output_wallet.address(), amount))
            .collect();
        let options = BuildOptions::default()
            .with_inputs(vec![input])
            .with_outputs(outputs)
            .with_input_wallet(input_wallet.clone())
            .with_output_wallet(output_wallet.clone())
            .with_allotment_strategy(AllotmentStrategy::All);
        let transaction = self.create_transaction(options).await?;
        let transaction_id = transaction.id();
        let client = self.connector.get_client()?;
        self.prepare_and_post_block(
            client.as_ref(),
            BlockPayload::SignedTransaction(Box::new(transaction)),
            AllotmentStrategy::All,
        )
        .await?;
        Ok(transaction_id)
    }

    // Transaction assembly

    /// Resolve inputs and outputs, build and sign one transaction, and register its
    /// outputs with the output and alias managers.
    pub async fn create_transaction(
        &self,
        options: BuildOptions,
    ) -> Result<SignedTransaction, WalletError> {
        options.validate()?;
        let temp_wallet = self.new_wallet(WalletType::Other);
        let output_wallet = options
            .output_wallet
            .clone()
            .unwrap_or_else(|| self.new_wallet(WalletType::Other));

        let inputs = self.prepare_inputs(&options)?;
        let mut outputs = self.prepare_outputs(&options, &inputs, &temp_wallet, &output_wallet)?;
        if let Some(remainder) = self.prepare_remainder_output(&options, &inputs, &outputs) {
            outputs.push(remainder);
        }

        let client = self.connector.get_client()?;
        let congestion = match options.allotment_strategy {
            AllotmentStrategy::MinCost => Some(
                client
                    .get_congestion(&self.block_issuer.account_id)
                    .await?,
            ),
            AllotmentStrategy::None | AllotmentStrategy::All => None,
        };
        let params = client.protocol_parameters().await?;

        let mut builder = TransactionBuilder::new(params.network_id);
        for input in &inputs {
            builder.add_input(TxInput {
                unlock_target: input.address,
                input_id: input.output_id,
                input: input.output.clone(),
            });
        }
        for prepared in &outputs {
            builder.add_output(prepared.output.clone());
        }
        let mut tag = [0u8; TAGGED_DATA_LENGTH];
        rand::thread_rng().fill_bytes(&mut tag);
        builder
            .add_tagged_data_payload(TaggedData {
                tag: tag.to_vec(),
                data: tag.to_vec(),
            })
            .set_creation_slot(params.slot_from_time(SystemTime::now()));
        match (options.allotment_strategy, &congestion) {
            (AllotmentStrategy::All, _) => {
                builder.allot_all_mana(self.block_issuer.account_id);
            }
            (AllotmentStrategy::MinCost, Some(congestion)) => {
                builder.allot_min_required_mana_and_store_remaining_mana_in_output(
                    self.block_issuer.account_id,
                    congestion.reference_mana_cost,
                    0,
                );
            }
            _ => {}
        }
        let signer = self.input_signer(&inputs, options.input_wallet.as_ref())?;
        let transaction = builder.build(&signer)?;
        // aliased inputs may be shared by conflicting siblings and are forgotten when
        // the batch clears its aliases
        if !options.has_alias_inputs() {
            let spent: Vec<OutputId> = inputs.iter().map(|input| input.output_id).collect();
            self.output_manager.forget_outputs(&spent);
        }

        let registered = self.add_outputs_to_output_manager(
            &transaction,
            &outputs,
            &temp_wallet,
            &output_wallet,
        );
        self.register_output_aliases(&outputs, registered);
        debug!(
            transaction_id = ?transaction.id(),
            inputs = inputs.len(),
            outputs = outputs.len(),
            "created transaction"
        );
        Ok(transaction)
    }

    fn input_source(&self, options: &BuildOptions) -> InputSource {
        let first_bound = options
            .alias_inputs
            .first()
            .is_some_and(|alias| self.alias_manager.get_input(alias).is_some());
        if first_bound {
            return InputSource::Inferred;
        }
        if let Some(wallet) = &options.input_wallet {
            return InputSource::Wallet(wallet.clone());
        }
        if options.reuse {
            if let Some(wallet) = self.wallets.reuse_wallet(options.alias_inputs.len()) {
                return InputSource::Wallet(wallet);
            }
        }
        InputSource::Fresh
    }

    fn draw_input(&self, source: &InputSource) -> Result<WalletOutput, WalletError> {
        match source {
            InputSource::Wallet(wallet) => wallet
                .get_unspent_output()
                .ok_or(WalletError::NoUnspentOutput(wallet.id())),
            InputSource::Fresh | InputSource::Inferred => self.wallets.get_fresh_output(),
        }
    }

    fn prepare_inputs(&self, options: &BuildOptions) -> Result<Vec<WalletOutput>, WalletError> {
        if !options.has_alias_inputs() {
            return Ok(options.inputs.clone());
        }
        let source = self.input_source(options);
        let mut inputs = Vec::with_capacity(options.alias_inputs.len());
        for alias in &options.alias_inputs {
            let input = match self.alias_manager.get_input(alias) {
                Some(input) => input,
                None => {
                    let input = self.draw_input(&source)?;
                    self.alias_manager.add_input_alias(alias, input.clone());
                    input
                }
            };
            inputs.push(input);
        }
        Ok(inputs)
    }

    fn prepare_outputs(
        &self,
        options: &BuildOptions,
        inputs: &[WalletOutput],
        temp_wallet: &Arc<Wallet>,
        output_wallet: &Arc<Wallet>,
    ) -> Result<Vec<PreparedOutput>, WalletError> {
        if options.alias_outputs.is_empty() {
            return Ok(options
                .outputs
                .iter()
                .map(|output| PreparedOutput {
                    route: self.route_explicit_output(output, inputs, output_wallet),
                    output: output.clone(),
                    alias: None,
                    remainder: false,
                })
                .collect());
        }

        let amounts = output_balances(&options.alias_outputs, input_balance(inputs))?;
        Ok(options
            .alias_outputs
            .iter()
            .zip(amounts)
            .map(|(option, amount)| {
                let in_batch = options.output_batch_aliases.contains(&option.alias);
                let (address, route) = match option.address {
                    Some(address) => (address, OutputRoute::Untracked),
                    None if in_batch => (output_wallet.address(), OutputRoute::OutputWallet),
                    None => (temp_wallet.address(), OutputRoute::Temporary),
                };
                let mut output = Output::placeholder(option.output_type, address);
                output.set_amount(amount);
                PreparedOutput {
                    output,
                    route,
                    alias: Some(option.alias.clone()),
                    remainder: false,
                }
            })
            .collect())
    }

    fn route_explicit_output(
        &self,
        output: &Output,
        inputs: &[WalletOutput],
        output_wallet: &Arc<Wallet>,
    ) -> OutputRoute {
        let Some(address) = output.address_unlock() else {
            return OutputRoute::Untracked;
        };
        if output_wallet.address_index(address).is_some() {
            return OutputRoute::OutputWallet;
        }
        inputs
            .iter()
            .find(|input| &input.address == address)
            .and_then(|input| self.output_manager.wallet_of(&input.output_id))
            .map_or(OutputRoute::Untracked, OutputRoute::Owner)
    }

    /// Pay what the outputs leave of the inputs back to the first input's address.
    fn prepare_remainder_output(
        &self,
        options: &BuildOptions,
        inputs: &[WalletOutput],
        outputs: &[PreparedOutput],
    ) -> Option<PreparedOutput> {
        let input_balance = input_balance(inputs);
        let output_balance: BaseToken = outputs.iter().map(|o| o.output.amount()).sum();
        if input_balance <= output_balance {
            return None;
        }
        let first = inputs.first()?;
        let route = self
            .output_manager
            .wallet_of(&first.output_id)
            .map_or(OutputRoute::Untracked, OutputRoute::Owner);
        Some(PreparedOutput {
            output: Output::new_basic(first.address, input_balance - output_balance),
            route,
            alias: options.alias_inputs.first().cloned(),
            remainder: true,
        })
    }

    fn input_signer(
        &self,
        inputs: &[WalletOutput],
        input_wallet: Option<&Arc<Wallet>>,
    ) -> Result<InMemoryAddressSigner, WalletError> {
        let keys = inputs
            .iter()
            .map(|input| {
                self.output_manager
                    .wallet_of(&input.output_id)
                    .and_then(|wallet| wallet.address_keys(&input.address))
                    .or_else(|| input_wallet.and_then(|w| w.address_keys(&input.address)))
                    .ok_or(WalletError::UnknownOutput(input.output_id))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(InMemoryAddressSigner::new(keys))
    }

    fn add_outputs_to_output_manager(
        &self,
        transaction: &SignedTransaction,
        outputs: &[PreparedOutput],
        temp_wallet: &Arc<Wallet>,
        output_wallet: &Arc<Wallet>,
    ) -> Vec<Option<WalletOutput>> {
        let transaction_id = transaction.id();
        transaction
            .transaction
            .outputs
            .iter()
            .zip(outputs)
            .enumerate()
            .map(|(index, (output, prepared))| {
                let wallet = match &prepared.route {
                    OutputRoute::Temporary => temp_wallet,
                    OutputRoute::OutputWallet => output_wallet,
                    OutputRoute::Owner(wallet) => wallet,
                    OutputRoute::Untracked => return None,
                };
                let output_id = OutputId::new(transaction_id, index as u16);
                self.output_manager
                    .add_output(wallet, output_id, output.clone())
            })
            .collect()
    }

    /// Bind created outputs to their aliases in both namespaces so later levels of a
    /// batch can spend them.
    fn register_output_aliases(
        &self,
        outputs: &[PreparedOutput],
        registered: Vec<Option<WalletOutput>>,
    ) {
        for (prepared, output) in outputs.iter().zip(registered) {
            let (Some(alias), Some(output)) = (&prepared.alias, output) else {
                continue;
            };
            if !prepared.remainder {
                self.alias_manager.add_input_alias(alias, output.clone());
            }
            self.alias_manager.add_output_alias(alias, output);
        }
    }

    /// Build every transaction of the scenario's next batch, level by level. Aliases of
    /// the batch are cleared when building fails.
    pub async fn prepare_custom_conflicts_spam(
        &self,
        scenario: &EvilScenario,
        strategy: AllotmentStrategy,
    ) -> Result<(Vec<Vec<SignedTransaction>>, ScenarioAlias), WalletError> {
        let prefixed = scenario.conflict_batch_with_prefix();
        let mut levels = Vec::with_capacity(prefixed.batch.len());
        for level in &prefixed.batch {
            let mut transactions = Vec::with_capacity(level.len());
            for aliases in level {
                let outputs = aliases
                    .outputs
                    .iter()
                    .map(|alias| OutputOption::new(alias, scenario.output_type()))
                    .collect();
                let mut options = BuildOptions::default()
                    .with_alias_inputs(&aliases.inputs)
                    .with_alias_outputs(outputs)
                    .with_output_batch_aliases(prefixed.batch_outputs.clone())
                    .with_output_wallet(scenario.output_wallet().clone())
                    .with_reuse(scenario.reuse())
                    .with_allotment_strategy(strategy);
                if let Some(wallet) = scenario.restricted_input_wallet() {
                    options = options.with_input_wallet(wallet.clone());
                }
                match self.create_transaction(options).await {
                    Ok(transaction) => transactions.push(transaction),
                    Err(e) => {
                        self.clear_aliases(&prefixed.all_aliases);
                        return Err(e);
                    }
                }
            }
            levels.push(transactions);
        }
        Ok((levels, prefixed.all_aliases))
    }

    // Issuance

    /// Wrap `payload` in a block on top of `client`'s tips, signed by the block issuer,
    /// and post it.
    pub async fn prepare_and_post_block(
        &self,
        client: &dyn Client,
        payload: BlockPayload,
        strategy: AllotmentStrategy,
    ) -> Result<BlockId, WalletError> {
        let params = client.protocol_parameters().await?;
        let issuance = client.get_block_issuance().await?;
        let max_burned_mana = match strategy {
            AllotmentStrategy::None => 0,
            AllotmentStrategy::All | AllotmentStrategy::MinCost => {
                let congestion = client.get_congestion(&self.block_issuer.account_id).await?;
                max_burned_mana(&congestion, &payload)
            }
        };
        let block = self
            .block_issuer
            .issue(&params, &issuance, Some(payload), max_burned_mana);
        let block_id = client.post_block(&block).await?;
        debug!(?block_id, url = client.url(), "posted block");
        Ok(block_id)
    }

    /// Post a block carrying a random tagged data payload.
    pub async fn post_data_block(&self, client: &dyn Client) -> Result<BlockId, WalletError> {
        let mut data = [0u8; TAGGED_DATA_LENGTH];
        rand::thread_rng().fill_bytes(&mut data);
        let payload = BlockPayload::TaggedData(TaggedData {
            tag: b"evil".to_vec(),
            data: data.to_vec(),
        });
        self.prepare_and_post_block(client, payload, AllotmentStrategy::None)
            .await
    }

    // Solidity

    pub async fn await_inputs_solidity(
        &self,
        transaction: &SignedTransaction,
        client: &Arc<dyn Client>,
    ) -> Result<(), WalletError> {
        self.output_manager
            .await_outputs_to_be_solid(&transaction.transaction.inputs, client)
            .await
    }

    pub fn set_tx_outputs_solid(&self, transaction: &SignedTransaction, url: &str) {
        for output_id in transaction.transaction.output_ids() {
            self.output_manager
                .set_output_solid_for_issuer(url, output_id);
        }
    }
}

fn input_balance(inputs: &[WalletOutput]) -> BaseToken {
    inputs.iter().map(|i| i.balance).sum()
}

/// Explicit amounts are kept; outputs without one share the rest of `total` equally.
fn output_balances(
    options: &[OutputOption],
    total: BaseToken,
) -> Result<Vec<BaseToken>, WalletError> {
    let fixed: BaseToken = options.iter().filter_map(|o| o.amount).sum();
    if fixed > total {
        return Err(WalletError::InsufficientBalance {
            available: total,
            required: fixed,
        });
    }
    let unset = options.iter().filter(|o| o.amount.is_none()).count();
    let mut shares = split_balance_equally(unset, total - fixed).into_iter();
    Ok(options
        .iter()
        .map(|o| o.amount.or_else(|| shares.next()).unwrap_or_default())
        .collect())
}

fn max_burned_mana(congestion: &CongestionResponse, payload: &BlockPayload) -> u64 {
    let work_score = match payload {
        BlockPayload::SignedTransaction(transaction) => transaction.transaction.work_score(),
        BlockPayload::TaggedData(_) => WORK_SCORE_BLOCK,
    };
    congestion.reference_mana_cost * work_score
}

#[cfg(test)]
mod tests {
    use super::*;
    use evil_types::OutputType;

    #[test]
    fn explicit_amounts_are_kept() {
        let mut fixed = OutputOption::new("a", OutputType::Basic);
        fixed.amount = Some(4);
        let options = vec![
            fixed,
            OutputOption::new("b", OutputType::Basic),
            OutputOption::new("c", OutputType::Basic),
        ];
        assert_eq!(output_balances(&options, 11).unwrap(), vec![4, 3, 4]);
        assert_eq!(
            output_balances(&options, 3).unwrap_err(),
            WalletError::InsufficientBalance {
                available: 3,
                required: 4
            }
        );
    }
}
