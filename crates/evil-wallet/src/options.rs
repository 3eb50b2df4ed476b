// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use evil_types::{Address, BaseToken, Output, OutputType};

use crate::error::WalletError;
use crate::wallet::{Wallet, WalletOutput};

/// How the mana of a transaction is allotted to the issuing account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AllotmentStrategy {
    /// No allotment; the block burns nothing.
    #[default]
    None,
    /// Allot all spare mana of the inputs.
    All,
    /// Allot what the node currently charges and keep the rest in the first output.
    MinCost,
}

/// A named output to create. The amount is derived from the inputs when not given.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputOption {
    pub alias: String,
    pub amount: Option<BaseToken>,
    pub address: Option<Address>,
    pub output_type: OutputType,
}

impl OutputOption {
    pub fn new(alias: impl Into<String>, output_type: OutputType) -> Self {
        Self {
            alias: alias.into(),
            amount: None,
            address: None,
            output_type,
        }
    }
}

/// Everything needed to assemble one transaction. Inputs and outputs are given either
/// explicitly or by alias, never both.
#[derive(Clone, Debug, Default)]
pub struct BuildOptions {
    pub alias_inputs: Vec<String>,
    pub inputs: Vec<WalletOutput>,
    pub alias_outputs: Vec<OutputOption>,
    pub outputs: Vec<Output>,
    pub input_wallet: Option<Arc<Wallet>>,
    pub output_wallet: Option<Arc<Wallet>>,
    /// Output aliases kept in the output wallet; other aliased outputs go to a temporary
    /// wallet.
    pub output_batch_aliases: HashSet<String>,
    /// Draw aliased inputs from reuse wallets when they hold enough outputs.
    pub reuse: bool,
    pub allotment_strategy: AllotmentStrategy,
}

impl BuildOptions {
    pub fn with_alias_inputs<S: AsRef<str>>(mut self, aliases: &[S]) -> Self {
        self.alias_inputs = aliases.iter().map(|a| a.as_ref().to_string()).collect();
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<WalletOutput>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_alias_outputs(mut self, outputs: Vec<OutputOption>) -> Self {
        self.alias_outputs = outputs;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<Output>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_input_wallet(mut self, wallet: Arc<Wallet>) -> Self {
        self.input_wallet = Some(wallet);
        self
    }

    pub fn with_output_wallet(mut self, wallet: Arc<Wallet>) -> Self {
        self.output_wallet = Some(wallet);
        self
    }

    pub fn with_output_batch_aliases(mut self, aliases: HashSet<String>) -> Self {
        self.output_batch_aliases = aliases;
        self
    }

    pub fn with_reuse(mut self, reuse: bool) -> Self {
        self.reuse = reuse;
        self
    }

    pub fn with_allotment_strategy(mut self, strategy: AllotmentStrategy) -> Self {
        self.allotment_strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        let no_inputs = self.inputs.is_empty() && self.alias_inputs.is_empty();
        let no_outputs = self.outputs.is_empty() && self.alias_outputs.is_empty();
        if no_inputs || no_outputs {
            return Err(WalletError::NoInputsOrOutputs);
        }
        if !self.inputs.is_empty() && !self.alias_inputs.is_empty() {
            return Err(WalletError::MixedInputs);
        }
        if !self.outputs.is_empty() && !self.alias_outputs.is_empty() {
            return Err(WalletError::MixedOutputs);
        }
        if !self.inputs.is_empty() && self.input_wallet.is_none() {
            return Err(WalletError::MissingInputWallet);
        }
        if !self.outputs.is_empty() && self.output_wallet.is_none() {
            return Err(WalletError::MissingOutputWallet);
        }
        Ok(())
    }

    pub fn has_alias_inputs(&self) -> bool {
        !self.alias_inputs.is_empty()
    }
}

/// Split `total` into `n` amounts: `n - 1` equal shares and the rest in the last one.
pub fn split_balance_equally(n: usize, total: BaseToken) -> Vec<BaseToken> {
    if n == 0 {
        return vec![];
    }
    let share = total / n as BaseToken;
    let mut amounts = vec![share; n];
    amounts[n - 1] = total - share * (n as BaseToken - 1);
    amounts
}
