// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::base_types::{AccountId, Address, BaseToken, Mana};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OutputType {
    Basic,
    Account,
}

/// Output unlocked by a signature of the owner of `address`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicOutput {
    pub amount: BaseToken,
    pub mana: Mana,
    pub address: Address,
}

/// Output representing an account. It is controlled through its state controller and
/// governor rather than through an address unlock condition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOutput {
    pub amount: BaseToken,
    pub mana: Mana,
    pub account_id: AccountId,
    pub state_controller: Address,
    pub governor: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Output {
    Basic(BasicOutput),
    Account(AccountOutput),
}

impl Output {
    pub fn new_basic(address: Address, amount: BaseToken) -> Self {
        Output::Basic(BasicOutput {
            amount,
            mana: 0,
            address,
        })
    }

    /// A new account output. The account id stays zeroed until the ledger assigns one.
    pub fn new_account(address: Address, amount: BaseToken) -> Self {
        Output::Account(AccountOutput {
            amount,
            mana: 0,
            account_id: AccountId::new([0u8; 32]),
            state_controller: address,
            governor: address,
        })
    }

    /// An empty output of the given type, used as a placeholder before balances are known.
    pub fn placeholder(output_type: OutputType, address: Address) -> Self {
        match output_type {
            OutputType::Basic => Self::new_basic(address, 0),
            OutputType::Account => Self::new_account(address, 0),
        }
    }

    pub fn output_type(&self) -> OutputType {
        match self {
            Output::Basic(_) => OutputType::Basic,
            Output::Account(_) => OutputType::Account,
        }
    }

    pub fn amount(&self) -> BaseToken {
        match self {
            Output::Basic(o) => o.amount,
            Output::Account(o) => o.amount,
        }
    }

    pub fn mana(&self) -> Mana {
        match self {
            Output::Basic(o) => o.mana,
            Output::Account(o) => o.mana,
        }
    }

    pub fn set_amount(&mut self, amount: BaseToken) {
        match self {
            Output::Basic(o) => o.amount = amount,
            Output::Account(o) => o.amount = amount,
        }
    }

    pub fn add_mana(&mut self, mana: Mana) {
        match self {
            Output::Basic(o) => o.mana += mana,
            Output::Account(o) => o.mana += mana,
        }
    }

    /// The address of the address unlock condition, `None` for outputs without one.
    pub fn address_unlock(&self) -> Option<&Address> {
        match self {
            Output::Basic(o) => Some(&o.address),
            Output::Account(_) => None,
        }
    }

    /// The address whose signature is needed to consume this output.
    pub fn unlock_address(&self) -> &Address {
        match self {
            Output::Basic(o) => &o.address,
            Output::Account(o) => &o.state_controller,
        }
    }
}
