// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashMap, VecDeque};
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use evil_types::crypto::{random_seed, AddressKeys, KeyPair, Seed};
use evil_types::{Address, BaseToken, Output, OutputId};

pub type WalletId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletType {
    /// Short lived wallet holding intermediate outputs.
    Other,
    /// Funded once from the faucet, outputs are consumed in address order.
    Fresh,
    /// Receives the outputs of spam transactions so they can be spent again.
    Reuse,
    /// Reuse wallet whose outputs are only spent by one scenario.
    RestrictedReuse,
}

impl fmt::Display for WalletType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An unspent output known to a wallet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletOutput {
    pub output_id: OutputId,
    pub address: Address,
    pub address_index: u64,
    pub balance: BaseToken,
    pub output: Output,
}

#[derive(Default)]
struct WalletState {
    unspent: HashMap<Address, WalletOutput>,
    index_by_address: HashMap<Address, u64>,
    address_by_index: HashMap<u64, Address>,
    last_index_used: u64,
    last_index_spent: u64,
    reuse_pool: VecDeque<Address>,
}

/// A deterministic address space and the unspent outputs it owns.
pub struct Wallet {
    id: WalletId,
    wallet_type: WalletType,
    seed: Seed,
    state: RwLock<WalletState>,
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("id", &self.id)
            .field("wallet_type", &self.wallet_type)
            .finish()
    }
}

impl Wallet {
    pub fn new(id: WalletId, wallet_type: WalletType) -> Self {
        Self {
            id,
            wallet_type,
            seed: random_seed(),
            state: RwLock::new(WalletState::default()),
        }
    }

    pub fn id(&self) -> WalletId {
        self.id
    }

    pub fn wallet_type(&self) -> WalletType {
        self.wallet_type
    }

    fn is_reuse(&self) -> bool {
        matches!(
            self.wallet_type,
            WalletType::Reuse | WalletType::RestrictedReuse
        )
    }

    /// Derive the next unused address.
    pub fn address(&self) -> Address {
        let mut state = self.state.write();
        state.last_index_used += 1;
        let index = state.last_index_used;
        Self::record(&mut state, &self.seed, index)
    }

    /// The address at `index`, without moving the cursor.
    pub fn address_on_index(&self, index: u64) -> Address {
        Self::record(&mut self.state.write(), &self.seed, index)
    }

    fn record(state: &mut WalletState, seed: &Seed, index: u64) -> Address {
        if let Some(address) = state.address_by_index.get(&index) {
            return *address;
        }
        let address = KeyPair::from_seed(seed, index).address();
        state.address_by_index.insert(index, address);
        state.index_by_address.insert(address, index);
        address
    }

    pub fn address_index(&self, address: &Address) -> Option<u64> {
        self.state.read().index_by_address.get(address).copied()
    }

    pub fn key_pair(&self, index: u64) -> KeyPair {
        KeyPair::from_seed(&self.seed, index)
    }

    /// Keys of an address previously handed out by this wallet.
    pub fn address_keys(&self, address: &Address) -> Option<AddressKeys> {
        self.address_index(address).map(|index| AddressKeys {
            address: *address,
            keys: self.key_pair(index),
        })
    }

    pub fn add_unspent_output(&self, output: WalletOutput) {
        let mut state = self.state.write();
        if self.is_reuse() {
            state.reuse_pool.push_back(output.address);
        }
        state.unspent.insert(output.address, output);
    }

    pub fn unspent_output(&self, address: &Address) -> Option<WalletOutput> {
        self.state.read().unspent.get(address).cloned()
    }

    pub fn unspent_outputs(&self) -> Vec<WalletOutput> {
        self.state.read().unspent.values().cloned().collect()
    }

    /// Take the next output to spend. Reuse wallets hand out outputs in registration
    /// order; other wallets in address order.
    pub fn get_unspent_output(&self) -> Option<WalletOutput> {
        let mut state = self.state.write();
        if self.is_reuse() {
            while let Some(address) = state.reuse_pool.pop_front() {
                if let Some(output) = state.unspent.remove(&address) {
                    return Some(output);
                }
            }
            return None;
        }
        while state.last_index_spent < state.last_index_used {
            state.last_index_spent += 1;
            let index = state.last_index_spent;
            let output = state
                .address_by_index
                .get(&index)
                .copied()
                .and_then(|address| state.unspent.remove(&address));
            if output.is_some() {
                return output;
            }
        }
        None
    }

    pub fn unspent_outputs_left(&self) -> usize {
        let state = self.state.read();
        if self.is_reuse() {
            state.reuse_pool.len()
        } else {
            (state.last_index_used - state.last_index_spent) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.read();
        if self.is_reuse() {
            state.reuse_pool.is_empty()
        } else {
            state.last_index_spent == state.last_index_used || state.unspent.is_empty()
        }
    }
}
