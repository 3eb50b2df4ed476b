// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::WalletError;
use crate::wallet::{Wallet, WalletId, WalletOutput, WalletType};

#[derive(Default)]
struct PoolState {
    last_id: WalletId,
    wallets: HashMap<WalletId, Arc<Wallet>>,
    /// Ready fresh wallets, oldest first.
    fresh: VecDeque<Arc<Wallet>>,
    /// Reuse wallets and whether they are ready, i.e. no more outputs will be added.
    reuse: BTreeMap<WalletId, bool>,
}

/// Creates wallets and hands out the ones with spendable outputs.
#[derive(Default)]
pub struct Wallets {
    state: Mutex<PoolState>,
}

impl Wallets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a wallet of the given type. Fresh and reuse wallets are tracked by the pool;
    /// other wallets are owned by their caller.
    pub fn new_wallet(&self, wallet_type: WalletType) -> Arc<Wallet> {
        let mut state = self.state.lock();
        state.last_id += 1;
        let wallet = Arc::new(Wallet::new(state.last_id, wallet_type));
        match wallet_type {
            WalletType::Other => {}
            WalletType::Reuse => {
                state.reuse.insert(wallet.id(), false);
                state.wallets.insert(wallet.id(), wallet.clone());
            }
            WalletType::Fresh | WalletType::RestrictedReuse => {
                state.wallets.insert(wallet.id(), wallet.clone());
            }
        }
        debug!(id = wallet.id(), %wallet_type, "new wallet");
        wallet
    }

    pub fn get_wallet(&self, id: WalletId) -> Option<Arc<Wallet>> {
        self.state.lock().wallets.get(&id).cloned()
    }

    /// Mark a wallet as complete. Fresh wallets join the back of the fresh queue, unless
    /// they are empty. Reuse wallets are flagged so they can be evicted once drained.
    pub fn set_wallet_ready(&self, wallet: &Arc<Wallet>) {
        let mut state = self.state.lock();
        match wallet.wallet_type() {
            WalletType::Fresh => {
                if wallet.is_empty() {
                    return;
                }
                state.fresh.push_back(wallet.clone());
            }
            WalletType::Reuse => {
                state.reuse.insert(wallet.id(), true);
            }
            WalletType::Other | WalletType::RestrictedReuse => {}
        }
    }

    /// The oldest non-empty fresh wallet. Drained wallets at the front of the queue are
    /// dropped.
    pub fn fresh_wallet(&self) -> Result<Arc<Wallet>, WalletError> {
        let mut state = self.state.lock();
        Self::front_fresh_wallet(&mut state)
    }

    fn front_fresh_wallet(state: &mut PoolState) -> Result<Arc<Wallet>, WalletError> {
        while let Some(wallet) = state.fresh.front() {
            if !wallet.is_empty() {
                return Ok(wallet.clone());
            }
            let id = wallet.id();
            state.fresh.pop_front();
            state.wallets.remove(&id);
            debug!(id, "removed drained fresh wallet");
        }
        Err(WalletError::NoFreshOutputsAvailable)
    }

    /// Draw one output from the fresh wallets.
    pub fn get_fresh_output(&self) -> Result<WalletOutput, WalletError> {
        let mut state = self.state.lock();
        loop {
            let wallet = Self::front_fresh_wallet(&mut state)?;
            if let Some(output) = wallet.get_unspent_output() {
                return Ok(output);
            }
        }
    }

    /// A ready-or-filling reuse wallet with more than `outputs_needed` outputs left.
    /// Reuse wallets that are ready and drained are evicted along the way.
    pub fn reuse_wallet(&self, outputs_needed: usize) -> Option<Arc<Wallet>> {
        let mut state = self.state.lock();
        let mut drained = vec![];
        let mut found = None;
        for (id, ready) in &state.reuse {
            let Some(wallet) = state.wallets.get(id) else {
                continue;
            };
            if wallet.unspent_outputs_left() > outputs_needed {
                found = Some(wallet.clone());
                break;
            }
            if *ready && wallet.is_empty() {
                drained.push(*id);
            }
        }
        for id in drained {
            state.reuse.remove(&id);
            state.wallets.remove(&id);
            debug!(id, "removed drained reuse wallet");
        }
        found
    }

    pub fn fresh_wallet_count(&self) -> usize {
        self.state.lock().fresh.len()
    }

    /// Outputs left in all wallets of the given type.
    pub fn unspent_outputs_left(&self, wallet_type: WalletType) -> usize {
        let state = self.state.lock();
        match wallet_type {
            WalletType::Fresh => state.fresh.iter().map(|w| w.unspent_outputs_left()).sum(),
            _ => state
                .wallets
                .values()
                .filter(|w| w.wallet_type() == wallet_type)
                .map(|w| w.unspent_outputs_left())
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evil_types::{Output, OutputId, TransactionId};

    fn fill(wallet: &Wallet, n: usize) {
        for _ in 0..n {
            let address = wallet.address();
            wallet.add_unspent_output(WalletOutput {
                output_id: OutputId::new(TransactionId::random(), 0),
                address,
                address_index: wallet.address_index(&address).unwrap(),
                balance: 1,
                output: Output::new_basic(address, 1),
            });
        }
    }

    #[test]
    fn empty_fresh_wallet_is_not_enqueued() {
        let wallets = Wallets::new();
        let wallet = wallets.new_wallet(WalletType::Fresh);
        wallets.set_wallet_ready(&wallet);
        assert_eq!(wallets.fresh_wallet_count(), 0);
        assert_eq!(
            wallets.fresh_wallet().unwrap_err(),
            WalletError::NoFreshOutputsAvailable
        );
    }

    #[test]
    fn fresh_wallets_are_drained_in_creation_order() {
        let wallets = Wallets::new();
        let first = wallets.new_wallet(WalletType::Fresh);
        let second = wallets.new_wallet(WalletType::Fresh);
        fill(&first, 1);
        fill(&second, 2);
        wallets.set_wallet_ready(&first);
        wallets.set_wallet_ready(&second);
        assert_eq!(wallets.unspent_outputs_left(WalletType::Fresh), 3);

        assert_eq!(wallets.fresh_wallet().unwrap().id(), first.id());
        wallets.get_fresh_output().unwrap();
        assert_eq!(wallets.fresh_wallet().unwrap().id(), second.id());
        assert_eq!(wallets.fresh_wallet_count(), 1);
        assert!(wallets.get_wallet(first.id()).is_none());
    }

    #[test]
    fn reuse_wallet_selection_and_eviction() {
        let wallets = Wallets::new();
        let drained = wallets.new_wallet(WalletType::Reuse);
        let filling = wallets.new_wallet(WalletType::Reuse);
        wallets.set_wallet_ready(&drained);
        fill(&filling, 3);

        assert_eq!(wallets.reuse_wallet(2).unwrap().id(), filling.id());
        assert!(wallets.reuse_wallet(3).is_none());
        assert!(wallets.get_wallet(drained.id()).is_none());
        assert!(wallets.get_wallet(filling.id()).is_some());
    }
}
