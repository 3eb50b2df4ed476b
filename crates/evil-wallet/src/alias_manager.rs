// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::WalletError;
use crate::scenario::ScenarioAlias;
use crate::wallet::WalletOutput;

#[derive(Default)]
struct Aliases {
    inputs: HashMap<String, WalletOutput>,
    outputs: HashMap<String, WalletOutput>,
}

/// Binds symbolic names to outputs. Input and output names live in separate namespaces.
#[derive(Default)]
pub struct AliasManager {
    aliases: RwLock<Aliases>,
}

impl AliasManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input_alias(&self, alias: impl Into<String>, output: WalletOutput) {
        self.aliases.write().inputs.insert(alias.into(), output);
    }

    pub fn add_output_alias(&self, alias: impl Into<String>, output: WalletOutput) {
        self.aliases.write().outputs.insert(alias.into(), output);
    }

    pub fn add_input_aliases(
        &self,
        aliases: &[String],
        outputs: Vec<WalletOutput>,
    ) -> Result<(), WalletError> {
        check_lengths(aliases, &outputs)?;
        let mut bindings = self.aliases.write();
        bindings.inputs.extend(aliases.iter().cloned().zip(outputs));
        Ok(())
    }

    pub fn add_output_aliases(
        &self,
        aliases: &[String],
        outputs: Vec<WalletOutput>,
    ) -> Result<(), WalletError> {
        check_lengths(aliases, &outputs)?;
        let mut bindings = self.aliases.write();
        bindings.outputs.extend(aliases.iter().cloned().zip(outputs));
        Ok(())
    }

    pub fn get_input(&self, alias: &str) -> Option<WalletOutput> {
        self.aliases.read().inputs.get(alias).cloned()
    }

    pub fn get_output(&self, alias: &str) -> Option<WalletOutput> {
        self.aliases.read().outputs.get(alias).cloned()
    }

    /// Drop every name in `aliases` from both namespaces.
    pub fn clear_aliases(&self, aliases: &ScenarioAlias) {
        let mut bindings = self.aliases.write();
        for name in aliases.inputs.iter().chain(&aliases.outputs) {
            bindings.inputs.remove(name);
            bindings.outputs.remove(name);
        }
    }

    pub fn clear_all_aliases(&self) {
        let mut bindings = self.aliases.write();
        bindings.inputs.clear();
        bindings.outputs.clear();
    }

    pub fn binding_counts(&self) -> (usize, usize) {
        let bindings = self.aliases.read();
        (bindings.inputs.len(), bindings.outputs.len())
    }
}

fn check_lengths(aliases: &[String], outputs: &[WalletOutput]) -> Result<(), WalletError> {
    if aliases.len() != outputs.len() {
        return Err(WalletError::AliasLengthMismatch {
            aliases: aliases.len(),
            outputs: outputs.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use evil_types::{Address, Output, OutputId, TransactionId};

    fn output(balance: u64) -> WalletOutput {
        let address = Address::random();
        WalletOutput {
            output_id: OutputId::new(TransactionId::random(), 0),
            address,
            address_index: 1,
            balance,
            output: Output::new_basic(address, balance),
        }
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn length_mismatch_iff_lengths_differ() {
        let manager = AliasManager::new();
        for aliases in 0..4 {
            for outputs in 0..4 {
                let bound = || (0..outputs as u64).map(output).collect::<Vec<_>>();
                let result = manager.add_output_aliases(&names(aliases), bound());
                assert_eq!(result.is_err(), aliases != outputs, "{aliases} vs {outputs}");
                let result = manager.add_input_aliases(&names(aliases), bound());
                if aliases != outputs {
                    assert_eq!(
                        result.unwrap_err(),
                        WalletError::AliasLengthMismatch { aliases, outputs }
                    );
                }
            }
        }
    }

    #[test]
    fn namespaces_are_independent() {
        let manager = AliasManager::new();
        let input = output(1);
        let out = output(2);
        manager.add_input_alias("a", input.clone());
        manager.add_output_alias("a", out.clone());
        assert_eq!(manager.get_input("a"), Some(input));
        assert_eq!(manager.get_output("a"), Some(out.clone()));

        // last write wins
        let replaced = output(3);
        manager.add_output_alias("a", replaced.clone());
        assert_eq!(manager.get_output("a"), Some(replaced));

        manager.clear_aliases(&ScenarioAlias {
            inputs: vec!["a".into()],
            outputs: vec![],
        });
        assert_eq!(manager.binding_counts(), (0, 0));
    }

    #[test]
    fn clear_all() {
        let manager = AliasManager::new();
        manager
            .add_input_aliases(&names(3), (0..3).map(output).collect())
            .unwrap();
        manager.add_output_alias("x", output(1));
        manager.clear_all_aliases();
        assert_eq!(manager.binding_counts(), (0, 0));
        assert!(manager.get_input("0").is_none());
    }
}
