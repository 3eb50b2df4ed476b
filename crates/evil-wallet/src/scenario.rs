// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use evil_types::OutputType;

use crate::wallet::{Wallet, WalletType};
use crate::wallets::Wallets;

/// One branch of a conflict: the named inputs it spends and the named outputs it creates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioAlias {
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl ScenarioAlias {
    pub fn new(inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Levels of conflicting branches. Inputs of a level may name outputs of earlier levels.
pub type EvilBatch = Vec<Vec<ScenarioAlias>>;

pub const SCENARIO_NAMES: &[&str] = &[
    "tx",
    "ds",
    "conflict-circle",
    "guava",
    "orange",
    "mango",
    "pear",
    "lemon",
    "banana",
    "kiwi",
    "peace",
];

pub fn get_scenario(name: &str) -> Option<EvilBatch> {
    let batch = match name {
        "tx" => single_transaction_batch(),
        "ds" => n_spend_batch(2),
        "conflict-circle" => conflict_set_circle(4),
        "guava" => vec![
            vec![ScenarioAlias::new(&["1"], &["2", "3"])],
            vec![
                ScenarioAlias::new(&["2"], &["4"]),
                ScenarioAlias::new(&["2"], &["5"]),
            ],
            vec![
                ScenarioAlias::new(&["3"], &["6"]),
                ScenarioAlias::new(&["3"], &["7"]),
            ],
            vec![ScenarioAlias::new(&["6", "5"], &["8"])],
        ],
        "orange" => vec![vec![
            ScenarioAlias::new(&["1", "2"], &["3"]),
            ScenarioAlias::new(&["1"], &["4"]),
            ScenarioAlias::new(&["2"], &["5"]),
        ]],
        "mango" => vec![
            vec![
                ScenarioAlias::new(&["1"], &["2"]),
                ScenarioAlias::new(&["1"], &["3"]),
            ],
            vec![
                ScenarioAlias::new(&["2"], &["4"]),
                ScenarioAlias::new(&["2"], &["5"]),
            ],
            vec![ScenarioAlias::new(&["3"], &["6"])],
        ],
        "pear" => vec![
            vec![
                ScenarioAlias::new(&["1"], &["3"]),
                ScenarioAlias::new(&["1"], &["4"]),
            ],
            vec![
                ScenarioAlias::new(&["2"], &["5"]),
                ScenarioAlias::new(&["2"], &["6"]),
            ],
            vec![ScenarioAlias::new(&["3", "5"], &["7"])],
        ],
        "lemon" => vec![
            vec![
                ScenarioAlias::new(&["1"], &["2", "3"]),
                ScenarioAlias::new(&["1"], &["4"]),
            ],
            vec![
                ScenarioAlias::new(&["2"], &["5"]),
                ScenarioAlias::new(&["2"], &["6"]),
            ],
            vec![
                ScenarioAlias::new(&["3"], &["7"]),
                ScenarioAlias::new(&["3", "4"], &["8"]),
            ],
        ],
        "banana" => n_spend_batch(3),
        "kiwi" => vec![
            vec![ScenarioAlias::new(&["1"], &["2"])],
            vec![ScenarioAlias::new(&["2"], &["3"])],
            vec![ScenarioAlias::new(&["3"], &["4"])],
            vec![
                ScenarioAlias::new(&["4"], &["5"]),
                ScenarioAlias::new(&["4"], &["6"]),
            ],
        ],
        "peace" => vec![vec![
            ScenarioAlias::new(&["1"], &["2"]),
            ScenarioAlias::new(&["3"], &["4"]),
            ScenarioAlias::new(&["5"], &["6"]),
        ]],
        _ => return None,
    };
    Some(batch)
}

pub fn single_transaction_batch() -> EvilBatch {
    vec![vec![ScenarioAlias::new(&["1"], &["2"])]]
}

/// `n` transactions spending the same input.
pub fn n_spend_batch(n: usize) -> EvilBatch {
    let input = (n + 1).to_string();
    vec![(1..=n)
        .map(|i| ScenarioAlias {
            inputs: vec![input.clone()],
            outputs: vec![i.to_string()],
        })
        .collect()]
}

/// `n` transactions where each one conflicts with its two neighbours.
pub fn conflict_set_circle(n: usize) -> EvilBatch {
    vec![(0..n)
        .map(|i| ScenarioAlias {
            inputs: vec![i.to_string(), ((i + 1) % n).to_string()],
            outputs: vec![(n + i).to_string()],
        })
        .collect()]
}

/// Rendering of a batch used to derive the scenario id, e.g. `[[{[1] [2]}]]`.
fn render_batch(batch: &EvilBatch) -> String {
    let mut out = String::from("[");
    for (l, level) in batch.iter().enumerate() {
        if l > 0 {
            out.push(' ');
        }
        out.push('[');
        for (a, alias) in level.iter().enumerate() {
            if a > 0 {
                out.push(' ');
            }
            let _ = write!(
                out,
                "{{[{}] [{}]}}",
                alias.inputs.join(" "),
                alias.outputs.join(" ")
            );
        }
        out.push(']');
    }
    out.push(']');
    out
}

/// A batch with every alias carrying the batch prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixedBatch {
    pub batch: EvilBatch,
    /// Every prefixed input and output name of the batch.
    pub all_aliases: ScenarioAlias,
    /// Outputs not spent inside the batch. They are kept in the scenario output wallet.
    pub batch_outputs: HashSet<String>,
}

pub struct ScenarioOptions {
    pub batch: EvilBatch,
    /// Deep spam: outputs land in a reuse wallet and inputs are drawn from reuse wallets.
    pub reuse: bool,
    pub output_type: OutputType,
    pub output_wallet: Option<Arc<Wallet>>,
    /// Only draw inputs from this wallet.
    pub restricted_input_wallet: Option<Arc<Wallet>>,
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self {
            batch: single_transaction_batch(),
            reuse: false,
            output_type: OutputType::Basic,
            output_wallet: None,
            restricted_input_wallet: None,
        }
    }
}

#[derive(Debug)]
pub struct EvilScenario {
    id: String,
    batch: EvilBatch,
    reuse: bool,
    output_type: OutputType,
    output_wallet: Arc<Wallet>,
    restricted_input_wallet: Option<Arc<Wallet>>,
    batches_created: AtomicU64,
    num_clients_needed: usize,
}

impl EvilScenario {
    pub fn new(options: ScenarioOptions, wallets: &Wallets) -> Self {
        let output_wallet = options.output_wallet.unwrap_or_else(|| {
            wallets.new_wallet(if options.reuse {
                WalletType::Reuse
            } else {
                WalletType::Other
            })
        });
        let rendered = format!(
            "{}{}{}",
            render_batch(&options.batch),
            options.reuse,
            output_wallet.id()
        );
        let id = bs58::encode(rendered).into_string().chars().take(11).collect();
        let num_clients_needed = options.batch.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            id,
            batch: options.batch,
            reuse: options.reuse,
            output_type: options.output_type,
            output_wallet,
            restricted_input_wallet: options.restricted_input_wallet,
            batches_created: AtomicU64::new(0),
            num_clients_needed,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn batch(&self) -> &EvilBatch {
        &self.batch
    }

    pub fn reuse(&self) -> bool {
        self.reuse
    }

    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    pub fn output_wallet(&self) -> &Arc<Wallet> {
        &self.output_wallet
    }

    pub fn restricted_input_wallet(&self) -> Option<&Arc<Wallet>> {
        self.restricted_input_wallet.as_ref()
    }

    /// Width of the widest level; each branch of a level goes to a different node.
    pub fn num_clients_needed(&self) -> usize {
        self.num_clients_needed
    }

    pub fn batches_created(&self) -> u64 {
        self.batches_created.load(Ordering::Relaxed)
    }

    fn next_batch_prefix(&self) -> String {
        let n = self.batches_created.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{}", self.id, n)
    }

    /// The scenario's batch with all aliases prefixed by the next batch prefix.
    pub fn conflict_batch_with_prefix(&self) -> PrefixedBatch {
        let prefix = self.next_batch_prefix();
        let mut all_aliases = ScenarioAlias::default();
        let batch: EvilBatch = self
            .batch
            .iter()
            .map(|level| {
                level
                    .iter()
                    .map(|alias| {
                        let inputs: Vec<String> =
                            alias.inputs.iter().map(|i| format!("{prefix}{i}")).collect();
                        let outputs: Vec<String> =
                            alias.outputs.iter().map(|o| format!("{prefix}{o}")).collect();
                        all_aliases.inputs.extend(inputs.iter().cloned());
                        all_aliases.outputs.extend(outputs.iter().cloned());
                        ScenarioAlias { inputs, outputs }
                    })
                    .collect()
            })
            .collect();
        let batch_outputs = batch_outputs(&batch);
        PrefixedBatch {
            batch,
            all_aliases,
            batch_outputs,
        }
    }
}

fn batch_outputs(batch: &EvilBatch) -> HashSet<String> {
    let spent: HashSet<&String> = batch.iter().flatten().flat_map(|a| &a.inputs).collect();
    batch
        .iter()
        .flatten()
        .flat_map(|a| &a.outputs)
        .filter(|o| !spent.contains(o))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_scenarios_exist() {
        for name in SCENARIO_NAMES {
            let batch = get_scenario(name).unwrap();
            assert!(!batch.is_empty(), "{name}");
        }
        assert!(get_scenario("durian").is_none());
    }

    #[test]
    fn double_spend_shares_one_input() {
        let batch = get_scenario("ds").unwrap();
        assert_eq!(
            batch,
            vec![vec![
                ScenarioAlias::new(&["3"], &["1"]),
                ScenarioAlias::new(&["3"], &["2"]),
            ]]
        );
    }

    #[test]
    fn conflict_circle_links_neighbours() {
        let batch = conflict_set_circle(4);
        assert_eq!(batch[0][3], ScenarioAlias::new(&["3", "0"], &["7"]));
    }

    #[test]
    fn renders_like_nested_lists() {
        assert_eq!(
            render_batch(&get_scenario("guava").unwrap()),
            "[[{[1] [2 3]}] [{[2] [4]} {[2] [5]}] [{[3] [6]} {[3] [7]}] [{[6 5] [8]}]]"
        );
    }

    #[test]
    fn prefixes_are_unique_per_batch() {
        let wallets = Wallets::new();
        let scenario = EvilScenario::new(
            ScenarioOptions {
                batch: get_scenario("guava").unwrap(),
                ..Default::default()
            },
            &wallets,
        );
        assert_eq!(scenario.id().len(), 11);
        assert_eq!(scenario.num_clients_needed(), 2);

        let first = scenario.conflict_batch_with_prefix();
        let second = scenario.conflict_batch_with_prefix();
        let prefix = format!("{}1", scenario.id());
        assert_eq!(first.batch[0][0].inputs, vec![format!("{prefix}1")]);
        assert_ne!(first.all_aliases, second.all_aliases);
        assert_eq!(scenario.batches_created(), 2);

        let expected: HashSet<String> = ["4", "7", "8"]
            .iter()
            .map(|o| format!("{prefix}{o}"))
            .collect();
        assert_eq!(first.batch_outputs, expected);
    }

    #[test]
    fn id_depends_on_reuse_and_wallet() {
        let wallets = Wallets::new();
        let wallet = wallets.new_wallet(WalletType::Reuse);
        let scenario = |reuse| {
            EvilScenario::new(
                ScenarioOptions {
                    reuse,
                    output_wallet: Some(wallet.clone()),
                    ..Default::default()
                },
                &wallets,
            )
        };
        assert_eq!(scenario(true).id(), scenario(true).id());
        assert_ne!(scenario(true).id(), scenario(false).id());
    }
}
