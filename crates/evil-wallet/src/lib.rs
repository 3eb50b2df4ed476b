// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Wallet pool and transaction assembly for adversarial spam.

pub mod alias_manager;
pub mod config;
pub mod error;
pub mod evil_wallet;
pub mod options;
pub mod output_manager;
pub mod scenario;
pub mod wallet;
pub mod wallets;

pub use alias_manager::AliasManager;
pub use config::WalletConfig;
pub use error::{AcceptanceError, WalletError};
pub use evil_wallet::EvilWallet;
pub use options::{AllotmentStrategy, BuildOptions, OutputOption};
pub use output_manager::OutputManager;
pub use scenario::{get_scenario, EvilBatch, EvilScenario, ScenarioAlias, ScenarioOptions};
pub use wallet::{Wallet, WalletId, WalletOutput, WalletType};
pub use wallets::Wallets;
