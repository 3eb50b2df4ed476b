// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use evil_types::block::BlockIssuer;
use evil_types::crypto::{KeyPair, Seed};
use evil_types::AccountId;
use evil_wallet::config::humantime_duration;
use evil_wallet::scenario::SCENARIO_NAMES;
use evil_wallet::{get_scenario, AllotmentStrategy, EvilBatch, WalletConfig};

use crate::errors::SpamError;

/// Default cap on spam units running at the same time.
pub const MAX_IN_FLIGHT_UNITS: usize = 100;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SpamType {
    /// Blocks carrying tagged data only.
    Blk,
    /// One value transfer per unit.
    #[default]
    Tx,
    /// Two transactions spending the same output, sent to different nodes.
    Ds,
    /// A named or inline conflict scenario.
    Custom,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SpammerConfig {
    pub urls: Vec<String>,
    pub faucet_url: Option<String>,
    /// Hex account id blocks are issued for. A random account is used when unset.
    pub issuer_account_id: Option<String>,
    /// Hex seed of the issuer key. A random key is used when unset.
    pub issuer_seed: Option<String>,
    pub spam_type: SpamType,
    /// Built-in scenario used by custom spam.
    pub scenario: String,
    /// Scenario used by custom spam instead of the named one.
    pub inline_scenario: Option<EvilBatch>,
    /// Units started per time unit.
    pub rate: u64,
    #[serde(with = "humantime_duration")]
    pub time_unit: Duration,
    #[serde(with = "humantime_duration")]
    pub duration: Duration,
    pub max_batches: Option<u64>,
    /// Spend outputs of earlier spam again.
    pub deep: bool,
    pub allotment: AllotmentStrategy,
    /// Faucet requests made before spamming starts.
    pub funding_wallets: usize,
    #[serde(with = "humantime_duration")]
    pub log_interval: Duration,
    pub max_in_flight: usize,
    pub await_acceptance: bool,
    pub wallet: WalletConfig,
}

impl Default for SpammerConfig {
    fn default() -> Self {
        Self {
            urls: vec!["http://localhost:8050".to_string()],
            faucet_url: Some("http://localhost:8088".to_string()),
            issuer_account_id: None,
            issuer_seed: None,
            spam_type: SpamType::default(),
            scenario: "tx".to_string(),
            inline_scenario: None,
            rate: 1,
            time_unit: Duration::from_secs(1),
            duration: Duration::from_secs(60),
            max_batches: None,
            deep: false,
            allotment: AllotmentStrategy::All,
            funding_wallets: 2,
            log_interval: Duration::from_secs(5),
            max_in_flight: MAX_IN_FLIGHT_UNITS,
            await_acceptance: false,
            wallet: WalletConfig::default(),
        }
    }
}

impl SpammerConfig {
    pub fn validate(&self) -> Result<(), SpamError> {
        let invalid = |message: &str| Err(SpamError::InvalidConfig(message.to_string()));
        if self.rate == 0 {
            return invalid("rate must be positive");
        }
        if self.time_unit.is_zero() || self.log_interval.is_zero() {
            return invalid("time-unit and log-interval must be non-zero");
        }
        if self.tick().is_zero() {
            return invalid("rate is too high for the time unit");
        }
        if self.urls.is_empty() {
            return invalid("at least one node url is required");
        }
        if self.max_in_flight == 0 {
            return invalid("max-in-flight must be positive");
        }
        if self.spam_type == SpamType::Custom
            && self.inline_scenario.is_none()
            && !SCENARIO_NAMES.contains(&self.scenario.as_str())
        {
            return Err(SpamError::InvalidConfig(format!(
                "unknown scenario {}, expected one of {}",
                self.scenario,
                SCENARIO_NAMES.join(", ")
            )));
        }
        if let Some(batch) = &self.inline_scenario {
            if batch.is_empty() || batch.iter().any(Vec::is_empty) {
                return invalid("inline scenario has an empty level");
            }
        }
        self.wallet.validate()?;
        Ok(())
    }

    /// Delay between two spam units.
    pub fn tick(&self) -> Duration {
        let nanos = self.time_unit.as_nanos() / u128::from(self.rate.max(1));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Units a run can start before its duration elapses, capped by `max_batches`.
    pub fn max_units(&self) -> u64 {
        let tick = self.tick().as_nanos().max(1);
        let by_duration = (self.duration.as_nanos() / tick) as u64;
        self.max_batches
            .map_or(by_duration, |max| max.min(by_duration))
    }

    /// The conflict batch custom spam issues.
    pub fn scenario_batch(&self) -> Option<EvilBatch> {
        match &self.inline_scenario {
            Some(batch) => Some(batch.clone()),
            None => get_scenario(&self.scenario),
        }
    }

    pub fn block_issuer(&self) -> Result<BlockIssuer> {
        let account_id = match &self.issuer_account_id {
            Some(id) => id
                .parse::<AccountId>()
                .context("invalid issuer-account-id")?,
            None => AccountId::random(),
        };
        let keys = match &self.issuer_seed {
            Some(seed) => {
                let bytes = hex::decode(seed.trim_start_matches("0x"))
                    .context("issuer-seed is not hex")?;
                let seed: Seed = bytes
                    .try_into()
                    .map_err(|b: Vec<u8>| anyhow::anyhow!("issuer-seed has {} bytes, expected 32", b.len()))?;
                KeyPair::from_seed(&seed, 0)
            }
            None => KeyPair::generate(),
        };
        Ok(BlockIssuer::new(account_id, keys))
    }
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<SpammerConfig> {
    let path = path.as_ref();
    let config: SpammerConfig = serde_yaml::from_reader(
        std::fs::File::open(path).context(format!("cannot open {:?}", path))?,
    )?;
    config.validate()?;
    Ok(config)
}
