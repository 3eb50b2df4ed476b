// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WalletError;

/// Number of outputs a faucet output is split into.
pub const FAUCET_REQUEST_SPLIT_NUMBER: usize = 120;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WalletConfig {
    pub faucet_split_number: usize,
    #[serde(with = "humantime_duration")]
    pub faucet_timeout: Duration,
    #[serde(with = "humantime_duration")]
    pub acceptance_timeout: Duration,
    #[serde(with = "humantime_duration")]
    pub acceptance_poll_interval: Duration,
    #[serde(with = "humantime_duration")]
    pub solidity_timeout: Duration,
    #[serde(with = "humantime_duration")]
    pub solidity_poll_interval: Duration,
    /// Polls for acceptance before an output of a reuse wallet is given up.
    pub reuse_registration_retries: usize,
    #[serde(with = "humantime_duration")]
    pub reuse_registration_interval: Duration,
    /// Width of the semaphore bounding in-flight status queries.
    pub max_concurrent_status_queries: usize,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            faucet_split_number: FAUCET_REQUEST_SPLIT_NUMBER,
            faucet_timeout: Duration::from_secs(10),
            acceptance_timeout: Duration::from_secs(20),
            acceptance_poll_interval: Duration::from_secs(1),
            solidity_timeout: Duration::from_secs(10),
            solidity_poll_interval: Duration::from_millis(500),
            reuse_registration_retries: 20,
            reuse_registration_interval: Duration::from_secs(1),
            max_concurrent_status_queries: 10,
        }
    }
}

impl WalletConfig {
    pub fn validate(&self) -> Result<(), WalletError> {
        let zero = |name: &str| Err(WalletError::InvalidConfig(format!("{name} must be non-zero")));
        if self.faucet_split_number == 0 {
            return zero("faucet-split-number");
        }
        if self.faucet_split_number > evil_types::transaction::MAX_OUTPUTS_COUNT {
            return Err(WalletError::InvalidConfig(format!(
                "faucet-split-number exceeds {} outputs",
                evil_types::transaction::MAX_OUTPUTS_COUNT
            )));
        }
        for (name, value) in [
            ("faucet-timeout", self.faucet_timeout),
            ("acceptance-timeout", self.acceptance_timeout),
            ("acceptance-poll-interval", self.acceptance_poll_interval),
            ("solidity-timeout", self.solidity_timeout),
            ("solidity-poll-interval", self.solidity_poll_interval),
            ("reuse-registration-interval", self.reuse_registration_interval),
        ] {
            if value.is_zero() {
                return zero(name);
            }
        }
        if self.reuse_registration_retries == 0 {
            return zero("reuse-registration-retries");
        }
        if self.max_concurrent_status_queries == 0 {
            return zero("max-concurrent-status-queries");
        }
        Ok(())
    }
}

/// Serde adapter writing durations as human readable strings such as `1s` or `500ms`.
pub mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_yaml() {
        let config: WalletConfig =
            serde_yaml::from_str("acceptance-timeout: 5s\nsolidity-poll-interval: 250ms\n").unwrap();
        assert_eq!(config.acceptance_timeout, Duration::from_secs(5));
        assert_eq!(config.solidity_poll_interval, Duration::from_millis(250));
        assert_eq!(config.faucet_split_number, FAUCET_REQUEST_SPLIT_NUMBER);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_zero_values() {
        let config = WalletConfig {
            max_concurrent_status_queries: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(WalletError::InvalidConfig(_))
        ));
    }
}
