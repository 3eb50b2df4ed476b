// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    FmtSubscriber,
};

use evil_sdk::Connector;
use evil_spammer::{config, SpamType, Spammer, SpammerConfig, SpammerMetrics};
use evil_wallet::{AllotmentStrategy, EvilWallet};

#[derive(Parser, Debug)]
#[command(author = "build@mystenlabs.com", version, about = "Adversarial spam for UTXO ledgers")]
struct Args {
    /// YAML configuration file. Flags below override its values.
    #[clap(long)]
    config: Option<PathBuf>,
    /// Comma separated node API urls.
    #[clap(long, value_delimiter = ',')]
    urls: Vec<String>,
    #[clap(long)]
    faucet_url: Option<String>,
    /// One of blk, tx, ds, custom.
    #[clap(long)]
    spam_type: Option<SpamType>,
    /// Built-in scenario for custom spam.
    #[clap(long)]
    scenario: Option<String>,
    /// Units per time unit.
    #[clap(long)]
    rate: Option<u64>,
    #[clap(long, value_parser = humantime::parse_duration)]
    time_unit: Option<Duration>,
    #[clap(long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,
    #[clap(long)]
    max_batches: Option<u64>,
    /// Respend outputs created by earlier spam.
    #[clap(long)]
    deep: bool,
    /// One of none, all, min-cost.
    #[clap(long)]
    allotment: Option<AllotmentStrategy>,
    /// Faucet requests made before spamming.
    #[clap(long)]
    funding_wallets: Option<usize>,
    #[clap(long)]
    await_acceptance: bool,
}

impl Args {
    fn into_config(self) -> Result<SpammerConfig> {
        let mut config = match &self.config {
            Some(path) => config::load(path)?,
            None => SpammerConfig::default(),
        };
        if !self.urls.is_empty() {
            config.urls = self.urls;
        }
        if self.faucet_url.is_some() {
            config.faucet_url = self.faucet_url;
        }
        if let Some(spam_type) = self.spam_type {
            config.spam_type = spam_type;
        }
        if let Some(scenario) = self.scenario {
            config.scenario = scenario;
            config.inline_scenario = None;
        }
        if let Some(rate) = self.rate {
            config.rate = rate;
        }
        if let Some(time_unit) = self.time_unit {
            config.time_unit = time_unit;
        }
        if let Some(duration) = self.duration {
            config.duration = duration;
        }
        if self.max_batches.is_some() {
            config.max_batches = self.max_batches;
        }
        if let Some(allotment) = self.allotment {
            config.allotment = allotment;
        }
        if let Some(funding_wallets) = self.funding_wallets {
            config.funding_wallets = funding_wallets;
        }
        config.deep |= self.deep;
        config.await_acceptance |= self.await_acceptance;
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config = Args::parse().into_config()?;
    let connector = Arc::new(
        Connector::connect(&config.urls, config.faucet_url.as_deref())
            .context("failed to connect to nodes")?,
    );
    let wallet = Arc::new(EvilWallet::new(
        config.wallet.clone(),
        connector,
        config.block_issuer()?,
    )?);

    if config.spam_type != SpamType::Blk {
        let funded = wallet
            .request_fresh_big_faucet_wallets(config.funding_wallets)
            .await;
        if funded == 0 && config.funding_wallets > 0 {
            bail!("no faucet request succeeded");
        }
        info!(funded, "funded fresh wallets");
    }

    let registry = Registry::new();
    let metrics = Arc::new(SpammerMetrics::new(&registry)?);
    let spammer = Spammer::from_config(&config, wallet, metrics)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupted, stopping spam");
                on_signal.cancel();
            }
            Err(e) => warn!("cannot listen for ctrl-c: {e}"),
        }
    });

    let summary = spammer.spam(cancel).await;
    println!("{summary}");
    Ok(())
}
