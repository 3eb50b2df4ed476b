// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use tokio_util::sync::CancellationToken;

use evil_sdk::test_utils::{MockClient, MockLedger, Operation};
use evil_sdk::{Client, Connector};
use evil_spammer::{
    SpamErrorKind, SpamSummary, SpamType, Spammer, SpammerConfig, SpammerMetrics, StopReason,
};
use evil_types::block::BlockIssuer;
use evil_types::crypto::KeyPair;
use evil_types::AccountId;
use evil_wallet::{EvilWallet, WalletConfig, WalletType};

struct TestEnv {
    nodes: Vec<Arc<MockClient>>,
    wallet: Arc<EvilWallet>,
}

fn wallet_config() -> WalletConfig {
    WalletConfig {
        acceptance_poll_interval: Duration::from_millis(10),
        solidity_poll_interval: Duration::from_millis(10),
        reuse_registration_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

fn test_env(nodes: usize) -> TestEnv {
    let ledger = Arc::new(MockLedger::default());
    let nodes: Vec<_> = (0..nodes)
        .map(|i| Arc::new(MockClient::new(format!("http://node-{i}"), ledger.clone())))
        .collect();
    let clients = nodes
        .iter()
        .map(|node| node.clone() as Arc<dyn Client>)
        .collect();
    let issuer = BlockIssuer::new(AccountId::random(), KeyPair::generate());
    let wallet =
        EvilWallet::new(wallet_config(), Arc::new(Connector::new(clients)), issuer).unwrap();
    TestEnv {
        nodes,
        wallet: Arc::new(wallet),
    }
}

fn spam_config(spam_type: SpamType, rate: u64, duration: Duration) -> SpammerConfig {
    SpammerConfig {
        spam_type,
        rate,
        duration,
        wallet: wallet_config(),
        ..Default::default()
    }
}

async fn run(env: &TestEnv, config: &SpammerConfig, cancel: CancellationToken) -> SpamSummary {
    let metrics = Arc::new(SpammerMetrics::new(&Registry::new()).unwrap());
    let spammer = Spammer::from_config(config, env.wallet.clone(), metrics.clone()).unwrap();
    let summary = spammer.spam(cancel).await;
    assert_eq!(metrics.units_dispatched.get(), summary.units_dispatched);
    assert_eq!(metrics.units_prepared.get(), summary.units_prepared);
    assert_eq!(metrics.units_in_flight.get(), 0);
    summary
}

#[tokio::test(start_paused = true)]
async fn dispatches_at_configured_rate() {
    let env = test_env(1);
    env.wallet.request_fresh_big_faucet_wallets(1).await;

    let config = spam_config(SpamType::Tx, 5, Duration::from_secs(10));
    let summary = run(&env, &config, CancellationToken::new()).await;

    assert!((45..=55).contains(&summary.units_prepared), "{summary}");
    assert_eq!(summary.units_prepared, summary.units_dispatched);
    assert_eq!(summary.items_sent, summary.units_prepared);
    assert!(summary.errors.is_empty(), "{summary}");
}

#[tokio::test(start_paused = true)]
async fn stops_when_funds_run_out() {
    let env = test_env(1);
    env.wallet.request_fresh_big_faucet_wallets(1).await;

    let config = spam_config(SpamType::Tx, 50, Duration::from_secs(60));
    let summary = run(&env, &config, CancellationToken::new()).await;

    assert_eq!(summary.stop_reason, StopReason::Exhausted);
    assert_eq!(summary.units_prepared, 120);
    assert!(summary.errors[&SpamErrorKind::NoFreshOutputs] >= 1);
    assert!(summary.duration < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn cancellation_drains_units_in_flight() {
    let env = test_env(1);
    env.nodes[0].set_post_latency(Duration::from_secs(1));

    let config = spam_config(SpamType::Blk, 10, Duration::from_secs(60));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(550)).await;
        trigger.cancel();
    });
    let summary = run(&env, &config, cancel).await;

    assert_eq!(summary.stop_reason, StopReason::Cancelled);
    assert!((5..=7).contains(&summary.units_dispatched), "{summary}");
    // every unit dispatched before cancellation still finished its post
    assert_eq!(summary.units_prepared, summary.units_dispatched);
    assert!(summary.duration >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn scenario_needing_more_clients_is_counted() {
    let env = test_env(1);
    let config = SpammerConfig {
        max_batches: Some(3),
        ..spam_config(SpamType::Ds, 10, Duration::from_secs(60))
    };
    let summary = run(&env, &config, CancellationToken::new()).await;

    assert_eq!(summary.stop_reason, StopReason::MaxUnits);
    assert_eq!(summary.units_dispatched, 3);
    assert_eq!(summary.units_prepared, 0);
    assert_eq!(summary.errors[&SpamErrorKind::InsufficientClients], 3);
}

#[tokio::test(start_paused = true)]
async fn post_failures_do_not_stop_spam() {
    let env = test_env(1);
    env.wallet.request_fresh_big_faucet_wallets(1).await;
    env.nodes[0].fail_next_posts(2);

    let config = SpammerConfig {
        max_batches: Some(5),
        ..spam_config(SpamType::Tx, 10, Duration::from_secs(60))
    };
    let summary = run(&env, &config, CancellationToken::new()).await;

    assert_eq!(summary.stop_reason, StopReason::MaxUnits);
    assert_eq!(summary.units_prepared, 5);
    assert_eq!(summary.items_sent, 3);
    assert_eq!(summary.errors[&SpamErrorKind::Client], 2);
}

#[tokio::test(start_paused = true)]
async fn double_spends_reach_both_nodes() {
    let env = test_env(2);
    env.wallet.request_fresh_big_faucet_wallets(1).await;

    let config = SpammerConfig {
        max_batches: Some(4),
        await_acceptance: true,
        ..spam_config(SpamType::Ds, 10, Duration::from_secs(60))
    };
    let summary = run(&env, &config, CancellationToken::new()).await;

    assert_eq!(summary.units_prepared, 4);
    assert_eq!(summary.items_sent, 8);
    // the losing branch of each double spend fails
    assert_eq!(summary.errors[&SpamErrorKind::TransactionFailed], 4);
    for node in &env.nodes {
        assert!(node.calls(Operation::PostBlock) >= 4);
    }
}

#[tokio::test(start_paused = true)]
async fn deep_spam_respends_reuse_outputs() {
    let env = test_env(1);
    env.wallet.request_fresh_big_faucet_wallets(1).await;

    let config = SpammerConfig {
        max_batches: Some(60),
        deep: true,
        ..spam_config(SpamType::Tx, 10, Duration::from_secs(60))
    };
    let summary = run(&env, &config, CancellationToken::new()).await;

    assert_eq!(summary.units_prepared, 60, "{summary}");
    assert!(summary.errors.is_empty(), "{summary}");
    // once the reuse wallet holds a spare output, units stop drawing fresh ones
    let fresh_left = env.wallet.unspent_outputs_left(WalletType::Fresh);
    assert!(fresh_left > 110, "{fresh_left} fresh outputs left");
    assert_eq!(
        env.wallet.unspent_outputs_left(WalletType::Reuse),
        120 - fresh_left
    );
}
