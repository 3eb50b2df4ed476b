// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use evil_sdk::test_utils::{MockClient, MockLedger, Operation};
use evil_sdk::{Client, ClientError, Connector};
use evil_types::api::TransactionState;
use evil_types::block::{BlockIssuer, BlockPayload};
use evil_types::crypto::KeyPair;
use evil_types::transaction::SignedTransaction;
use evil_types::{AccountId, Address, BaseToken, BuildError, TransactionId};
use evil_wallet::scenario::single_transaction_batch;
use evil_wallet::{
    get_scenario, AcceptanceError, AllotmentStrategy, EvilScenario, EvilWallet, ScenarioOptions, WalletConfig,
    WalletError, WalletType,
};

struct TestEnv {
    ledger: Arc<MockLedger>,
    nodes: Vec<Arc<MockClient>>,
    wallet: EvilWallet,
}

fn test_config() -> WalletConfig {
    WalletConfig {
        faucet_timeout: Duration::from_secs(2),
        acceptance_timeout: Duration::from_secs(2),
        acceptance_poll_interval: Duration::from_millis(10),
        solidity_timeout: Duration::from_secs(1),
        solidity_poll_interval: Duration::from_millis(10),
        reuse_registration_retries: 200,
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
    let wallet = EvilWallet::new(test_config(), Arc::new(Connector::new(clients)), issuer).unwrap();
    TestEnv {
        ledger,
        nodes,
        wallet,
    }
}

async fn post(wallet: &EvilWallet, client: &dyn Client, transaction: SignedTransaction) {
    wallet
        .prepare_and_post_block(
            client,
            BlockPayload::SignedTransaction(Box::new(transaction)),
            AllotmentStrategy::None,
        )
        .await
        .unwrap();
}

async fn input_amount(client: &dyn Client, transaction: &SignedTransaction) -> BaseToken {
    let mut total = 0;
    for input in &transaction.transaction.inputs {
        total += client.get_output(input).await.unwrap().amount();
    }
    total
}

#[tokio::test]
async fn faucet_funds_split_into_fresh_wallet() {
    let env = test_env(1);
    assert_eq!(env.wallet.request_fresh_big_faucet_wallets(1).await, 1);
    assert_eq!(env.wallet.unspent_outputs_left(WalletType::Fresh), 120);

    let wallets = env.wallet.wallets();
    for _ in 0..120 {
        let output = wallets.get_fresh_output().unwrap();
        assert_eq!(output.balance, 10_000);
    }
    assert_eq!(
        wallets.get_fresh_output().unwrap_err(),
        WalletError::NoFreshOutputsAvailable
    );
    assert_eq!(env.nodes[0].calls(Operation::RequestFaucetFunds), 1);
}

#[tokio::test]
async fn multi_level_batch_preserves_balances() {
    let env = test_env(1);
    env.wallet.request_fresh_big_faucet_wallets(1).await;
    let scenario = EvilScenario::new(
        ScenarioOptions {
            batch: get_scenario("guava").unwrap(),
            ..Default::default()
        },
        env.wallet.wallets(),
    );

    let (levels, aliases) = env
        .wallet
        .prepare_custom_conflicts_spam(&scenario, AllotmentStrategy::None)
        .await
        .unwrap();
    assert_eq!(
        levels.iter().map(Vec::len).collect::<Vec<_>>(),
        vec![1, 2, 2, 1]
    );

    let client: Arc<dyn Client> = env.nodes[0].clone();
    for level in levels {
        for transaction in level {
            let outputs: BaseToken = transaction
                .transaction
                .outputs
                .iter()
                .map(|o| o.amount())
                .sum();
            assert_eq!(input_amount(client.as_ref(), &transaction).await, outputs);
            post(&env.wallet, client.as_ref(), transaction).await;
        }
    }

    // batch outputs 4, 7 and 8 end up in the scenario output wallet
    let output_wallet = scenario.output_wallet();
    assert_eq!(output_wallet.unspent_outputs().len(), 3);
    assert_eq!(
        output_wallet
            .unspent_outputs()
            .iter()
            .map(|o| o.balance)
            .sum::<BaseToken>(),
        20_000
    );

    env.wallet.clear_aliases(&aliases);
    assert_eq!(env.wallet.alias_manager().binding_counts(), (0, 0));
}

#[tokio::test]
async fn double_spend_goes_to_distinct_nodes() {
    let env = test_env(2);
    env.wallet.request_fresh_big_faucet_wallets(1).await;
    let scenario = EvilScenario::new(
        ScenarioOptions {
            batch: get_scenario("ds").unwrap(),
            ..Default::default()
        },
        env.wallet.wallets(),
    );
    assert_eq!(scenario.num_clients_needed(), 2);

    let (mut levels, _) = env
        .wallet
        .prepare_custom_conflicts_spam(&scenario, AllotmentStrategy::None)
        .await
        .unwrap();
    let conflicts = levels.remove(0);
    assert_eq!(conflicts.len(), 2);
    assert_eq!(
        conflicts[0].transaction.inputs,
        conflicts[1].transaction.inputs
    );
    assert_ne!(conflicts[0].id(), conflicts[1].id());

    let clients = env.wallet.connector().get_clients(2);
    assert_ne!(clients[0].url(), clients[1].url());
    let ids: Vec<_> = conflicts.iter().map(|t| t.id()).collect();
    for (client, transaction) in clients.iter().zip(conflicts) {
        post(&env.wallet, client.as_ref(), transaction).await;
    }
    assert_eq!(
        env.ledger.transaction_state(&ids[0]),
        Some(TransactionState::Accepted)
    );
    assert_eq!(
        env.ledger.transaction_state(&ids[1]),
        Some(TransactionState::Failed)
    );
}

#[tokio::test]
async fn reuse_outputs_wait_for_acceptance() {
    let env = test_env(1);
    env.wallet.request_fresh_big_faucet_wallets(1).await;
    env.ledger.set_auto_accept(false);

    let output_wallet = env.wallet.new_wallet(WalletType::Reuse);
    let scenario = EvilScenario::new(
        ScenarioOptions {
            batch: single_transaction_batch(),
            reuse: true,
            output_wallet: Some(output_wallet.clone()),
            ..Default::default()
        },
        env.wallet.wallets(),
    );
    let (levels, _) = env
        .wallet
        .prepare_custom_conflicts_spam(&scenario, AllotmentStrategy::None)
        .await
        .unwrap();
    for transaction in levels.into_iter().flatten() {
        post(&env.wallet, env.nodes[0].as_ref(), transaction).await;
    }
    assert_eq!(output_wallet.unspent_outputs_left(), 0);

    env.ledger.accept_pending();
    env.wallet.output_manager().wait_pending_registrations().await;
    assert_eq!(output_wallet.unspent_outputs_left(), 1);
    assert_eq!(output_wallet.get_unspent_output().unwrap().balance, 10_000);
}

#[tokio::test]
async fn get_output_reads_wallets_before_nodes() {
    let env = test_env(1);
    env.wallet.request_fresh_big_faucet_wallets(1).await;
    let node = &env.nodes[0];

    let fresh = env.wallet.wallets().fresh_wallet().unwrap();
    let owned = fresh.unspent_outputs().remove(0);
    let before = node.calls(Operation::GetOutput);
    let output = env
        .wallet
        .output_manager()
        .get_output(&owned.output_id)
        .await
        .unwrap();
    assert_eq!(output, owned);
    assert_eq!(node.calls(Operation::GetOutput), before);

    let address = Address::random();
    let foreign = env.ledger.fund(address, 42, 0);
    let output = env
        .wallet
        .output_manager()
        .get_output(&foreign)
        .await
        .unwrap();
    assert_eq!(output.balance, 42);
    assert_eq!(output.address, address);
    assert_eq!(node.calls(Operation::GetOutput), before + 1);
}

#[tokio::test]
async fn failed_batch_clears_its_aliases() {
    let env = test_env(1);
    let scenario = EvilScenario::new(
        ScenarioOptions {
            batch: get_scenario("ds").unwrap(),
            ..Default::default()
        },
        env.wallet.wallets(),
    );
    let err = env
        .wallet
        .prepare_custom_conflicts_spam(&scenario, AllotmentStrategy::None)
        .await
        .unwrap_err();
    assert_eq!(err, WalletError::NoFreshOutputsAvailable);
    assert_eq!(env.wallet.alias_manager().binding_counts(), (0, 0));
}

#[tokio::test]
async fn min_cost_allotment_needs_input_mana() {
    let env = test_env(1);
    env.wallet.request_fresh_big_faucet_wallets(1).await;
    let scenario = EvilScenario::new(ScenarioOptions::default(), env.wallet.wallets());
    // the split allotted all faucet mana, so fresh outputs carry none
    let err = env
        .wallet
        .prepare_custom_conflicts_spam(&scenario, AllotmentStrategy::MinCost)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        WalletError::Build(BuildError::InsufficientMana {
            available: 0,
            required: 200
        })
    );
    // one lookup for the split block, one for the allotment
    assert_eq!(env.nodes[0].calls(Operation::GetCongestion), 2);
    assert_eq!(env.wallet.alias_manager().binding_counts(), (0, 0));
}

#[tokio::test]
async fn concurrent_reuse_registrations_only_release_accepted_outputs() {
    let env = test_env(1);
    env.wallet.request_fresh_big_faucet_wallets(1).await;
    env.ledger.set_auto_accept(false);

    let output_wallet = env.wallet.new_wallet(WalletType::Reuse);
    let scenario = EvilScenario::new(
        ScenarioOptions {
            batch: single_transaction_batch(),
            reuse: true,
            output_wallet: Some(output_wallet.clone()),
            ..Default::default()
        },
        env.wallet.wallets(),
    );
    let batches = join_all(
        (0..5).map(|_| {
            env.wallet
                .prepare_custom_conflicts_spam(&scenario, AllotmentStrategy::None)
        }),
    )
    .await;
    let mut transactions: Vec<SignedTransaction> = batches
        .into_iter()
        .flat_map(|batch| batch.unwrap().0.into_iter().flatten())
        .collect();
    assert_eq!(transactions.len(), 5);

    let pending = transactions.split_off(3);
    for transaction in transactions {
        post(&env.wallet, env.nodes[0].as_ref(), transaction).await;
    }
    env.ledger.accept_pending();
    for transaction in pending {
        post(&env.wallet, env.nodes[0].as_ref(), transaction).await;
    }

    tokio::time::timeout(Duration::from_secs(2), async {
        while output_wallet.unspent_outputs_left() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    let mut drawn = 0;
    while let Some(output) = output_wallet.get_unspent_output() {
        assert_eq!(
            env.ledger
                .transaction_state(output.output_id.transaction_id()),
            Some(TransactionState::Accepted)
        );
        drawn += 1;
    }
    assert_eq!(drawn, 3);

    env.ledger.accept_pending();
    env.wallet.output_manager().wait_pending_registrations().await;
    assert_eq!(output_wallet.unspent_outputs_left(), 2);
}

#[tokio::test]
async fn spent_outputs_are_no_longer_tracked() {
    let env = test_env(1);
    env.wallet.request_fresh_big_faucet_wallets(1).await;
    let output_manager = env.wallet.output_manager();
    // the faucet output was spent by the split
    assert_eq!(output_manager.tracked_outputs(), 120);

    let scenario = EvilScenario::new(
        ScenarioOptions {
            batch: single_transaction_batch(),
            ..Default::default()
        },
        env.wallet.wallets(),
    );
    let client: Arc<dyn Client> = env.nodes[0].clone();
    let url = client.url().to_string();
    let mut spent = vec![];
    for _ in 0..50 {
        let (levels, aliases) = env
            .wallet
            .prepare_custom_conflicts_spam(&scenario, AllotmentStrategy::None)
            .await
            .unwrap();
        for transaction in levels.into_iter().flatten() {
            env.wallet
                .await_inputs_solidity(&transaction, &client)
                .await
                .unwrap();
            spent.extend(transaction.transaction.inputs.iter().copied());
            post(&env.wallet, client.as_ref(), transaction).await;
        }
        env.wallet.clear_aliases(&aliases);
    }

    assert_eq!(spent.len(), 50);
    for output_id in &spent {
        assert!(output_manager.wallet_of(output_id).is_none());
        assert!(!output_manager.is_output_solid_for_issuer(&url, output_id));
    }
    // 70 unspent fresh outputs plus one batch output per round
    assert_eq!(output_manager.tracked_outputs(), 120);
    assert_eq!(scenario.output_wallet().unspent_outputs().len(), 50);
}

#[tokio::test]
async fn explicit_fresh_input_wallet_is_drawn_from() {
    let env = test_env(1);
    env.wallet.request_fresh_big_faucet_wallets(1).await;

    let chosen = env.wallet.new_wallet(WalletType::Fresh);
    let address = chosen.address();
    let funded = env.ledger.fund(address, 5_000, 0);
    let output = env.nodes[0].get_output(&funded).await.unwrap();
    env.wallet
        .output_manager()
        .create_output_from_address(&chosen, address, funded, output);

    let scenario = EvilScenario::new(
        ScenarioOptions {
            batch: single_transaction_batch(),
            restricted_input_wallet: Some(chosen.clone()),
            ..Default::default()
        },
        env.wallet.wallets(),
    );
    let (levels, _) = env
        .wallet
        .prepare_custom_conflicts_spam(&scenario, AllotmentStrategy::None)
        .await
        .unwrap();

    assert_eq!(levels[0][0].transaction.inputs, vec![funded]);
    assert_eq!(chosen.unspent_outputs_left(), 0);
    assert_eq!(env.wallet.unspent_outputs_left(WalletType::Fresh), 120);
}

#[tokio::test]
async fn acceptance_without_clients_is_a_client_error() {
    let issuer = BlockIssuer::new(AccountId::random(), KeyPair::generate());
    let wallet = EvilWallet::new(test_config(), Arc::new(Connector::new(vec![])), issuer).unwrap();
    let transaction_id = TransactionId::random();

    let results = wallet
        .output_manager()
        .await_transactions_acceptance(&[transaction_id])
        .await;
    assert_eq!(
        results,
        vec![(
            transaction_id,
            Err(AcceptanceError::Client(ClientError::NoClients))
        )]
    );
}
