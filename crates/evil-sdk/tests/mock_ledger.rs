// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use evil_sdk::test_utils::{MockClient, MockLedger, Operation};
use evil_sdk::{Client, ClientError, Connector};
use evil_types::api::TransactionState;
use evil_types::block::{BlockIssuer, BlockPayload};
use evil_types::crypto::{AddressKeys, InMemoryAddressSigner, KeyPair};
use evil_types::transaction::{TransactionBuilder, TxInput};
use evil_types::{AccountId, Address, Output, OutputId};

async fn spend(
    client: &dyn Client,
    keys: &KeyPair,
    input_id: OutputId,
    to: Address,
) -> Result<evil_types::TransactionId, ClientError> {
    let input = client.get_output(&input_id).await?;
    let mut builder = TransactionBuilder::new(1);
    builder
        .add_input(TxInput {
            unlock_target: keys.address(),
            input_id,
            input: input.clone(),
        })
        .add_output(Output::new_basic(to, input.amount()));
    let signer = InMemoryAddressSigner::new([AddressKeys {
        address: keys.address(),
        keys: keys.clone(),
    }]);
    let tx = builder.build(&signer).unwrap();
    let tx_id = tx.id();
    let issuer = BlockIssuer::new(AccountId::random(), KeyPair::generate());
    let params = client.protocol_parameters().await?;
    let issuance = client.get_block_issuance().await?;
    let block = issuer.issue(
        &params,
        &issuance,
        Some(BlockPayload::SignedTransaction(Box::new(tx))),
        0,
    );
    client.post_block(&block).await?;
    Ok(tx_id)
}

#[tokio::test]
async fn first_spender_wins_across_nodes() {
    let ledger = Arc::new(MockLedger::default());
    let node_a = MockClient::new("http://a", ledger.clone());
    let node_b = MockClient::new("http://b", ledger.clone());
    let keys = KeyPair::generate();

    node_a.request_faucet_funds(&keys.address()).await.unwrap();
    let funded = node_a.outputs_by_address(&keys.address()).await.unwrap();
    assert_eq!(funded.len(), 1);

    let first = spend(&node_a, &keys, funded[0], Address::random())
        .await
        .unwrap();
    let second = spend(&node_b, &keys, funded[0], Address::random())
        .await
        .unwrap();

    assert_eq!(
        ledger.transaction_state(&first),
        Some(TransactionState::Accepted)
    );
    assert_eq!(
        ledger.transaction_state(&second),
        Some(TransactionState::Failed)
    );
    assert!(node_a
        .outputs_by_address(&keys.address())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(node_a.calls(Operation::PostBlock), 1);
    assert_eq!(node_b.calls(Operation::PostBlock), 1);
}

#[tokio::test]
async fn scripted_post_failures() {
    let ledger = Arc::new(MockLedger::default());
    let node = MockClient::new("http://a", ledger.clone());
    let keys = KeyPair::generate();
    let input = ledger.fund(keys.address(), 10, 0);

    node.fail_next_posts(1);
    let err = spend(&node, &keys, input, Address::random())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Status { status: 500, .. }));
    spend(&node, &keys, input, Address::random()).await.unwrap();
}

#[tokio::test]
async fn pending_until_accepted() {
    let ledger = Arc::new(MockLedger::default());
    ledger.set_auto_accept(false);
    let connector = Connector::new(vec![Arc::new(MockClient::new("http://a", ledger.clone()))]);
    let client = connector.get_client().unwrap();
    let keys = KeyPair::generate();
    let input = ledger.fund(keys.address(), 10, 0);

    let tx_id = spend(client.as_ref(), &keys, input, Address::random())
        .await
        .unwrap();
    let metadata = client.get_transaction_metadata(&tx_id).await.unwrap();
    assert_eq!(metadata.transaction_state, TransactionState::Pending);

    ledger.accept_pending();
    let metadata = client.get_transaction_metadata(&tx_id).await.unwrap();
    assert!(metadata.transaction_state.is_accepted());
}
