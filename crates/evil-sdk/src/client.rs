// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use thiserror::Error;

use evil_types::api::{
    BlockIssuanceResponse, BlockMetadata, CongestionResponse, OutputMetadata, ProtocolParameters,
    TransactionMetadata,
};
use evil_types::block::Block;
use evil_types::{AccountId, Address, BlockId, Output, OutputId, TransactionId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} responded with status {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("faucet request failed: {0}")]
    Faucet(String),

    #[error("no faucet configured for {0}")]
    NoFaucet(String),

    #[error("no clients available")]
    NoClients,
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

/// Access to a single node's API.
#[async_trait]
pub trait Client: Send + Sync {
    /// Base url of the node, used to identify the client.
    fn url(&self) -> &str;

    async fn protocol_parameters(&self) -> Result<ProtocolParameters, ClientError>;

    async fn post_block(&self, block: &Block) -> Result<BlockId, ClientError>;

    async fn get_output(&self, output_id: &OutputId) -> Result<Output, ClientError>;

    async fn get_output_metadata(&self, output_id: &OutputId)
        -> Result<OutputMetadata, ClientError>;

    async fn get_block_metadata(&self, block_id: &BlockId) -> Result<BlockMetadata, ClientError>;

    async fn get_transaction_metadata(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<TransactionMetadata, ClientError>;

    /// Parents and commitment to issue the next block on.
    async fn get_block_issuance(&self) -> Result<BlockIssuanceResponse, ClientError>;

    async fn get_congestion(&self, account_id: &AccountId)
        -> Result<CongestionResponse, ClientError>;

    /// Ask the faucet attached to this node to fund `address`.
    async fn request_faucet_funds(&self, address: &Address) -> Result<(), ClientError>;

    /// Indexer lookup of the unspent basic outputs owned by `address`.
    async fn outputs_by_address(&self, address: &Address) -> Result<Vec<OutputId>, ClientError>;
}
