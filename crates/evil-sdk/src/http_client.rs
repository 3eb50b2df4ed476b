// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use evil_types::api::{
    BlockIssuanceResponse, BlockMetadata, CongestionResponse, OutputMetadata, ProtocolParameters,
    TransactionMetadata,
};
use evil_types::block::Block;
use evil_types::{AccountId, Address, BlockId, Output, OutputId, TransactionId};

use crate::client::{Client, ClientError};

const CORE_API: &str = "api/core/v3/";
const INDEXER_API: &str = "api/indexer/v2/";
const FAUCET_ENQUEUE: &str = "api/enqueue";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InfoResponse {
    protocol_parameters: ProtocolParameters,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostBlockResponse {
    block_id: BlockId,
}

#[derive(Deserialize)]
struct IndexerResponse {
    items: Vec<OutputId>,
}

#[derive(Serialize)]
struct FaucetRequest {
    address: Address,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

/// [Client] talking to a node's REST API over http.
pub struct HttpClient {
    url: String,
    base: Url,
    faucet: Option<Url>,
    client: reqwest::Client,
    protocol_parameters: OnceCell<ProtocolParameters>,
}

impl HttpClient {
    pub fn new(url: &str, faucet_url: Option<&str>) -> Result<Self, ClientError> {
        let parse = |u: &str| {
            // Without a trailing slash `join` would replace the last path segment.
            let u = if u.ends_with('/') {
                u.to_string()
            } else {
                format!("{u}/")
            };
            Url::parse(&u).map_err(|e| ClientError::Request {
                url: u.clone(),
                message: e.to_string(),
            })
        };
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            url: url.to_string(),
            base: parse(url)?,
            faucet: faucet_url.map(parse).transpose()?,
            client,
            protocol_parameters: OnceCell::new(),
        })
    }

    fn core(&self, route: &str) -> Result<Url, ClientError> {
        self.join(&self.base, &format!("{CORE_API}{route}"))
    }

    fn join(&self, base: &Url, route: &str) -> Result<Url, ClientError> {
        base.join(route).map_err(|e| ClientError::Request {
            url: self.url.clone(),
            message: e.to_string(),
        })
    }

    fn request_error(&self, e: reqwest::Error) -> ClientError {
        ClientError::Request {
            url: self.url.clone(),
            message: e.to_string(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, what: String) -> Result<T, ClientError> {
        debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        self.decode(response, what).await
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        what: String,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(what));
        }
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|e| e.error)
                .unwrap_or_else(|| status.to_string());
            return Err(ClientError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
                message,
            });
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Client for HttpClient {
    fn url(&self) -> &str {
        &self.url
    }

    async fn protocol_parameters(&self) -> Result<ProtocolParameters, ClientError> {
        self.protocol_parameters
            .get_or_try_init(|| async {
                let info: InfoResponse = self.get(self.core("info")?, "node info".into()).await?;
                Ok::<_, ClientError>(info.protocol_parameters)
            })
            .await
            .cloned()
    }

    async fn post_block(&self, block: &Block) -> Result<BlockId, ClientError> {
        let url = self.core("blocks")?;
        debug!(%url, "POST block");
        let response = self
            .client
            .post(url)
            .json(block)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let posted: PostBlockResponse = self.decode(response, "block".into()).await?;
        Ok(posted.block_id)
    }

    async fn get_output(&self, output_id: &OutputId) -> Result<Output, ClientError> {
        self.get(
            self.core(&format!("outputs/{output_id}"))?,
            format!("output {output_id}"),
        )
        .await
    }

    async fn get_output_metadata(
        &self,
        output_id: &OutputId,
    ) -> Result<OutputMetadata, ClientError> {
        self.get(
            self.core(&format!("outputs/{output_id}/metadata"))?,
            format!("output {output_id}"),
        )
        .await
    }

    async fn get_block_metadata(&self, block_id: &BlockId) -> Result<BlockMetadata, ClientError> {
        self.get(
            self.core(&format!("blocks/{block_id}/metadata"))?,
            format!("block {block_id}"),
        )
        .await
    }

    async fn get_transaction_metadata(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<TransactionMetadata, ClientError> {
        self.get(
            self.core(&format!("transactions/{transaction_id}/metadata"))?,
            format!("transaction {transaction_id}"),
        )
        .await
    }

    async fn get_block_issuance(&self) -> Result<BlockIssuanceResponse, ClientError> {
        self.get(self.core("blocks/issuance")?, "block issuance".into())
            .await
    }

    async fn get_congestion(
        &self,
        account_id: &AccountId,
    ) -> Result<CongestionResponse, ClientError> {
        self.get(
            self.core(&format!("accounts/{account_id}/congestion"))?,
            format!("account {account_id}"),
        )
        .await
    }

    async fn request_faucet_funds(&self, address: &Address) -> Result<(), ClientError> {
        let faucet = self
            .faucet
            .as_ref()
            .ok_or_else(|| ClientError::NoFaucet(self.url.clone()))?;
        let url = self.join(faucet, FAUCET_ENQUEUE)?;
        let response = self
            .client
            .post(url)
            .json(&FaucetRequest { address: *address })
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Faucet(format!("{status}: {body}")));
        }
        Ok(())
    }

    async fn outputs_by_address(&self, address: &Address) -> Result<Vec<OutputId>, ClientError> {
        let mut url = self.join(&self.base, &format!("{INDEXER_API}outputs/basic"))?;
        url.query_pairs_mut()
            .append_pair("address", &address.to_hex());
        let response: IndexerResponse = self.get(url, format!("outputs of {address}")).await?;
        Ok(response.items)
    }
}
