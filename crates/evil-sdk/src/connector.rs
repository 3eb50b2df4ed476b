// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::client::{Client, ClientError};
use crate::http_client::HttpClient;

/// A mutable pool of node clients handed out in round-robin order.
pub struct Connector {
    clients: RwLock<Vec<Arc<dyn Client>>>,
    next: AtomicUsize,
    indexer: RwLock<Option<Arc<dyn Client>>>,
}

impl Connector {
    pub fn new(clients: Vec<Arc<dyn Client>>) -> Self {
        Self {
            clients: RwLock::new(clients),
            next: AtomicUsize::new(0),
            indexer: RwLock::new(None),
        }
    }

    /// Build http clients for `urls`. Every client can reach the faucet at `faucet_url`.
    pub fn connect(urls: &[String], faucet_url: Option<&str>) -> Result<Self, ClientError> {
        let clients = urls
            .iter()
            .map(|url| {
                HttpClient::new(url, faucet_url).map(|c| Arc::new(c) as Arc<dyn Client>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        info!(nodes = clients.len(), "connected to nodes");
        Ok(Self::new(clients))
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    pub fn urls(&self) -> Vec<String> {
        self.clients
            .read()
            .iter()
            .map(|c| c.url().to_string())
            .collect()
    }

    /// The next client in round-robin order.
    pub fn get_client(&self) -> Result<Arc<dyn Client>, ClientError> {
        let clients = self.clients.read();
        if clients.is_empty() {
            return Err(ClientError::NoClients);
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % clients.len();
        Ok(clients[index].clone())
    }

    /// Up to `n` distinct clients, continuing the round-robin order. Returns fewer than
    /// `n` clients when the pool is smaller.
    pub fn get_clients(&self, n: usize) -> Vec<Arc<dyn Client>> {
        let clients = self.clients.read();
        if clients.is_empty() {
            return vec![];
        }
        let n = n.min(clients.len());
        let start = self.next.fetch_add(n, Ordering::Relaxed);
        (0..n)
            .map(|i| clients[(start + i) % clients.len()].clone())
            .collect()
    }

    pub fn add_client(&self, client: Arc<dyn Client>) {
        info!(url = client.url(), "adding client");
        self.clients.write().push(client);
    }

    /// Remove every client with the given url; returns whether any was removed.
    pub fn remove_client(&self, url: &str) -> bool {
        let mut clients = self.clients.write();
        let before = clients.len();
        clients.retain(|c| c.url() != url);
        let removed = clients.len() != before;
        if removed {
            info!(url, "removed client");
        }
        removed
    }

    pub fn set_indexer_client(&self, client: Arc<dyn Client>) {
        *self.indexer.write() = Some(client);
    }

    /// The client used for indexer and faucet requests; the first pool client unless one
    /// was set explicitly.
    pub fn get_indexer_client(&self) -> Result<Arc<dyn Client>, ClientError> {
        if let Some(indexer) = self.indexer.read().as_ref() {
            return Ok(indexer.clone());
        }
        self.clients
            .read()
            .first()
            .cloned()
            .ok_or(ClientError::NoClients)
    }
}
