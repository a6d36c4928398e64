use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::types::*;
use super::EntityTransport;
use crate::config::ClientConfig;
use crate::error::StatechainError;
use crate::Result;

/// HTTP client for the statechain entity, optionally routed through a SOCKS proxy
pub struct HttpEntityClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpEntityClient {
    pub fn new(base_url: &str, tor_proxy: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(timeout);

        if let Some(proxy_url) = tor_proxy {
            log::info!("Routing entity requests through proxy {}", proxy_url);
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| StatechainError::Config(format!("Invalid proxy '{}': {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| StatechainError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(
            &config.statechain_entity_url,
            config.tor_proxy.as_deref(),
            config.request_timeout,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.url(path);
        log::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| StatechainError::EntityUnreachable(format!("{}: {}", url, e)))?;

        Self::decode(&url, response).await
    }

    async fn get<Resp: DeserializeOwned>(&self, path: &str) -> Result<Resp> {
        let url = self.url(path);
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StatechainError::EntityUnreachable(format!("{}: {}", url, e)))?;

        Self::decode(&url, response).await
    }

    async fn decode<Resp: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<Resp> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StatechainError::EntityUnreachable(format!("{}: {}", url, e)))?;

        if !status.is_success() {
            return Err(StatechainError::EntityRejected(format!(
                "{} returned {}: {}",
                url, status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            StatechainError::EntityRejected(format!("Unexpected response from {}: {}", url, e))
        })
    }
}

#[async_trait]
impl EntityTransport for HttpEntityClient {
    async fn transfer_sender(&self, request: &TransferSenderRequest) -> Result<TransferSenderResponse> {
        self.post("transfer/sender", request).await
    }

    async fn transfer_update_msg(&self, msg: &TransferUpdateMsg) -> Result<TransferUpdateMsgResponse> {
        self.post("transfer/update_msg", msg).await
    }

    async fn get_msg_addr(&self, auth_pubkey: &str) -> Result<GetMsgAddrResponse> {
        self.get(&format!("transfer/get_msg_addr/{}", auth_pubkey)).await
    }

    async fn transfer_receiver(&self, request: &TransferReceiverRequest) -> Result<TransferReceiverResponse> {
        self.post("transfer/receiver", request).await
    }
}
