//! Direct HTTP polling transport.
//!
//! Talks to the Roon HTTP API extension with plain `GET` requests. Every
//! endpoint takes its arguments as query parameters and answers with JSON.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use super::traits::{RoonBrowse, RoonControl, RoonZones, TransportCommand};
use super::types::{PlaylistCatalog, ZoneChange, ZoneDirectory, ZonesResponse};
use super::{TransportError, TransportResult};
use crate::protocol_constants::ARTWORK_SIZE;

/// Polling client for the Roon HTTP API extension.
///
/// Cheap to clone; the underlying `reqwest::Client` pools connections.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport for the extension at `host:port`.
    pub fn new(client: Client, host: &str, port: u16) -> Self {
        Self {
            client,
            base_url: format!("http://{}:{}", host, port),
        }
    }

    /// Base URL of the extension.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str, params: &[(&str, String)]) -> TransportResult<Url> {
        let raw = format!("{}/{}", self.base_url, endpoint);
        if params.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, params)
        }
        .map_err(|e| TransportError::Parse(format!("invalid URL for {}: {}", endpoint, e)))
    }

    /// Issues a GET and returns the response if the status is a success.
    async fn get(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> TransportResult<reqwest::Response> {
        let url = self.url(endpoint, params)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!(
                "[Transport] {} failed with status {}: {}",
                endpoint,
                status.as_u16(),
                body
            );
            return Err(TransportError::HttpStatus(status.as_u16(), body));
        }
        Ok(response)
    }

    async fn query<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> TransportResult<T> {
        let response = self.get(endpoint, params).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::Parse(format!("{}: {}", endpoint, e)))
    }
}

#[async_trait]
impl RoonZones for HttpTransport {
    async fn fetch_zones(&self) -> TransportResult<ZoneDirectory> {
        let response: ZonesResponse = self.query("zones", &[]).await?;
        Ok(ZoneDirectory::from_response(response))
    }

    fn subscribe_changes(&self) -> Option<mpsc::Receiver<ZoneChange>> {
        None
    }

    fn image_url(&self, image_key: &str) -> String {
        let size = ARTWORK_SIZE.to_string();
        let params = [
            ("image_key", image_key.to_string()),
            ("width", size.clone()),
            ("height", size),
            ("scale", "fit".to_string()),
        ];
        match self.url("image", &params) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}/image?image_key={}", self.base_url, image_key),
        }
    }
}

#[async_trait]
impl RoonControl for HttpTransport {
    async fn send(&self, command: TransportCommand) -> TransportResult<()> {
        log::debug!("[Transport] {} {:?}", command.endpoint(), command.params());
        self.get(command.endpoint(), &command.params()).await?;
        Ok(())
    }
}

#[async_trait]
impl RoonBrowse for HttpTransport {
    async fn browse_playlists(&self) -> TransportResult<PlaylistCatalog> {
        self.query("browse/playlists", &[]).await
    }
}
