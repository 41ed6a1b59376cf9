//! reqwest-backed adapter for the upstream image host.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use crate::application::origin::{OriginError, ScanOrigin};
use crate::config::OriginSettings;
use crate::domain::scans::ScanRef;

use super::error::InfraError;

pub struct HttpOrigin {
    client: Client,
    base: Url,
    fetch_timeout: Duration,
    probe_timeout: Duration,
}

impl HttpOrigin {
    pub fn new(
        base: Url,
        user_agent: &str,
        fetch_timeout: Duration,
        probe_timeout: Duration,
    ) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|err| InfraError::origin_client(err.to_string()))?;
        Ok(Self {
            client,
            base,
            fetch_timeout,
            probe_timeout,
        })
    }

    pub fn from_settings(settings: &OriginSettings) -> Result<Self, InfraError> {
        let base = settings.base_url.clone().ok_or_else(|| {
            InfraError::origin_unconfigured(
                "origin.base_url is required (set it in the config file, \
                 SCAN_PROXY__ORIGIN__BASE_URL or --origin-base-url)",
            )
        })?;
        Self::new(
            base,
            &settings.user_agent,
            settings.fetch_timeout,
            settings.probe_timeout,
        )
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn url_for(&self, scan: &ScanRef) -> Result<Url, OriginError> {
        self.base
            .join(&scan.origin_path())
            .map_err(|err| OriginError::transport(format!("invalid origin url: {err}")))
    }
}

#[async_trait]
impl ScanOrigin for HttpOrigin {
    async fn fetch(&self, scan: &ScanRef) -> Result<Bytes, OriginError> {
        let url = self.url_for(scan)?;
        debug!(%url, "fetching scan from origin");

        let response = self
            .client
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(map_transport)?;
        check_status(response.status())?;
        response.bytes().await.map_err(map_transport)
    }

    async fn probe(&self, scan: &ScanRef) -> Result<(), OriginError> {
        let url = self.url_for(scan)?;
        debug!(%url, "probing origin");

        let response = self
            .client
            .head(url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(map_transport)?;
        check_status(response.status())
    }
}

fn check_status(status: StatusCode) -> Result<(), OriginError> {
    if status == StatusCode::NOT_FOUND {
        return Err(OriginError::NotFound);
    }
    if !status.is_success() {
        return Err(OriginError::Status(status.as_u16()));
    }
    Ok(())
}

fn map_transport(err: reqwest::Error) -> OriginError {
    if err.is_timeout() {
        OriginError::Timeout
    } else {
        OriginError::transport(err.to_string())
    }
}
