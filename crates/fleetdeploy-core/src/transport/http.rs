//! JSON-over-HTTPS clients for the MDM and distribution servers.
//!
//! Deadlines are applied by the callers, so the underlying client has none.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::{DistributionTransport, MdmTransport, TransportError, UploadReceipt};
use crate::config::{DistributionConfiguration, MdmConfiguration};
use crate::types::{
    AppBundle, Device, EnrollmentProfile, EnrollmentResponse, MdmPolicy, RawDeviceHealth,
};

const USER_AGENT: &str = concat!("fleetdeploy/", env!("CARGO_PKG_VERSION"));

fn build_client() -> Result<Client, TransportError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| TransportError::Network(format!("Failed to build HTTP client: {}", e)))
}

/// Append path segments to a base URL, keeping any base path.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, TransportError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| TransportError::Network(format!("{} cannot be used as a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn send(request: RequestBuilder) -> Result<Response, TransportError> {
    let response = request
        .send()
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    if status.is_client_error()
        && status != StatusCode::REQUEST_TIMEOUT
        && status != StatusCode::TOO_MANY_REQUESTS
    {
        Err(TransportError::Rejected(format!("HTTP {}: {}", status, message)))
    } else {
        Err(TransportError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
    response.json().await.map_err(|e| TransportError::Server {
        status: 200,
        message: format!("malformed response body: {}", e),
    })
}

/// MDM server client rooted at `<server_url>/api/v1/organizations/<org>`.
#[derive(Debug, Clone)]
pub struct HttpMdmClient {
    client: Client,
    base: Url,
    organization_id: String,
    auth_token: String,
}

impl HttpMdmClient {
    pub fn new(config: &MdmConfiguration) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client()?,
            base: config.server_url().clone(),
            organization_id: config.organization_id().to_string(),
            auth_token: config.auth_token().to_string(),
        })
    }

    fn url(&self, tail: &[&str]) -> Result<Url, TransportError> {
        let mut segments = vec!["api", "v1", "organizations", self.organization_id.as_str()];
        segments.extend_from_slice(tail);
        endpoint(&self.base, &segments)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        if self.auth_token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.auth_token)
        }
    }
}

#[async_trait]
impl MdmTransport for HttpMdmClient {
    async fn enroll(
        &self,
        profile: &EnrollmentProfile,
    ) -> Result<EnrollmentResponse, TransportError> {
        let url = self.url(&["enrollments"])?;
        tracing::debug!(%url, device = %profile.device_identifier, "POST enrollment");
        let response = send(self.authed(self.client.post(url).json(profile))).await?;
        read_json(response).await
    }

    async fn unenroll(&self, device_identifier: &str) -> Result<(), TransportError> {
        let url = self.url(&["devices", device_identifier])?;
        tracing::debug!(%url, "DELETE device");
        match send(self.authed(self.client.delete(url))).await {
            Ok(_) => Ok(()),
            Err(TransportError::Rejected(msg)) if msg.starts_with("HTTP 404") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn enrolled_devices(&self) -> Result<Vec<Device>, TransportError> {
        let url = self.url(&["devices"])?;
        tracing::debug!(%url, "GET devices");
        let response = send(self.authed(self.client.get(url))).await?;
        read_json(response).await
    }

    async fn device_health(
        &self,
        device_identifier: &str,
    ) -> Result<RawDeviceHealth, TransportError> {
        let url = self.url(&["devices", device_identifier, "health"])?;
        tracing::debug!(%url, "GET health");
        let response = send(self.authed(self.client.get(url))).await?;
        read_json(response).await
    }

    async fn apply_policies(
        &self,
        device_identifier: &str,
        policies: &[MdmPolicy],
    ) -> Result<(), TransportError> {
        let url = self.url(&["devices", device_identifier, "policies"])?;
        tracing::debug!(%url, count = policies.len(), "PUT policies");
        send(self.authed(self.client.put(url).json(policies))).await?;
        Ok(())
    }

    async fn install_app(
        &self,
        device_identifier: &str,
        bundle: &AppBundle,
    ) -> Result<(), TransportError> {
        let url = self.url(&["devices", device_identifier, "apps"])?;
        tracing::debug!(%url, app = %bundle.identifier(), "POST install");
        send(self.authed(self.client.post(url).json(bundle))).await?;
        Ok(())
    }

    async fn remove_app(
        &self,
        device_identifier: &str,
        app_identifier: &str,
    ) -> Result<(), TransportError> {
        let url = self.url(&["devices", device_identifier, "apps", app_identifier])?;
        tracing::debug!(%url, "DELETE app");
        send(self.authed(self.client.delete(url))).await?;
        Ok(())
    }
}

/// Distribution server client rooted at `<app_store_url>/api/v1/apps`.
#[derive(Debug, Clone)]
pub struct HttpDistributionClient {
    client: Client,
    base: Url,
    auth_token: String,
}

impl HttpDistributionClient {
    /// The distribution server shares the MDM bearer token.
    pub fn new(
        config: &DistributionConfiguration,
        auth_token: impl Into<String>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client()?,
            base: config.app_store_url().clone(),
            auth_token: auth_token.into(),
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        if self.auth_token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.auth_token)
        }
    }
}

#[async_trait]
impl DistributionTransport for HttpDistributionClient {
    async fn upload(&self, bundle: &AppBundle) -> Result<UploadReceipt, TransportError> {
        let url = endpoint(&self.base, &["api", "v1", "apps", bundle.identifier(), "uploads"])?;
        tracing::debug!(%url, "POST upload");
        let response = send(self.authed(self.client.post(url).json(bundle))).await?;
        read_json(response).await
    }

    async fn catalog(&self) -> Result<Vec<AppBundle>, TransportError> {
        let url = endpoint(&self.base, &["api", "v1", "apps"])?;
        tracing::debug!(%url, "GET catalog");
        let response = send(self.authed(self.client.get(url))).await?;
        read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keeps_base_path_and_escapes_segments() {
        let base = Url::parse("https://mdm.test.com/tenant/").unwrap();
        let url = endpoint(&base, &["api", "v1", "devices", "device 001"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://mdm.test.com/tenant/api/v1/devices/device%20001"
        );
    }

    #[test]
    fn mdm_client_scopes_urls_to_organization() {
        let config = MdmConfiguration::new("https://mdm.test.com", "test-org-id", "token").unwrap();
        let client = HttpMdmClient::new(&config).unwrap();
        let url = client.url(&["devices", "d1", "health"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://mdm.test.com/api/v1/organizations/test-org-id/devices/d1/health"
        );
    }
}
