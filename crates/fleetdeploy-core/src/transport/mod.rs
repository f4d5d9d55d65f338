//! Remote collaborators: the MDM server and the distribution server.
//!
//! The engine only talks to these traits. [`http`] speaks JSON over HTTPS,
//! [`simulated`] keeps an in-process fleet for dry runs and tests.

pub mod http;
pub mod simulated;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{DistributionError, MdmError};
use crate::types::{
    AppBundle, Device, EnrollmentProfile, EnrollmentResponse, MdmPolicy, RawDeviceHealth,
};

pub use http::{HttpDistributionClient, HttpMdmClient};
pub use simulated::SimulatedFleet;

/// Failure reported by a transport, before the engine classifies it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The server understood the request and refused it.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
}

impl TransportError {
    /// Map onto an MDM error, using `rejected` for server refusals.
    pub(crate) fn into_mdm(self, rejected: fn(String) -> MdmError) -> MdmError {
        match self {
            TransportError::Rejected(msg) => rejected(msg),
            TransportError::Network(msg) => MdmError::NetworkError(msg),
            TransportError::Server { status, message } => {
                MdmError::ServerError(format!("HTTP {}: {}", status, message))
            }
        }
    }

    pub(crate) fn into_distribution(
        self,
        rejected: fn(String) -> DistributionError,
    ) -> DistributionError {
        match self {
            TransportError::Rejected(msg) => rejected(msg),
            TransportError::Network(msg) => DistributionError::NetworkError(msg),
            TransportError::Server { status, message } => {
                DistributionError::ServerError(format!("HTTP {}: {}", status, message))
            }
        }
    }
}

/// Run one remote call under its own deadline. Expiry is a network error.
pub(crate) async fn with_timeout<T, F>(
    timeout: Duration,
    operation: &str,
    fut: F,
) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Network(format!(
            "{} timed out after {:?}",
            operation, timeout
        ))),
    }
}

/// Device management operations exposed by an MDM server.
#[async_trait]
pub trait MdmTransport: Send + Sync {
    async fn enroll(&self, profile: &EnrollmentProfile)
    -> Result<EnrollmentResponse, TransportError>;

    /// Unknown devices are not an error.
    async fn unenroll(&self, device_identifier: &str) -> Result<(), TransportError>;

    async fn enrolled_devices(&self) -> Result<Vec<Device>, TransportError>;

    async fn device_health(&self, device_identifier: &str)
    -> Result<RawDeviceHealth, TransportError>;

    async fn apply_policies(
        &self,
        device_identifier: &str,
        policies: &[MdmPolicy],
    ) -> Result<(), TransportError>;

    async fn install_app(
        &self,
        device_identifier: &str,
        bundle: &AppBundle,
    ) -> Result<(), TransportError>;

    async fn remove_app(
        &self,
        device_identifier: &str,
        app_identifier: &str,
    ) -> Result<(), TransportError>;
}

/// Receipt returned by the distribution server for an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub upload_id: String,
    pub destination: Url,
    pub file_size: u64,
}

/// App catalog operations exposed by the distribution server.
#[async_trait]
pub trait DistributionTransport: Send + Sync {
    async fn upload(&self, bundle: &AppBundle) -> Result<UploadReceipt, TransportError>;

    async fn catalog(&self) -> Result<Vec<AppBundle>, TransportError>;
}
