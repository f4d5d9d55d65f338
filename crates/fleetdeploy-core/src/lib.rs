//! FleetDeploy Core Library
//!
//! Deploys signed app bundles to MDM-enrolled devices: a device registry,
//! a policy engine, a sign/upload/install pipeline, a compliance aggregator
//! and the orchestrator that runs them in order for a set of targets.

pub mod audit;
pub mod compliance;
pub mod config;
pub mod context;
pub mod distribution;
pub mod error;
pub mod orchestration;
pub mod policy;
pub mod registry;
pub mod signing;
pub mod transport;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{
        ComplianceConfiguration, ConfigStore, DistributionConfiguration, FleetConfig,
        FleetConfigFile, MdmConfiguration, RiskThresholds,
    };

    // Errors
    pub use crate::error::{
        ComplianceError, ConfigError, DeployError, DistributionError, ErrorKind, MdmError,
    };

    // Services
    pub use crate::audit::AuditLog;
    pub use crate::compliance::{ComplianceAggregator, DataAccessSubscription};
    pub use crate::context::FleetContext;
    pub use crate::distribution::DistributionPipeline;
    pub use crate::orchestration::{
        DeployRequest, DeploymentOrchestrator, FleetAnalytics, fleet_analytics,
    };
    pub use crate::policy::PolicyEngine;
    pub use crate::registry::{DeviceLease, DeviceRegistry, LifecycleState};

    // Transports
    pub use crate::signing::{AppSigner, CertificateSigner};
    pub use crate::transport::{
        DistributionTransport, HttpDistributionClient, HttpMdmClient, MdmTransport,
        SimulatedFleet,
    };

    // Domain types
    pub use crate::types::*;
}
