//! Fleet context for unified dependency injection.

use std::sync::Arc;

use crate::audit::AuditLog;
use crate::compliance::ComplianceAggregator;
use crate::config::FleetConfig;
use crate::distribution::DistributionPipeline;
use crate::error::{DeployError, DistributionError, MdmError};
use crate::orchestration::DeploymentOrchestrator;
use crate::policy::PolicyEngine;
use crate::registry::DeviceRegistry;
use crate::transport::{
    DistributionTransport, HttpDistributionClient, HttpMdmClient, MdmTransport, SimulatedFleet,
};

/// Every service of the engine, wired to one audit log.
///
/// Frontends create this once and pass it to commands.
#[derive(Debug, Clone)]
pub struct FleetContext {
    config: FleetConfig,
    audit: Arc<AuditLog>,
    registry: Arc<DeviceRegistry>,
    distribution: Arc<DistributionPipeline>,
    compliance: Arc<ComplianceAggregator>,
    orchestrator: DeploymentOrchestrator,
}

impl FleetContext {
    /// Create a context over explicit transports.
    pub fn new(
        config: FleetConfig,
        mdm: Arc<dyn MdmTransport>,
        distribution: Arc<dyn DistributionTransport>,
    ) -> Self {
        let audit = Arc::new(AuditLog::new());
        let registry = Arc::new(DeviceRegistry::new(
            config.mdm.clone(),
            mdm,
            Arc::clone(&audit),
        ));
        let distribution = Arc::new(DistributionPipeline::new(
            config.distribution.clone(),
            distribution,
            Arc::clone(&registry),
            Arc::clone(&audit),
        ));
        let compliance = Arc::new(ComplianceAggregator::new(
            config.compliance.clone(),
            Arc::clone(&audit),
        ));
        let orchestrator = DeploymentOrchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&distribution),
            Arc::clone(&compliance),
            Arc::clone(&audit),
        );
        Self {
            config,
            audit,
            registry,
            distribution,
            compliance,
            orchestrator,
        }
    }

    /// Context talking to the configured MDM and distribution servers.
    pub fn with_http(config: FleetConfig) -> Result<Self, DeployError> {
        let mdm =
            HttpMdmClient::new(&config.mdm).map_err(|e| e.into_mdm(MdmError::NetworkError))?;
        let store = HttpDistributionClient::new(&config.distribution, config.mdm.auth_token())
            .map_err(|e| e.into_distribution(DistributionError::NetworkError))?;
        Ok(Self::new(config, Arc::new(mdm), Arc::new(store)))
    }

    /// Context backed by an in-process fleet. Returns the fleet so callers
    /// can seed and script it.
    pub fn simulated(config: FleetConfig) -> (Self, Arc<SimulatedFleet>) {
        Self::simulated_with(config, SimulatedFleet::new())
    }

    pub fn simulated_with(
        config: FleetConfig,
        fleet: SimulatedFleet,
    ) -> (Self, Arc<SimulatedFleet>) {
        let fleet = Arc::new(fleet);
        let context = Self::new(config, fleet.clone(), fleet.clone());
        (context, fleet)
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn policies(&self) -> PolicyEngine {
        PolicyEngine::new(Arc::clone(&self.registry))
    }

    pub fn distribution(&self) -> &Arc<DistributionPipeline> {
        &self.distribution
    }

    pub fn compliance(&self) -> &Arc<ComplianceAggregator> {
        &self.compliance
    }

    pub fn orchestrator(&self) -> &DeploymentOrchestrator {
        &self.orchestrator
    }
}
