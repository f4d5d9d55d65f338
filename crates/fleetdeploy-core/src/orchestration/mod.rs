//! Deployment orchestration across the registry, policy engine, pipeline
//! and compliance aggregator.

pub mod analytics;
pub mod deploy;

pub use analytics::{FleetAnalytics, fleet_analytics};
pub use deploy::{DeployRequest, DeploymentOrchestrator};
