//! Deployment orchestration.
//!
//! - [`artifacts`]: Hardhat artifacts and library linking
//! - [`store`]: per-network deployment records and migration ids
//! - [`orchestrator`]: idempotent `deploy`, step trait and runner
//! - [`steps`]: the protocol's deployment steps

pub mod artifacts;
pub mod orchestrator;
pub mod steps;
pub mod store;

pub use artifacts::{Artifact, ArtifactError, ArtifactStore, BuildInfo};
pub use orchestrator::{
    init_code, DeployContext, DeployOptions, DeployResult, DeployStep, Orchestrator, RunSummary,
    SkipReason,
};
pub use steps::default_orchestrator;
pub use store::{DeployError, DeploymentRecord, DeploymentStore};
