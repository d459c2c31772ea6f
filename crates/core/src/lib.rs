//! Chromatic protocol operations.
//!
//! This crate provides:
//! - Idempotent deployment steps with persisted per-network records
//! - Diamond facet hotfix planning and cutting for every market
//! - Operational tasks (factory, oracle providers, settlement tokens,
//!   automation upkeep, explorer verification, mock swap router)
//! - An interactive wallet session over a deployed market
//! - A scripted-price liquidation keeper simulation
//! - An event indexer projecting logs into write-once entities
//! - Protocol fee and fixed-point math shared with the scenario tests

pub mod config;
pub mod deploy;
pub mod facets;
pub mod fees;
pub mod indexer;
pub mod keeper;
pub mod math;
pub mod session;
pub mod tasks;

pub use config::{AmbientEnv, NetworkConfig, NetworkRegistry, ProtocolConfig};
pub use deploy::{default_orchestrator, DeployContext, DeploymentStore, Orchestrator};
pub use facets::{plan_facet_cuts, CutPlan, DiamondLoupeReader, FacetRole, HotfixFacets};
pub use indexer::{EntityStore, EventHandlers, IndexerRunner, JsonStore, MemoryStore, StateReader};
pub use keeper::{KeeperMarket, KeeperSimulation, KeeperStep, PriceDriver};
pub use session::{ReplCommand, Session};
pub use tasks::{TaskContext, TaskOutcome};
