//! Chromatic API clients for external services.
//!
//! This crate provides HTTP clients for:
//! - Etherscan-compatible explorers (Arbiscan): contract source verification

mod explorer;

pub use explorer::{
    ApiEnvelope, ContractVerifier, ExplorerClient, ExplorerError, VerificationRequest,
    VerificationStatus,
};
