//! `verify:all`, `verify:core` and `verify:periphery`.
//!
//! Verification is best effort: a contract that cannot be verified is
//! logged and the run moves on to the next one.

use super::{TaskContext, TaskOutcome};
use crate::config::{AmbientEnv, VerifyDefaults};
use crate::deploy::steps::{
    EARNING_DISTRIBUTOR, KEEPER_FEE_PAYER, LENS, LIBRARIES, LIQUIDATOR, LIQUIDATOR_MOCK,
    MARKET_FACETS, MARKET_SETTLEMENT, ROUTER, VAULT,
};
use crate::deploy::{ArtifactStore, DeploymentRecord, DeploymentStore};
use crate::tasks::FACTORY;
use anyhow::{Context, Result};
use chromatic_api::{ContractVerifier, ExplorerClient, ExplorerError, VerificationRequest, VerificationStatus};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Which recorded deployments to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyScope {
    All,
    Core,
    Periphery,
}

impl VerifyScope {
    /// Deployment names in scope that the store has a record for.
    pub fn names(self, deployments: &DeploymentStore) -> Vec<String> {
        let candidates: Vec<String> = match self {
            VerifyScope::All => return deployments.all().into_iter().map(|(n, _)| n).collect(),
            VerifyScope::Core => LIBRARIES
                .iter()
                .chain(MARKET_FACETS.iter())
                .chain(
                    [
                        FACTORY,
                        KEEPER_FEE_PAYER,
                        EARNING_DISTRIBUTOR,
                        VAULT,
                        LIQUIDATOR,
                        LIQUIDATOR_MOCK,
                        MARKET_SETTLEMENT,
                    ]
                    .iter(),
                )
                .map(|s| s.to_string())
                .collect(),
            VerifyScope::Periphery => vec![ROUTER.to_string(), LENS.to_string()],
        };
        candidates
            .into_iter()
            .filter(|name| {
                let recorded = deployments.get(name).is_some();
                if !recorded {
                    debug!(contract = %name, "Not deployed on this network");
                }
                recorded
            })
            .collect()
    }
}

/// Per-contract results of a verification run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub verified: Vec<String>,
    pub already_verified: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Standard-JSON request for a recorded deployment.
///
/// Linked libraries are written into the compiler settings so the explorer
/// reproduces the deployed bytecode.
pub fn build_request(
    name: &str,
    record: &DeploymentRecord,
    artifacts: &ArtifactStore,
) -> Result<VerificationRequest> {
    let artifact = artifacts.get(name)?;
    let mut build = artifact.load_build_info()?;

    if !record.libraries.is_empty() {
        let settings = build
            .input
            .as_object_mut()
            .context("build info input is not an object")?
            .entry("settings")
            .or_insert_with(|| Value::Object(Default::default()));
        let libraries = settings
            .as_object_mut()
            .context("compiler settings are not an object")?
            .entry("libraries")
            .or_insert_with(|| Value::Object(Default::default()));
        let libraries = libraries
            .as_object_mut()
            .context("compiler libraries are not an object")?;
        for (library, address) in &record.libraries {
            let source = artifacts.get(library)?.source_name.clone();
            let entry = libraries
                .entry(source)
                .or_insert_with(|| Value::Object(Default::default()));
            if let Some(map) = entry.as_object_mut() {
                map.insert(library.clone(), Value::String(address.to_string()));
            }
        }
    }

    let version = &build.solc_long_version;
    Ok(VerificationRequest {
        address: record.address,
        contract_name: artifact.fully_qualified_name(),
        compiler_version: if version.starts_with('v') {
            version.clone()
        } else {
            format!("v{version}")
        },
        source: serde_json::to_string(&build.input)?,
        constructor_args: record.args.trim_start_matches("0x").to_string(),
    })
}

#[derive(Debug)]
enum Attempt {
    Verified,
    AlreadyVerified,
}

/// Submit, then poll until the explorer settles, within `settings.attempts`.
async fn verify_one<V: ContractVerifier + ?Sized>(
    verifier: &V,
    request: &VerificationRequest,
    settings: &VerifyDefaults,
) -> Result<Attempt, String> {
    let delay = Duration::from_millis(settings.poll_delay_ms);
    let attempts = settings.attempts.max(1);

    let mut guid = None;
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match verifier.submit_verification(request).await {
            Ok(g) => {
                guid = Some(g);
                break;
            }
            Err(ExplorerError::Rejected(msg)) if msg.to_lowercase().contains("already verified") => {
                return Ok(Attempt::AlreadyVerified);
            }
            Err(e) => {
                warn!(attempt, error = %e, "Verification submit failed");
                last_error = e.to_string();
                tokio::time::sleep(delay).await;
            }
        }
    }
    let Some(guid) = guid else {
        return Err(last_error);
    };

    let mut last_error = String::new();
    for attempt in 1..=attempts {
        tokio::time::sleep(delay).await;
        match verifier.check_status(&guid).await {
            Ok(VerificationStatus::Verified) => return Ok(Attempt::Verified),
            Ok(VerificationStatus::AlreadyVerified) => return Ok(Attempt::AlreadyVerified),
            Ok(VerificationStatus::Failed(reason)) => return Err(reason),
            Ok(VerificationStatus::Pending) | Err(ExplorerError::Pending) => {
                debug!(attempt, guid = %guid, "Verification pending");
            }
            Err(e) => {
                warn!(attempt, error = %e, "Verification status check failed");
                last_error = e.to_string();
            }
        }
    }
    Err(if last_error.is_empty() {
        format!("still pending after {attempts} attempts")
    } else {
        last_error
    })
}

/// Verify `names` one at a time against `verifier`.
pub async fn verify_with<V: ContractVerifier + ?Sized>(
    verifier: &V,
    deployments: &DeploymentStore,
    artifacts: &ArtifactStore,
    names: &[String],
    settings: &VerifyDefaults,
) -> VerifyReport {
    let mut report = VerifyReport::default();

    for name in names {
        let Some(record) = deployments.get(name) else {
            report.failed.push((name.clone(), "no deployment record".to_string()));
            continue;
        };

        match verifier.is_verified(record.address).await {
            Ok(true) => {
                info!(contract = %name, address = %record.address, "Already verified");
                report.already_verified.push(name.clone());
                continue;
            }
            Ok(false) => {}
            Err(e) => debug!(contract = %name, error = %e, "Source lookup failed, submitting anyway"),
        }

        let request = match build_request(name, &record, artifacts) {
            Ok(request) => request,
            Err(e) => {
                warn!(contract = %name, error = %format!("{e:#}"), "Cannot build verification request");
                report.failed.push((name.clone(), format!("{e:#}")));
                continue;
            }
        };

        match verify_one(verifier, &request, settings).await {
            Ok(Attempt::Verified) => {
                info!(contract = %name, address = %record.address, "Verified");
                report.verified.push(name.clone());
            }
            Ok(Attempt::AlreadyVerified) => {
                info!(contract = %name, address = %record.address, "Already verified");
                report.already_verified.push(name.clone());
            }
            Err(reason) => {
                warn!(contract = %name, address = %record.address, reason = %reason, "Verification failed");
                report.failed.push((name.clone(), reason));
            }
        }
    }

    report
}

/// Verify the scope's deployments on the network's explorer.
#[instrument(skip(tasks), fields(network = %tasks.network.name()))]
pub async fn run(tasks: &TaskContext, scope: VerifyScope) -> Result<TaskOutcome> {
    let Some(explorer) = &tasks.network.network.explorer else {
        return Ok(TaskOutcome::skipped(format!(
            "no explorer configured for {}",
            tasks.network.name()
        )));
    };
    let api_key = AmbientEnv::get()
        .lookup(&explorer.api_key_env)
        .map(str::to_string)
        .or_else(|| std::env::var(&explorer.api_key_env).ok());
    let Some(api_key) = api_key else {
        return Ok(TaskOutcome::skipped(format!("{} is not set", explorer.api_key_env)));
    };

    let names = scope.names(&tasks.deployments);
    if names.is_empty() {
        return Ok(TaskOutcome::skipped("nothing deployed in scope"));
    }

    let client = ExplorerClient::new(&explorer.api_url, api_key);
    let report = verify_with(
        &client,
        &tasks.deployments,
        &tasks.artifacts,
        &names,
        &tasks.protocol.verify,
    )
    .await;

    info!(
        verified = report.verified.len(),
        already_verified = report.already_verified.len(),
        failed = report.failed.len(),
        "Verification finished"
    );
    if let Some(browser) = &explorer.browser_url {
        for name in &report.verified {
            if let Some(address) = tasks.deployments.address(name) {
                info!(contract = %name, url = %format!("{browser}/address/{address}#code"), "Explorer link");
            }
        }
    }
    Ok(TaskOutcome::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::Artifact;
    use alloy::primitives::{Address, B256};
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedVerifier {
        verified: Vec<Address>,
        submits: Mutex<VecDeque<Result<String, ExplorerError>>>,
        statuses: Mutex<VecDeque<VerificationStatus>>,
        requests: Mutex<Vec<VerificationRequest>>,
    }

    #[async_trait]
    impl ContractVerifier for ScriptedVerifier {
        async fn submit_verification(
            &self,
            request: &VerificationRequest,
        ) -> Result<String, ExplorerError> {
            self.requests.lock().push(request.clone());
            self.submits
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok("guid".to_string()))
        }

        async fn check_status(&self, _guid: &str) -> Result<VerificationStatus, ExplorerError> {
            Ok(self
                .statuses
                .lock()
                .pop_front()
                .unwrap_or(VerificationStatus::Verified))
        }

        async fn is_verified(&self, address: Address) -> Result<bool, ExplorerError> {
            Ok(self.verified.contains(&address))
        }
    }

    fn settings() -> VerifyDefaults {
        VerifyDefaults {
            attempts: 5,
            poll_delay_ms: 0,
        }
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        deployments: DeploymentStore,
        artifacts: ArtifactStore,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let build_info = tmp.path().join("build.json");
        std::fs::write(
            &build_info,
            r#"{"solcLongVersion":"0.8.19+commit.7dd6d404","input":{"language":"Solidity","settings":{}}}"#,
        )
        .unwrap();

        let mut artifacts = ArtifactStore::default();
        for (name, source) in [
            ("ChromaticVault", "contracts/core/ChromaticVault.sol"),
            ("MarketDeployerLib", "contracts/core/libraries/deployer/MarketDeployer.sol"),
            ("ChromaticMarketFactory", "contracts/core/ChromaticMarketFactory.sol"),
        ] {
            artifacts.insert(Artifact {
                contract_name: name.to_string(),
                source_name: source.to_string(),
                abi: serde_json::json!([]),
                bytecode: "0x00".to_string(),
                link_references: Default::default(),
                build_info: Some(build_info.clone()),
            });
        }

        let deployments = DeploymentStore::open(tmp.path(), "arbitrum_sepolia").unwrap();
        for (i, name) in ["ChromaticVault", "ChromaticMarketFactory", "ChromaticRouter"]
            .iter()
            .enumerate()
        {
            let mut libraries = BTreeMap::new();
            if *name == "ChromaticMarketFactory" {
                libraries.insert("MarketDeployerLib".to_string(), Address::repeat_byte(0x77));
            }
            deployments
                .save(
                    name,
                    DeploymentRecord {
                        address: Address::repeat_byte(i as u8 + 1),
                        abi: serde_json::json!([]),
                        transaction_hash: None,
                        args: "0xabcd".to_string(),
                        libraries,
                        bytecode_hash: B256::ZERO,
                        deployed_at: Utc::now(),
                    },
                )
                .unwrap();
        }

        Fixture {
            _tmp: tmp,
            deployments,
            artifacts,
        }
    }

    #[test]
    fn test_scope_names_filter_to_recorded() {
        let f = fixture();
        assert_eq!(
            VerifyScope::Core.names(&f.deployments),
            vec!["ChromaticMarketFactory", "ChromaticVault"]
        );
        assert_eq!(VerifyScope::Periphery.names(&f.deployments), vec!["ChromaticRouter"]);
        assert_eq!(VerifyScope::All.names(&f.deployments).len(), 3);
    }

    #[test]
    fn test_build_request_links_libraries() {
        let f = fixture();
        let record = f.deployments.get("ChromaticMarketFactory").unwrap();
        let request = build_request("ChromaticMarketFactory", &record, &f.artifacts).unwrap();
        assert_eq!(request.compiler_version, "v0.8.19+commit.7dd6d404");
        assert_eq!(request.constructor_args, "abcd");
        assert_eq!(
            request.contract_name,
            "contracts/core/ChromaticMarketFactory.sol:ChromaticMarketFactory"
        );
        let input: Value = serde_json::from_str(&request.source).unwrap();
        let linked = &input["settings"]["libraries"]
            ["contracts/core/libraries/deployer/MarketDeployer.sol"]["MarketDeployerLib"];
        assert_eq!(
            linked.as_str().unwrap(),
            Address::repeat_byte(0x77).to_string()
        );
    }

    #[tokio::test]
    async fn test_retries_then_verifies() {
        let f = fixture();
        let verifier = ScriptedVerifier::default();
        verifier
            .submits
            .lock()
            .extend([Err(ExplorerError::Malformed("502".into())), Ok("g1".to_string())]);
        verifier.statuses.lock().extend([
            VerificationStatus::Pending,
            VerificationStatus::Verified,
        ]);

        let names = vec!["ChromaticVault".to_string()];
        let report =
            verify_with(&verifier, &f.deployments, &f.artifacts, &names, &settings()).await;
        assert_eq!(report.verified, names);
        assert_eq!(verifier.requests.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_run() {
        let f = fixture();
        let verifier = ScriptedVerifier {
            verified: vec![Address::repeat_byte(2)],
            ..Default::default()
        };
        verifier
            .statuses
            .lock()
            .push_back(VerificationStatus::Failed("Fail - Unable to verify".into()));

        let names = vec![
            "ChromaticVault".to_string(),
            "ChromaticMarketFactory".to_string(),
            "ChromaticRouter".to_string(),
        ];
        let report =
            verify_with(&verifier, &f.deployments, &f.artifacts, &names, &settings()).await;
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].0, "ChromaticVault");
        // router has no artifact in the fixture
        assert_eq!(report.failed[1].0, "ChromaticRouter");
        assert_eq!(report.already_verified, vec!["ChromaticMarketFactory"]);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let f = fixture();
        let verifier = ScriptedVerifier::default();
        verifier
            .submits
            .lock()
            .extend((0..5).map(|_| Err(ExplorerError::Malformed("timeout".into()))));

        let names = vec!["ChromaticVault".to_string()];
        let report =
            verify_with(&verifier, &f.deployments, &f.artifacts, &names, &settings()).await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(verifier.requests.lock().len(), 5);
    }

    #[tokio::test]
    async fn test_status_outcomes_after_submit() {
        let f = fixture();
        let record = f.deployments.get("ChromaticVault").unwrap();
        let request = build_request("ChromaticVault", &record, &f.artifacts).unwrap();

        // never leaves pending
        let verifier = ScriptedVerifier::default();
        verifier
            .statuses
            .lock()
            .extend((0..5).map(|_| VerificationStatus::Pending));
        let err = verify_one(&verifier, &request, &settings()).await.unwrap_err();
        assert_eq!(err, "still pending after 5 attempts");

        // a submit error is not reported once the status polls ran
        let verifier = ScriptedVerifier::default();
        verifier
            .submits
            .lock()
            .extend([Err(ExplorerError::Malformed("502".into())), Ok("g1".to_string())]);
        verifier
            .statuses
            .lock()
            .extend((0..5).map(|_| VerificationStatus::Pending));
        let err = verify_one(&verifier, &request, &settings()).await.unwrap_err();
        assert_eq!(err, "still pending after 5 attempts");

        // every submit fails: the last submit error is returned
        let verifier = ScriptedVerifier::default();
        verifier
            .submits
            .lock()
            .extend((0..5).map(|_| Err(ExplorerError::Malformed("timeout".into()))));
        let err = verify_one(&verifier, &request, &settings()).await.unwrap_err();
        assert!(err.contains("timeout"));
    }
}
