//! Ordered, idempotent deployment steps.

use super::{Artifact, DeployError, DeploymentRecord, DeploymentStore};
use crate::tasks::TaskContext;
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::rpc::types::TransactionReceipt;
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/// How to deploy one named contract.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Artifact name when it differs from the deployment name
    pub artifact: Option<String>,
    /// ABI-encoded constructor arguments
    pub args: Bytes,
    /// Library name -> deployed address
    pub libraries: BTreeMap<String, Address>,
}

impl DeployOptions {
    pub fn args(args: impl Into<Bytes>) -> Self {
        Self {
            args: args.into(),
            ..Default::default()
        }
    }

    pub fn artifact(mut self, name: impl Into<String>) -> Self {
        self.artifact = Some(name.into());
        self
    }

    pub fn library(mut self, name: impl Into<String>, address: Address) -> Self {
        self.libraries.insert(name.into(), address);
        self
    }
}

/// Outcome of [`DeployContext::deploy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployResult {
    pub address: Address,
    pub newly_deployed: bool,
}

/// Init code and its hash, the identity used for reuse decisions.
pub fn init_code(artifact: &Artifact, options: &DeployOptions) -> Result<(Bytes, B256)> {
    let mut code = artifact.link(&options.libraries)?.to_vec();
    code.extend_from_slice(&options.args);
    let hash = keccak256(&code);
    Ok((Bytes::from(code), hash))
}

/// Task context plus deployment operations.
#[derive(Debug, Clone)]
pub struct DeployContext {
    pub tasks: TaskContext,
}

impl DeployContext {
    pub fn new(tasks: TaskContext) -> Self {
        Self { tasks }
    }

    pub fn deployments(&self) -> &DeploymentStore {
        &self.tasks.deployments
    }

    pub fn deployer(&self) -> Address {
        self.tasks.deployer()
    }

    /// Deploy `name` unless a record with identical init code already exists
    /// and still has code on chain.
    #[instrument(skip(self, options), fields(network = %self.tasks.network.name()))]
    pub async fn deploy(&self, name: &str, options: DeployOptions) -> Result<DeployResult> {
        let artifact_name = options.artifact.as_deref().unwrap_or(name);
        let artifact = self.tasks.artifacts.get(artifact_name)?;
        let (code, hash) = init_code(artifact, &options)?;

        if let Some(existing) = self.deployments().get(name) {
            if existing.bytecode_hash == hash
                && self.tasks.client.code_exists(existing.address).await?
            {
                info!(contract = %name, address = %existing.address, "Reusing deployment");
                return Ok(DeployResult {
                    address: existing.address,
                    newly_deployed: false,
                });
            }
            warn!(contract = %name, previous = %existing.address, "Bytecode changed, redeploying");
        }

        let deployed = self
            .tasks
            .sender
            .deploy(code)
            .await
            .with_context(|| format!("deploying {name}"))?;
        let address = deployed.address;
        if address == Address::ZERO {
            return Err(DeployError::NoContractAddress(name.to_string()).into());
        }

        self.deployments().save(
            name,
            DeploymentRecord {
                address,
                abi: artifact.abi.clone(),
                transaction_hash: Some(deployed.receipt.transaction_hash),
                args: format!("0x{}", hex::encode(&options.args)),
                libraries: options.libraries.clone(),
                bytecode_hash: hash,
                deployed_at: Utc::now(),
            },
        )?;

        info!(
            contract = %name,
            address = %address,
            tx_hash = %deployed.receipt.transaction_hash,
            gas_used = deployed.receipt.gas_used,
            "Deployed"
        );

        Ok(DeployResult {
            address,
            newly_deployed: true,
        })
    }

    /// One logged state-changing call.
    pub async fn execute<C: SolCall>(
        &self,
        label: &str,
        to: Address,
        call: C,
    ) -> Result<TransactionReceipt> {
        self.tasks.send_with_value(label, to, call, U256::ZERO).await
    }
}

/// One named deployment step.
#[async_trait]
pub trait DeployStep<C: Sync = DeployContext>: Send + Sync {
    /// Migration id; a recorded id is never run again.
    fn id(&self) -> &'static str;

    /// Tags for `--tags` selection.
    fn tags(&self) -> &'static [&'static str] {
        &[]
    }

    /// Network-dependent skip (e.g. mocks on mainnet).
    fn skip(&self, _ctx: &C) -> bool {
        false
    }

    /// Runs only when selected by tag and is never recorded as migrated.
    fn manual(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &C) -> Result<()>;
}

/// Why a step did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyMigrated,
    NotApplicable,
    TagFiltered,
}

/// What [`Orchestrator::run`] did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub executed: Vec<&'static str>,
    pub skipped: Vec<(&'static str, SkipReason)>,
}

/// Sequential runner for deployment steps.
pub struct Orchestrator<C: Sync = DeployContext> {
    steps: Vec<Box<dyn DeployStep<C>>>,
}

impl<C: Sync> Default for Orchestrator<C> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<C: Sync> Orchestrator<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: impl DeployStep<C> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn step_ids(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.id()).collect()
    }

    /// Run steps in order. The first failure aborts the run; completed
    /// steps stay recorded so a rerun resumes after them.
    pub async fn run(
        &self,
        ctx: &C,
        migrations: &DeploymentStore,
        tags: &[String],
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for step in &self.steps {
            let id = step.id();

            let selected = step.tags().iter().any(|t| tags.iter().any(|f| f == t));
            if (!tags.is_empty() || step.manual()) && !selected {
                summary.skipped.push((id, SkipReason::TagFiltered));
                continue;
            }
            if !step.manual() && migrations.is_migrated(id) {
                info!(step = %id, "Step already executed");
                summary.skipped.push((id, SkipReason::AlreadyMigrated));
                continue;
            }
            if step.skip(ctx) {
                info!(step = %id, "Step not applicable to this network");
                summary.skipped.push((id, SkipReason::NotApplicable));
                continue;
            }

            info!(step = %id, "Running deploy step");
            step.run(ctx)
                .await
                .with_context(|| format!("deploy step {id} failed"))?;
            if !step.manual() {
                migrations.mark_migrated(id)?;
            }
            summary.executed.push(id);
        }

        info!(
            executed = summary.executed.len(),
            skipped = summary.skipped.len(),
            "Deployment finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<&'static str>>,
        mainnet: bool,
    }

    struct Step {
        id: &'static str,
        tags: &'static [&'static str],
        mocks_only: bool,
        manual: bool,
        fail: bool,
    }

    impl Step {
        fn new(id: &'static str) -> Self {
            Self {
                id,
                tags: &[],
                mocks_only: false,
                manual: false,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl DeployStep<Recorder> for Step {
        fn id(&self) -> &'static str {
            self.id
        }

        fn tags(&self) -> &'static [&'static str] {
            self.tags
        }

        fn skip(&self, ctx: &Recorder) -> bool {
            self.mocks_only && ctx.mainnet
        }

        fn manual(&self) -> bool {
            self.manual
        }

        async fn run(&self, ctx: &Recorder) -> Result<()> {
            ctx.calls.lock().push(self.id);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    fn store() -> (tempfile::TempDir, DeploymentStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = DeploymentStore::open(tmp.path(), "test").unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn test_rerun_is_noop() {
        let (_tmp, migrations) = store();
        let ctx = Recorder::default();
        let orchestrator = Orchestrator::new()
            .step(Step::new("1_deploy_mocks"))
            .step(Step::new("2_deploy_core"));

        let first = orchestrator.run(&ctx, &migrations, &[]).await.unwrap();
        assert_eq!(first.executed, vec!["1_deploy_mocks", "2_deploy_core"]);

        let second = orchestrator.run(&ctx, &migrations, &[]).await.unwrap();
        assert!(second.executed.is_empty());
        assert_eq!(second.skipped.len(), 2);
        assert_eq!(ctx.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_aborts_and_resumes() {
        let (_tmp, migrations) = store();
        let ctx = Recorder::default();
        let failing = Orchestrator::new()
            .step(Step::new("1_deploy_mocks"))
            .step(Step {
                fail: true,
                ..Step::new("2_deploy_core")
            })
            .step(Step::new("3_deploy_periphery"));

        let err = failing.run(&ctx, &migrations, &[]).await.unwrap_err();
        assert!(err.to_string().contains("2_deploy_core"));
        assert!(migrations.is_migrated("1_deploy_mocks"));
        assert!(!migrations.is_migrated("2_deploy_core"));
        assert!(!ctx.calls.lock().contains(&"3_deploy_periphery"));

        let fixed = Orchestrator::new()
            .step(Step::new("1_deploy_mocks"))
            .step(Step::new("2_deploy_core"))
            .step(Step::new("3_deploy_periphery"));
        let summary = fixed.run(&ctx, &migrations, &[]).await.unwrap();
        assert_eq!(summary.executed, vec!["2_deploy_core", "3_deploy_periphery"]);
    }

    #[tokio::test]
    async fn test_skip_and_tags() {
        let (_tmp, migrations) = store();
        let ctx = Recorder {
            mainnet: true,
            ..Default::default()
        };
        let orchestrator = Orchestrator::new()
            .step(Step {
                mocks_only: true,
                tags: &["mocks"],
                ..Step::new("1_deploy_mocks")
            })
            .step(Step {
                tags: &["core"],
                ..Step::new("2_deploy_core")
            })
            .step(Step {
                tags: &["periphery"],
                ..Step::new("3_deploy_periphery")
            });

        let summary = orchestrator
            .run(&ctx, &migrations, &["mocks".to_string(), "core".to_string()])
            .await
            .unwrap();
        assert_eq!(summary.executed, vec!["2_deploy_core"]);
        assert_eq!(
            summary.skipped,
            vec![
                ("1_deploy_mocks", SkipReason::NotApplicable),
                ("3_deploy_periphery", SkipReason::TagFiltered),
            ]
        );
        // A skipped step is not recorded, so it can run on a later network config
        assert!(!migrations.is_migrated("1_deploy_mocks"));
    }

    #[tokio::test]
    async fn test_manual_step_runs_only_when_tagged() {
        let (_tmp, migrations) = store();
        let ctx = Recorder::default();
        let orchestrator = Orchestrator::new()
            .step(Step::new("2_deploy_core"))
            .step(Step {
                manual: true,
                tags: &["hotfix"],
                ..Step::new("hotfix_facets")
            });

        let summary = orchestrator.run(&ctx, &migrations, &[]).await.unwrap();
        assert_eq!(summary.executed, vec!["2_deploy_core"]);

        let tags = ["hotfix".to_string()];
        for _ in 0..2 {
            let summary = orchestrator.run(&ctx, &migrations, &tags).await.unwrap();
            assert_eq!(summary.executed, vec!["hotfix_facets"]);
        }
        assert!(!migrations.is_migrated("hotfix_facets"));
    }
}
