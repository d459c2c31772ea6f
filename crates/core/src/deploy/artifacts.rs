//! Hardhat compilation artifacts.
//!
//! Layout produced by `hardhat compile`:
//! ```text
//! artifacts/
//!   build-info/<hash>.json
//!   contracts/core/ChromaticVault.sol/
//!     ChromaticVault.json       (abi, bytecode, linkReferences)
//!     ChromaticVault.dbg.json   (buildInfo -> ../../../build-info/<hash>.json)
//! ```

use alloy::primitives::{Address, Bytes};
use regex_lite::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failures resolving or linking an artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),
    #[error("{contract}: library {library} has no address")]
    MissingLibrary { contract: String, library: String },
    #[error("{contract}: unresolved library placeholder {placeholder}")]
    UnlinkedLibrary { contract: String, placeholder: String },
    #[error("{contract}: invalid bytecode: {reason}")]
    InvalidBytecode { contract: String, reason: String },
    #[error("{contract}: no build info recorded")]
    NoBuildInfo { contract: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Byte range in the bytecode holding a library address.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LinkOffset {
    pub start: usize,
    pub length: usize,
}

/// `source -> library -> offsets`
pub type LinkReferences = BTreeMap<String, BTreeMap<String, Vec<LinkOffset>>>;

/// One compiled contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    pub source_name: String,
    pub abi: serde_json::Value,
    pub bytecode: String,
    #[serde(default)]
    pub link_references: LinkReferences,
    #[serde(skip)]
    pub build_info: Option<PathBuf>,
}

/// Solc input and version needed for explorer verification.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub solc_long_version: String,
    pub input: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: String,
}

fn placeholder_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"__\$[0-9a-fA-F]{34}\$__").ok())
        .as_ref()
}

impl Artifact {
    /// `source:Name`, the form explorers expect.
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }

    /// Whether the bytecode references any library.
    pub fn needs_linking(&self) -> bool {
        self.link_references.values().any(|libs| !libs.is_empty())
    }

    /// Creation bytecode with library addresses spliced in.
    ///
    /// Libraries are looked up by bare name, then by `source:Name`.
    pub fn link(&self, libraries: &BTreeMap<String, Address>) -> Result<Bytes, ArtifactError> {
        let mut code = self
            .bytecode
            .strip_prefix("0x")
            .unwrap_or(&self.bytecode)
            .to_string();

        for (source, libs) in &self.link_references {
            for (library, offsets) in libs {
                let address = libraries
                    .get(library)
                    .or_else(|| libraries.get(&format!("{source}:{library}")))
                    .ok_or_else(|| ArtifactError::MissingLibrary {
                        contract: self.contract_name.clone(),
                        library: library.clone(),
                    })?;
                let encoded = hex::encode(address.as_slice());

                for offset in offsets {
                    let start = offset.start * 2;
                    let end = start + offset.length * 2;
                    if end > code.len() || offset.length != 20 {
                        return Err(ArtifactError::InvalidBytecode {
                            contract: self.contract_name.clone(),
                            reason: format!("link offset {} out of range", offset.start),
                        });
                    }
                    code.replace_range(start..end, &encoded);
                }
            }
        }

        if let Some(found) = placeholder_pattern().and_then(|re| re.find(&code)) {
            return Err(ArtifactError::UnlinkedLibrary {
                contract: self.contract_name.clone(),
                placeholder: found.as_str().to_string(),
            });
        }

        hex::decode(&code)
            .map(Bytes::from)
            .map_err(|e| ArtifactError::InvalidBytecode {
                contract: self.contract_name.clone(),
                reason: e.to_string(),
            })
    }

    /// Read the build info this artifact was compiled in.
    pub fn load_build_info(&self) -> Result<BuildInfo, ArtifactError> {
        let path = self
            .build_info
            .as_ref()
            .ok_or_else(|| ArtifactError::NoBuildInfo {
                contract: self.contract_name.clone(),
            })?;
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Artifacts indexed by contract name and by fully qualified name.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    root: PathBuf,
    artifacts: HashMap<String, Artifact>,
}

impl ArtifactStore {
    /// Index every artifact under `dir`. A missing directory yields an empty store.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let root = dir.as_ref().to_path_buf();
        let mut store = Self {
            root: root.clone(),
            artifacts: HashMap::new(),
        };

        if !root.exists() {
            warn!(dir = %root.display(), "Artifacts directory missing, run `hardhat compile`");
            return Ok(store);
        }

        let mut files = Vec::new();
        collect_json(&root, &mut files)?;

        for path in files {
            match load_artifact(&path) {
                Ok(Some(artifact)) => store.insert(artifact),
                Ok(None) => {}
                Err(e) => debug!(file = %path.display(), error = %e, "Skipping artifact"),
            }
        }

        info!(
            dir = %root.display(),
            artifacts = store.len(),
            "Artifacts indexed"
        );
        Ok(store)
    }

    pub fn insert(&mut self, artifact: Artifact) {
        self.artifacts
            .insert(artifact.fully_qualified_name(), artifact.clone());
        self.artifacts
            .insert(artifact.contract_name.clone(), artifact);
    }

    pub fn get(&self, name: &str) -> Result<&Artifact, ArtifactError> {
        self.artifacts
            .get(name)
            .ok_or_else(|| ArtifactError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.artifacts.contains_key(name)
    }

    /// Number of distinct contracts.
    pub fn len(&self) -> usize {
        self.artifacts.keys().filter(|k| !k.contains(':')).count()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn collect_json(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if path.file_name().is_some_and(|n| n == "build-info") {
                continue;
            }
            collect_json(&path, out)?;
        } else if path.extension().is_some_and(|e| e == "json")
            && !path.to_string_lossy().ends_with(".dbg.json")
        {
            out.push(path);
        }
    }
    Ok(())
}

fn load_artifact(path: &Path) -> Result<Option<Artifact>, ArtifactError> {
    let content = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    if value.get("contractName").is_none() || value.get("bytecode").is_none() {
        return Ok(None);
    }

    let mut artifact: Artifact = serde_json::from_value(value)?;
    let dbg = path.with_extension("dbg.json");
    if dbg.exists() {
        let debug: DebugFile = serde_json::from_str(&std::fs::read_to_string(&dbg)?)?;
        if let Some(parent) = dbg.parent() {
            artifact.build_info = Some(parent.join(debug.build_info));
        }
    }
    Ok(Some(artifact))
}
