//! Process-wide snapshot of the environment variables the tooling reads.

use std::sync::OnceLock;

/// Mnemonic used by Hardhat and Anvil for their prefunded accounts.
pub const DEV_MNEMONIC: &str = "test test test test test test test test test test test junk";

/// Network used when neither `--network` nor `CHROMATIC_NETWORK` is set.
pub const DEFAULT_NETWORK: &str = "anvil";

/// Environment snapshot taken at startup (after `.env` is loaded).
#[derive(Debug, Clone, Default)]
pub struct AmbientEnv {
    pub alchemy_key: Option<String>,
    pub arbiscan_goerli_api_key: Option<String>,
    pub arbiscan_api_key: Option<String>,
    pub drpc_key: Option<String>,
    pub mnemonic: Option<String>,
    pub private_key: Option<String>,
    pub network: Option<String>,
}

static AMBIENT_ENV: OnceLock<AmbientEnv> = OnceLock::new();

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AmbientEnv {
    /// Read the current process environment.
    pub fn from_env() -> Self {
        Self {
            alchemy_key: non_empty("ALCHEMY_KEY"),
            arbiscan_goerli_api_key: non_empty("ARBISCAN_GOERLI_API_KEY"),
            arbiscan_api_key: non_empty("ARBISCAN_API_KEY"),
            drpc_key: non_empty("DRPC_KEY"),
            mnemonic: non_empty("MNEMONIC"),
            private_key: non_empty("PRIVATE_KEY"),
            network: non_empty("CHROMATIC_NETWORK"),
        }
    }

    /// Global snapshot, captured on first access.
    pub fn get() -> &'static AmbientEnv {
        AMBIENT_ENV.get_or_init(Self::from_env)
    }

    /// Install a snapshot explicitly (first call wins).
    pub fn init(env: AmbientEnv) {
        let _ = AMBIENT_ENV.set(env);
    }

    /// Look up a key by its variable name (explorer configs name their key).
    pub fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "ALCHEMY_KEY" => self.alchemy_key.as_deref(),
            "ARBISCAN_GOERLI_API_KEY" => self.arbiscan_goerli_api_key.as_deref(),
            "ARBISCAN_API_KEY" => self.arbiscan_api_key.as_deref(),
            "DRPC_KEY" => self.drpc_key.as_deref(),
            "MNEMONIC" => self.mnemonic.as_deref(),
            "PRIVATE_KEY" => self.private_key.as_deref(),
            "CHROMATIC_NETWORK" => self.network.as_deref(),
            _ => None,
        }
    }

    /// Mnemonic for signer derivation; local networks fall back to the dev mnemonic.
    pub fn mnemonic_for(&self, local: bool) -> Option<&str> {
        match (&self.mnemonic, local) {
            (Some(m), _) => Some(m.as_str()),
            (None, true) => Some(DEV_MNEMONIC),
            (None, false) => None,
        }
    }

    /// Network selected by environment, else the default.
    pub fn default_network(&self) -> &str {
        self.network.as_deref().unwrap_or(DEFAULT_NETWORK)
    }
}
