//! CLI argument parsing and environment variable handling.

use std::{env, path::PathBuf};

use argh::FromArgs;

/// Environment variable pointing at the engine JWT secret file.
const JWT_SECRET_PATH_ENV: &str = "KEEL_JWT_SECRET_PATH";

/// Configs overridable by environment. Mostly for sensitive data.
#[derive(Debug, Clone)]
pub(crate) struct EnvArgs {
    jwt_secret_path: Option<String>,
}

impl EnvArgs {
    pub(crate) fn from_env() -> Self {
        Self {
            jwt_secret_path: env::var(JWT_SECRET_PATH_ENV).ok(),
        }
    }

    /// Get strings of overrides gathered from env.
    pub(crate) fn get_overrides(&self) -> Vec<String> {
        let mut overrides = Vec::new();
        if let Some(path) = &self.jwt_secret_path {
            overrides.push(format!("l2.jwt_secret_path={path}"));
        }
        overrides
    }
}

#[derive(Clone, Debug, FromArgs)]
#[argh(description = "keel L2 driver")]
pub(crate) struct Args {
    #[argh(option, short = 'c', description = "path to configuration")]
    pub config: PathBuf,

    /// Let the engine catch up over P2P when far behind the verified head.
    #[argh(switch, description = "enable p2p sync")]
    pub p2p_sync: bool,

    #[argh(option, description = "checkpoint node used for p2p sync")]
    pub checkpoint_url: Option<String>,

    /// Other generic overrides to the config toml.
    /// Will be used, for example, as `-o sync.retry_interval_ms=500`
    #[argh(option, short = 'o', description = "generic config overrides")]
    pub overrides: Vec<String>,
}

impl Args {
    /// Overrides from the environment, then from flags, then from `-o`. Later ones win.
    pub(crate) fn get_all_overrides(&self, env: &EnvArgs) -> Vec<String> {
        let mut overrides = env.get_overrides();
        overrides.extend(self.get_internal_overrides());
        overrides.extend_from_slice(&self.overrides);
        overrides
    }

    fn get_internal_overrides(&self) -> Vec<String> {
        let mut overrides = Vec::new();
        if self.p2p_sync {
            overrides.push("sync.p2p_sync_enabled=true".to_string());
        }
        if let Some(url) = &self.checkpoint_url {
            overrides.push(format!("l2.checkpoint_url={url}"));
        }
        overrides
    }
}
