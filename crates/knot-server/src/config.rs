//! Environment-variable configuration, following the same
//! read-then-validate shape as every other binary in this workspace:
//! defaults are applied first, then overridden by whichever variables are
//! set, then checked as a whole.

use std::net::SocketAddr;
use std::path::PathBuf;

use validator::Validate;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5555";
const DEFAULT_INTERNAL_LISTEN_ADDR: &str = "127.0.0.1:5444";
const DEFAULT_SCAN_PATH: &str = "/home/git";
const DEFAULT_MAIN_BRANCH: &str = "main";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("failed to parse {key}: {message}")]
    Parse { key: &'static str, message: String },

    #[error("configuration is invalid: {0}")]
    Invalid(String),
}

/// Everything `knot-server`'s `main` needs to wire the crate graph
/// together, read once at startup from the environment.
#[derive(Debug, Clone, Validate)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub internal_listen_addr: SocketAddr,
    pub db_path: PathBuf,
    #[validate(length(min = 1))]
    pub hostname: String,
    #[validate(length(min = 1))]
    pub owner_did: String,
    pub jetstream_endpoint: String,
    pub repo_scan_path: PathBuf,
    pub repo_readme_names: Vec<String>,
    #[validate(length(min = 1))]
    pub repo_main_branch: String,
    pub appview_endpoint: String,
    pub log_level: String,
    pub hook_binary_path: String,
}

impl Config {
    /// Reads every `KNOT_SERVER_*`/`KNOT_REPO_*` variable named in the
    /// external interfaces, applying defaults for anything optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = parse_env_or("KNOT_SERVER_LISTEN_ADDR", DEFAULT_LISTEN_ADDR)?;
        let internal_listen_addr = parse_env_or("KNOT_SERVER_INTERNAL_LISTEN_ADDR", DEFAULT_INTERNAL_LISTEN_ADDR)?;
        let db_path = std::env::var("KNOT_SERVER_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("knot.db"));
        let hostname = required_env("KNOT_SERVER_HOSTNAME")?;
        let owner_did = required_env("KNOT_SERVER_OWNER")?;
        let jetstream_endpoint = required_env("KNOT_SERVER_JETSTREAM_ENDPOINT")?;
        let repo_scan_path = std::env::var("KNOT_REPO_SCAN_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SCAN_PATH));
        let repo_readme_names = std::env::var("KNOT_REPO_README")
            .map(|v| v.split(',').map(str::trim).map(str::to_string).filter(|s| !s.is_empty()).collect())
            .unwrap_or_else(|_| vec!["README.md".to_string(), "README".to_string()]);
        let repo_main_branch = std::env::var("KNOT_REPO_MAIN_BRANCH").unwrap_or_else(|_| DEFAULT_MAIN_BRANCH.to_string());
        let appview_endpoint = required_env("APPVIEW_ENDPOINT")?;
        let log_level = std::env::var("KNOT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let hook_binary_path = std::env::var("KNOT_HOOK_BINARY_PATH").unwrap_or_else(|_| "knot-hook".to_string());

        let config = Config {
            listen_addr,
            internal_listen_addr,
            db_path,
            hostname,
            owner_did,
            jetstream_endpoint,
            repo_scan_path,
            repo_readme_names,
            repo_main_branch,
            appview_endpoint,
            log_level,
            hook_binary_path,
        };
        config.validate_config()?;
        Ok(config)
    }

    pub fn validate_config(&self) -> Result<(), ConfigError> {
        self.validate().map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if !self.owner_did.starts_with("did:") {
            return Err(ConfigError::Invalid(format!(
                "KNOT_SERVER_OWNER must be a DID, got '{}'",
                self.owner_did
            )));
        }
        Ok(())
    }
}

fn required_env(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn parse_env_or<T: std::str::FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse().map_err(|_| ConfigError::Parse {
        key,
        message: format!("'{raw}' is not valid"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            listen_addr: DEFAULT_LISTEN_ADDR.parse().unwrap(),
            internal_listen_addr: DEFAULT_INTERNAL_LISTEN_ADDR.parse().unwrap(),
            db_path: PathBuf::from("knot.db"),
            hostname: "knot.example".to_string(),
            owner_did: "did:plc:owner".to_string(),
            jetstream_endpoint: "wss://jetstream.example/subscribe".to_string(),
            repo_scan_path: PathBuf::from(DEFAULT_SCAN_PATH),
            repo_readme_names: vec!["README.md".to_string()],
            repo_main_branch: "main".to_string(),
            appview_endpoint: "https://appview.example".to_string(),
            log_level: "info".to_string(),
            hook_binary_path: "knot-hook".to_string(),
        }
    }

    #[test]
    fn a_well_formed_config_validates() {
        assert!(base_config().validate_config().is_ok());
    }

    #[test]
    fn a_non_did_owner_is_rejected() {
        let mut config = base_config();
        config.owner_did = "not-a-did".to_string();
        assert!(config.validate_config().is_err());
    }

    #[test]
    fn an_empty_hostname_is_rejected() {
        let mut config = base_config();
        config.hostname = String::new();
        assert!(config.validate_config().is_err());
    }
}
