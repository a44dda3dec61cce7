use serde::Deserialize;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::collections::{HashMap, HashSet};
use std::env;
use std::sync::Arc;

/// Environment variable prefix; `DNS_API__AUTH__HEADER` overrides `auth.header`.
pub const ENV_PREFIX: &str = "DNS_API";

/// Config file used when `DNS_API_CONFIG` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "dns-api";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Request header carrying the caller's credential.
    #[serde(default = "default_auth_header")]
    pub header: String,
    #[serde(default)]
    pub mode: AccessMode,
    pub scheme: TokenScheme,
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
    #[serde(default)]
    pub hash_limits: HashLimits,
}

/// Ceilings on the work a presented adaptive hash may ask for. A credential
/// whose embedded cost exceeds any of them is rejected before verification.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HashLimits {
    /// argon2 `m` in KiB.
    pub max_memory_kib: u32,
    /// argon2 `t`.
    pub max_iterations: u32,
    /// argon2 `p`.
    pub max_parallelism: u32,
    /// bcrypt log2 rounds.
    pub max_bcrypt_cost: u32,
}

impl Default for HashLimits {
    fn default() -> Self {
        Self {
            max_memory_kib: 65536,
            max_iterations: 4,
            max_parallelism: 4,
            max_bcrypt_cost: 12,
        }
    }
}

/// Whether a matched credential is limited to its configured actions.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    #[default]
    PerAction,
    Blanket,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenScheme {
    /// `token` is the hex SHA-256 of the secret callers present.
    DigestTable,
    /// `token` is the plaintext secret; callers present its bcrypt or argon2 hash.
    AdaptiveHash,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    pub backend: BackendConfig,
    /// File listing the CIDRs this account may allocate from.
    #[serde(default)]
    pub cidr_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    pub username: String,
    pub password: Secret<String>,
    pub view_id: i64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_port() -> u16 {
    8080
}

fn default_service_name() -> String {
    "dns-api".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_auth_header() -> String {
    "X-Auth-Token".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Config {
    /// Load from the file named by `DNS_API_CONFIG` (or `dns-api.*`) and
    /// `DNS_API__*` environment variables.
    pub fn load() -> Result<Self, AppError> {
        let file = env::var("DNS_API_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&file)
    }

    pub fn load_from(file: &str) -> Result<Self, AppError> {
        let config: Config = core_config::load_layered(file, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.port == 0 {
            return Err(config_error("port must be greater than 0"));
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.name.is_empty() {
                return Err(config_error("account name must not be empty"));
            }
            if !seen.insert(account.name.as_str()) {
                return Err(config_error(format!(
                    "duplicate account name: {}",
                    account.name
                )));
            }
        }

        if self.auth.tokens.is_empty() {
            return Err(config_error("auth.tokens must not be empty"));
        }

        for entry in &self.auth.tokens {
            match self.auth.scheme {
                TokenScheme::DigestTable => {
                    let is_digest = entry.token.len() == 64
                        && entry.token.chars().all(|c| c.is_ascii_hexdigit());
                    if !is_digest {
                        return Err(config_error(
                            "digest_table tokens must be 64-character hex SHA-256 digests",
                        ));
                    }
                }
                TokenScheme::AdaptiveHash => {
                    if entry.token.is_empty() {
                        return Err(config_error("adaptive_hash tokens must not be empty"));
                    }
                }
            }
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(message.into()))
}

/// Read-only account table shared by all requests.
#[derive(Debug, Default)]
pub struct AccountRegistry {
    names: Vec<String>,
    accounts: HashMap<String, Arc<AccountConfig>>,
}

impl AccountRegistry {
    pub fn new(accounts: Vec<AccountConfig>) -> Self {
        let names = accounts.iter().map(|a| a.name.clone()).collect();
        let accounts = accounts
            .into_iter()
            .map(|a| (a.name.clone(), Arc::new(a)))
            .collect();
        Self { names, accounts }
    }

    pub fn get(&self, name: &str) -> Option<Arc<AccountConfig>> {
        self.accounts.get(name).cloned()
    }

    /// Account names in configuration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Loads read the process environment.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const DIGEST: &str = "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b";

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn load(file: &tempfile::NamedTempFile) -> Result<Config, AppError> {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        Config::load_from(file.path().to_str().unwrap())
    }

    #[test]
    fn loads_accounts_and_applies_defaults() {
        let file = write_config(&format!(
            r#"
auth:
  scheme: digest_table
  tokens:
    - token: "{DIGEST}"
      actions: ["GET", "POST"]
accounts:
  - name: bam-test
    backend:
      url: "https://bam.example.com"
      username: api
      password: hunter2
      view_id: 7
    cidr_file: /etc/dns-api/cidrs.txt
"#
        ));

        let config = load(&file).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.auth.hash_limits, HashLimits::default());
        assert_eq!(config.service_name, "dns-api");
        assert_eq!(config.auth.header, "X-Auth-Token");
        assert_eq!(config.auth.mode, AccessMode::PerAction);
        assert_eq!(config.auth.scheme, TokenScheme::DigestTable);

        let registry = AccountRegistry::new(config.accounts);
        let account = registry.get("bam-test").unwrap();
        assert_eq!(account.backend.view_id, 7);
        assert_eq!(account.backend.timeout_seconds, 30);
        assert!(!account.backend.accept_invalid_certs);
        assert_eq!(registry.names(), &["bam-test".to_string()]);
        assert!(registry.get("bork").is_none());
    }

    #[test]
    fn rejects_duplicate_accounts() {
        let file = write_config(&format!(
            r#"
auth:
  scheme: digest_table
  tokens:
    - token: "{DIGEST}"
      actions: ["GET"]
accounts:
  - name: dup
    backend: {{ url: "http://a", username: u, password: p, view_id: 1 }}
  - name: dup
    backend: {{ url: "http://b", username: u, password: p, view_id: 2 }}
"#
        ));

        assert!(matches!(load(&file), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn rejects_non_digest_tokens_for_digest_table() {
        let file = write_config(
            r#"
auth:
  scheme: digest_table
  tokens:
    - token: "not-a-digest"
      actions: ["GET"]
"#,
        );

        assert!(matches!(load(&file), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn rejects_empty_token_set() {
        let file = write_config(
            r#"
auth:
  scheme: adaptive_hash
  mode: blanket
"#,
        );

        assert!(matches!(load(&file), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn port_accepts_environment_override() {
        let file = write_config(&format!(
            r#"
auth:
  scheme: digest_table
  tokens:
    - token: "{DIGEST}"
      actions: ["GET"]
"#
        ));

        let loaded = {
            let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            std::env::set_var("DNS_API__PORT", "9000");
            let loaded = Config::load_from(file.path().to_str().unwrap());
            std::env::remove_var("DNS_API__PORT");
            loaded
        };

        assert_eq!(loaded.unwrap().port, 9000);
    }

    #[test]
    fn hash_limits_can_be_tightened() {
        let file = write_config(
            r#"
auth:
  scheme: adaptive_hash
  mode: blanket
  tokens:
    - token: reader
  hash_limits:
    max_memory_kib: 4096
    max_bcrypt_cost: 10
"#,
        );

        let limits = load(&file).unwrap().auth.hash_limits;
        assert_eq!(limits.max_memory_kib, 4096);
        assert_eq!(limits.max_bcrypt_cost, 10);
        assert_eq!(limits.max_iterations, HashLimits::default().max_iterations);
    }
}
