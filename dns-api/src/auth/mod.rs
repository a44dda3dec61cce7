//! Credential verification for inbound requests.
//!
//! A [`TokenAuthority`] holds one [`CredentialRule`], selected by the
//! configured token scheme, and answers `authorize(credential, action)`.
//! Every failure looks the same to the caller; the reason only shows up
//! in logs and the `dns_api_auth_denials_total` counter.

use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Algorithm, Argon2, Params,
};
use axum::http::HeaderName;
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use service_core::utils::constant_time::{constant_time_eq, sha256_hex};
use std::collections::HashSet;

use crate::config::{AccessMode, AuthConfig, HashLimits, TokenScheme};

type ActionSet = HashSet<String>;

#[derive(Debug)]
pub struct DigestEntry {
    digest: String,
    actions: ActionSet,
}

#[derive(Debug)]
pub struct SecretEntry {
    token: Secret<String>,
    actions: ActionSet,
}

/// How a presented credential is matched against configured tokens.
#[derive(Debug)]
pub enum CredentialRule {
    /// SHA-256 of the presented credential looked up among stored digests.
    DigestTable(Vec<DigestEntry>),
    /// The presented credential is a bcrypt (`$2b$`) or PHC argon2 hash of
    /// one of the configured plaintext tokens. Its embedded cost must fit
    /// within `limits`.
    AdaptiveHash {
        entries: Vec<SecretEntry>,
        limits: HashLimits,
    },
}

/// A presented adaptive hash whose cost is within limits.
enum PresentedHash<'a> {
    Bcrypt(&'a str),
    Argon2(PasswordHash<'a>),
}

const BCRYPT_PREFIXES: [&str; 4] = ["$2a$", "$2b$", "$2x$", "$2y$"];
const BCRYPT_HASH_LEN: usize = 60;
const BCRYPT_MIN_COST: u32 = 4;

impl<'a> PresentedHash<'a> {
    fn parse(presented: &'a str, limits: &HashLimits) -> Result<Self, Denial> {
        if BCRYPT_PREFIXES.iter().any(|p| presented.starts_with(p)) {
            return Self::parse_bcrypt(presented, limits);
        }

        let hash = PasswordHash::new(presented).map_err(|_| Denial::Malformed)?;
        Algorithm::try_from(hash.algorithm).map_err(|_| Denial::Malformed)?;
        let params = Params::try_from(&hash).map_err(|_| Denial::Malformed)?;
        if params.m_cost() > limits.max_memory_kib
            || params.t_cost() > limits.max_iterations
            || params.p_cost() > limits.max_parallelism
        {
            return Err(Denial::Malformed);
        }
        Ok(PresentedHash::Argon2(hash))
    }

    // `$2b$NN$` followed by 53 characters of salt and digest.
    fn parse_bcrypt(presented: &'a str, limits: &HashLimits) -> Result<Self, Denial> {
        if presented.len() != BCRYPT_HASH_LEN
            || !presented.is_ascii()
            || presented.as_bytes()[6] != b'$'
        {
            return Err(Denial::Malformed);
        }
        let cost: u32 = presented[4..6].parse().map_err(|_| Denial::Malformed)?;
        if !(BCRYPT_MIN_COST..=limits.max_bcrypt_cost).contains(&cost) {
            return Err(Denial::Malformed);
        }
        Ok(PresentedHash::Bcrypt(presented))
    }

    fn verifies(&self, secret: &str) -> bool {
        match self {
            PresentedHash::Bcrypt(hash) => bcrypt::verify(secret, hash).unwrap_or(false),
            PresentedHash::Argon2(hash) => Argon2::default()
                .verify_password(secret.as_bytes(), hash)
                .is_ok(),
        }
    }
}

/// Why a credential was refused. Never returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Missing,
    Malformed,
    NoMatch,
    ActionNotAllowed,
}

impl Denial {
    pub fn as_str(&self) -> &'static str {
        match self {
            Denial::Missing => "missing",
            Denial::Malformed => "malformed",
            Denial::NoMatch => "no_match",
            Denial::ActionNotAllowed => "action_not_allowed",
        }
    }
}

fn action_set(actions: &[String]) -> ActionSet {
    actions.iter().map(|a| a.trim().to_ascii_uppercase()).collect()
}

impl CredentialRule {
    pub fn from_config(config: &AuthConfig) -> Self {
        match config.scheme {
            TokenScheme::DigestTable => CredentialRule::DigestTable(
                config
                    .tokens
                    .iter()
                    .map(|entry| DigestEntry {
                        digest: entry.token.to_ascii_lowercase(),
                        actions: action_set(&entry.actions),
                    })
                    .collect(),
            ),
            TokenScheme::AdaptiveHash => CredentialRule::AdaptiveHash {
                entries: config
                    .tokens
                    .iter()
                    .map(|entry| SecretEntry {
                        token: Secret::new(entry.token.clone()),
                        actions: action_set(&entry.actions),
                    })
                    .collect(),
                limits: config.hash_limits,
            },
        }
    }

    fn matching_actions(&self, presented: &str) -> Result<&ActionSet, Denial> {
        match self {
            CredentialRule::DigestTable(entries) => {
                if !presented.chars().all(|c| c.is_ascii_graphic()) {
                    return Err(Denial::Malformed);
                }
                let digest = sha256_hex(presented);

                // Visit every entry so the match position does not affect timing.
                let mut matched = None;
                for entry in entries {
                    if constant_time_eq(&entry.digest, &digest) && matched.is_none() {
                        matched = Some(&entry.actions);
                    }
                }
                matched.ok_or(Denial::NoMatch)
            }
            CredentialRule::AdaptiveHash { entries, limits } => {
                let hash = PresentedHash::parse(presented, limits)?;

                let mut matched = None;
                for entry in entries {
                    if hash.verifies(entry.token.expose_secret()) && matched.is_none() {
                        matched = Some(&entry.actions);
                    }
                }
                matched.ok_or(Denial::NoMatch)
            }
        }
    }
}

#[derive(Debug)]
pub struct TokenAuthority {
    header: HeaderName,
    mode: AccessMode,
    rule: CredentialRule,
}

impl TokenAuthority {
    pub fn new(header: HeaderName, mode: AccessMode, rule: CredentialRule) -> Self {
        Self { header, mode, rule }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AppError> {
        let header = HeaderName::from_bytes(config.header.as_bytes()).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "invalid auth header {:?}: {}",
                config.header,
                e
            ))
        })?;
        Ok(Self::new(header, config.mode, CredentialRule::from_config(config)))
    }

    /// Header the credential is read from.
    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    pub fn authorize(&self, presented: Option<&str>, action: &str) -> bool {
        match self.check(presented, action) {
            Ok(()) => true,
            Err(denial) => {
                match denial {
                    Denial::Missing => tracing::debug!(action, "No credential presented"),
                    Denial::Malformed => {
                        tracing::info!(action, "Malformed credential presented")
                    }
                    Denial::NoMatch | Denial::ActionNotAllowed => {
                        tracing::warn!(action, reason = denial.as_str(), "Credential rejected")
                    }
                }
                metrics::counter!("dns_api_auth_denials_total", "reason" => denial.as_str())
                    .increment(1);
                false
            }
        }
    }

    pub fn check(&self, presented: Option<&str>, action: &str) -> Result<(), Denial> {
        let presented = presented
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(Denial::Missing)?;

        let actions = self.rule.matching_actions(presented)?;

        match self.mode {
            AccessMode::Blanket => Ok(()),
            AccessMode::PerAction => {
                if actions.contains(&action.to_ascii_uppercase()) {
                    Ok(())
                } else {
                    Err(Denial::ActionNotAllowed)
                }
            }
        }
    }
}
