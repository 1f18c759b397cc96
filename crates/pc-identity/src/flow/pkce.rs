//! PKCE (RFC 7636) verifier and challenge derivation

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::shared::crypto::generate_random_string;
use crate::shared::error::AuthError;

/// Verifier entropy. 32 bytes encode to 43 characters, the RFC minimum.
const VERIFIER_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PkceMethod {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "S256")]
    S256,
    #[serde(rename = "plain")]
    Plain,
}

impl PkceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PkceMethod::None => "none",
            PkceMethod::S256 => "S256",
            PkceMethod::Plain => "plain",
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self != PkceMethod::None
    }
}

impl fmt::Display for PkceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PkceMethod {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "none" | "" => Ok(PkceMethod::None),
            "S256" | "s256" => Ok(PkceMethod::S256),
            "plain" => Ok(PkceMethod::Plain),
            other => Err(AuthError::invalid_argument(format!("unknown PKCE method: {}", other))),
        }
    }
}

pub fn generate_code_verifier() -> String {
    generate_random_string(VERIFIER_BYTES)
}

/// Challenge sent on the authorize request; `None` when PKCE is off.
pub fn code_challenge(method: PkceMethod, verifier: &str) -> Option<String> {
    match method {
        PkceMethod::None => None,
        PkceMethod::Plain => Some(verifier.to_string()),
        PkceMethod::S256 => {
            let hash = Sha256::digest(verifier.as_bytes());
            Some(URL_SAFE_NO_PAD.encode(hash))
        }
    }
}
