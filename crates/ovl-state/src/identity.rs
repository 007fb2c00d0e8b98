// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity data model: name, access level, and the credential variant
//! used to authenticate a peer as that identity.

use ovl_core::AccessLevel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Credentials {
    Local { uid: u32 },
    Basic { password_hash: String },
    Tls { fingerprint: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub access: AccessLevel,
    pub credentials: Credentials,
}

impl Identity {
    /// Hash a plaintext password into the `sha512-crypt` form this identity
    /// stores, for callers building a `Credentials::Basic` value.
    pub fn hash_password(password: &str) -> Result<String, IdentityError> {
        let params = sha_crypt::Sha512Params::new(10_000).map_err(|_| IdentityError::HashFailed)?;
        sha_crypt::sha512_simple(password, &params).map_err(|_| IdentityError::HashFailed)
    }

    pub fn verify_password(&self, password: &str) -> bool {
        match &self.credentials {
            Credentials::Basic { password_hash } => {
                sha_crypt::sha512_check(password, password_hash).is_ok()
            }
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity {0:?} already exists")]
    AlreadyExists(String),
    #[error("identity {0:?} does not exist")]
    NotFound(String),
    #[error("failed to hash password")]
    HashFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies_and_rejects_wrong_password() {
        let hash = Identity::hash_password("hunter2").expect("hash");
        let identity = Identity {
            name: "alice".into(),
            access: AccessLevel::Admin,
            credentials: Credentials::Basic { password_hash: hash },
        };
        assert!(identity.verify_password("hunter2"));
        assert!(!identity.verify_password("wrong"));
    }

    #[test]
    fn tls_identity_never_verifies_a_password() {
        let identity = Identity {
            name: "bob".into(),
            access: AccessLevel::Read,
            credentials: Credentials::Tls { fingerprint: "deadbeef".into() },
        };
        assert!(!identity.verify_password("anything"));
    }
}
