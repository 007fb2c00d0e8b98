// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maps peer credentials to an [`AccessLevel`], following the resolution
//! order: named identity first, then a transport-specific unauthenticated
//! default, then untrusted.
//!
//! Structured as an ordered chain of `Option`-returning steps, the same
//! fallback-chain shape used elsewhere in the workspace for host-credential
//! resolution (env var, then file, then default).

use crate::pairing::PairingWindow;
use crate::peer::{PeerCredentials, Transport};
use ovl_core::AccessLevel;
use ovl_state::{Credentials, Identity};
use std::collections::HashMap;

/// Resolve the access level a request should be granted.
///
/// `pairing` is accepted for symmetry with [`crate::pairing`] operations
/// but, per the pairing contract, resolution itself never consults the
/// window: a fingerprint that has already been paired is just another
/// stored identity.
pub fn resolve_access(
    peer: &PeerCredentials,
    transport: Transport,
    identities: &HashMap<String, Identity>,
    daemon_uid: u32,
    _pairing: &PairingWindow,
) -> AccessLevel {
    resolve_named_identity(peer, identities)
        .unwrap_or_else(|| resolve_transport_default(peer, transport, daemon_uid))
}

fn resolve_named_identity(peer: &PeerCredentials, identities: &HashMap<String, Identity>) -> Option<AccessLevel> {
    match peer {
        PeerCredentials::HttpBasic { username, password } => identities
            .get(username)
            .filter(|identity| identity.verify_password(password))
            .map(|identity| identity.access),
        PeerCredentials::Tls { fingerprint } => identities
            .values()
            .find(|identity| matches!(&identity.credentials, Credentials::Tls { fingerprint: f } if f == fingerprint))
            .map(|identity| identity.access),
        PeerCredentials::UnixSocket { uid } => identities
            .values()
            .find(|identity| matches!(&identity.credentials, Credentials::Local { uid: u } if u == uid))
            .map(|identity| identity.access),
        PeerCredentials::Anonymous => None,
    }
}

/// Transport-specific defaults when no named identity matched. Only a Unix
/// socket peer gets an authenticated-by-default outcome (root or the
/// daemon's own uid is admin, any other local uid is read); HTTP transports
/// never fall back past "untrusted" without a named identity.
fn resolve_transport_default(peer: &PeerCredentials, transport: Transport, daemon_uid: u32) -> AccessLevel {
    match (transport, peer) {
        (Transport::UnixSocket, PeerCredentials::UnixSocket { uid }) => {
            if *uid == 0 || *uid == daemon_uid {
                AccessLevel::Admin
            } else {
                AccessLevel::Read
            }
        }
        _ => AccessLevel::Untrusted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovl_state::Credentials as Creds;

    fn identities_with(name: &str, identity: Identity) -> HashMap<String, Identity> {
        HashMap::from([(name.to_string(), identity)])
    }

    #[test]
    fn root_over_unix_socket_is_admin() {
        let identities = HashMap::new();
        let pairing = PairingWindow::new();
        let level = resolve_access(
            &PeerCredentials::UnixSocket { uid: 0 },
            Transport::UnixSocket,
            &identities,
            1000,
            &pairing,
        );
        assert_eq!(level, AccessLevel::Admin);
    }

    #[test]
    fn the_daemons_own_uid_is_admin() {
        let identities = HashMap::new();
        let pairing = PairingWindow::new();
        let level = resolve_access(
            &PeerCredentials::UnixSocket { uid: 1000 },
            Transport::UnixSocket,
            &identities,
            1000,
            &pairing,
        );
        assert_eq!(level, AccessLevel::Admin);
    }

    #[test]
    fn any_other_local_uid_is_read() {
        let identities = HashMap::new();
        let pairing = PairingWindow::new();
        let level = resolve_access(
            &PeerCredentials::UnixSocket { uid: 501 },
            Transport::UnixSocket,
            &identities,
            1000,
            &pairing,
        );
        assert_eq!(level, AccessLevel::Read);
    }

    #[test]
    fn plain_http_with_no_credentials_is_untrusted() {
        let identities = HashMap::new();
        let pairing = PairingWindow::new();
        let level =
            resolve_access(&PeerCredentials::Anonymous, Transport::Http, &identities, 1000, &pairing);
        assert_eq!(level, AccessLevel::Untrusted);
    }

    #[test]
    fn named_basic_auth_identity_grants_its_configured_level() {
        let identities = identities_with(
            "alice",
            Identity {
                name: "alice".into(),
                access: AccessLevel::Metrics,
                credentials: Creds::Basic { password_hash: Identity::hash_password("s3cret").unwrap() },
            },
        );
        let pairing = PairingWindow::new();
        let level = resolve_access(
            &PeerCredentials::HttpBasic { username: "alice".into(), password: "s3cret".into() },
            Transport::Http,
            &identities,
            1000,
            &pairing,
        );
        assert_eq!(level, AccessLevel::Metrics);
    }

    #[test]
    fn wrong_password_falls_through_to_the_transport_default() {
        let identities = identities_with(
            "alice",
            Identity {
                name: "alice".into(),
                access: AccessLevel::Admin,
                credentials: Creds::Basic { password_hash: Identity::hash_password("s3cret").unwrap() },
            },
        );
        let pairing = PairingWindow::new();
        let level = resolve_access(
            &PeerCredentials::HttpBasic { username: "alice".into(), password: "wrong".into() },
            Transport::Http,
            &identities,
            1000,
            &pairing,
        );
        assert_eq!(level, AccessLevel::Untrusted);
    }

    #[test]
    fn a_named_local_identity_outranks_the_transport_default_for_its_uid() {
        let identities = identities_with(
            "batch-runner",
            Identity { name: "batch-runner".into(), access: AccessLevel::Metrics, credentials: Creds::Local { uid: 501 } },
        );
        let pairing = PairingWindow::new();
        let level = resolve_access(
            &PeerCredentials::UnixSocket { uid: 501 },
            Transport::UnixSocket,
            &identities,
            1000,
            &pairing,
        );
        assert_eq!(level, AccessLevel::Metrics);
    }

    #[test]
    fn a_paired_tls_fingerprint_resolves_by_identity_regardless_of_window_state() {
        let identities = identities_with(
            "laptop",
            Identity {
                name: "laptop".into(),
                access: AccessLevel::Admin,
                credentials: Creds::Tls { fingerprint: "abc123".into() },
            },
        );
        let pairing = PairingWindow::new();
        assert!(!pairing.is_open(0));
        let level = resolve_access(
            &PeerCredentials::Tls { fingerprint: "abc123".into() },
            Transport::HttpsMutualTls,
            &identities,
            1000,
            &pairing,
        );
        assert_eq!(level, AccessLevel::Admin);
    }
}
