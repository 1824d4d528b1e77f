//! Resolution of validator pubkeys to reachable transport peers.

use blinknet_core::SnRegistry;
use blinknet_types::{SnPublicKey, SoftwareVersion, X25519PublicKey};
use std::collections::HashMap;
use tracing::trace;

/// A reachable quorum peer: transport identity, dialable address, and the
/// software version it last proved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    /// Transport pubkey.
    pub x25519_pubkey: X25519PublicKey,
    /// `tcp://ip:port` connect string. The format is relied upon by peers
    /// and must not change.
    pub address: String,
    /// Software version from the last uptime proof.
    pub version: SoftwareVersion,
}

/// Resolve candidate pubkeys against the registry.
///
/// A node resolves only if it is active and its last uptime proof carries an
/// x25519 pubkey, a public IP, and a quorumnet port; anything else is
/// silently dropped (with a trace log), since unreachable quorum members are
/// routine.
pub fn resolve_peers<'a>(
    registry: &dyn SnRegistry,
    candidates: impl IntoIterator<Item = &'a SnPublicKey>,
) -> HashMap<SnPublicKey, Peer> {
    let mut remotes = HashMap::new();
    for pubkey in candidates {
        let Some(proof) = registry.proof(pubkey) else {
            trace!(peer = %pubkey, "dropping unregistered quorum peer");
            continue;
        };
        if !proof.active {
            trace!(peer = %pubkey, "dropping inactive quorum peer");
            continue;
        }
        let (Some(x25519_pubkey), Some(ip)) = (proof.x25519_pubkey, proof.public_ip) else {
            trace!(peer = %pubkey, "dropping quorum peer without x25519 pubkey or public ip");
            continue;
        };
        if proof.quorumnet_port == 0 {
            trace!(peer = %pubkey, "dropping quorum peer without quorumnet port");
            continue;
        }
        remotes.insert(
            *pubkey,
            Peer {
                x25519_pubkey,
                address: format!("tcp://{}:{}", ip, proof.quorumnet_port),
                version: proof.version,
            },
        );
    }
    remotes
}

#[cfg(test)]
mod tests {
    use super::*;
    use blinknet_core::testing::TestRegistry;
    use blinknet_core::SnProof;
    use std::net::Ipv4Addr;

    fn pk(n: u8) -> SnPublicKey {
        SnPublicKey::from_bytes([n; 32])
    }

    fn xpk(n: u8) -> X25519PublicKey {
        X25519PublicKey::from_bytes([n; 32])
    }

    fn good_proof(n: u8) -> SnProof {
        SnProof {
            active: true,
            x25519_pubkey: Some(xpk(n)),
            public_ip: Some(Ipv4Addr::new(10, 0, 0, n)),
            quorumnet_port: 20000 + n as u16,
            version: SoftwareVersion::new(9, n as u16, 0),
        }
    }

    #[test]
    fn test_resolves_complete_proofs() {
        let registry = TestRegistry::new();
        registry.put_proof(pk(1), good_proof(1));

        let remotes = resolve_peers(&registry, [&pk(1)]);
        let peer = &remotes[&pk(1)];
        assert_eq!(peer.address, "tcp://10.0.0.1:20001");
        assert_eq!(peer.x25519_pubkey, xpk(1));
    }

    #[test]
    fn test_drops_incomplete_or_inactive() {
        let registry = TestRegistry::new();
        registry.put_proof(pk(1), good_proof(1));
        registry.put_proof(
            pk(2),
            SnProof {
                active: false,
                ..good_proof(2)
            },
        );
        registry.put_proof(
            pk(3),
            SnProof {
                x25519_pubkey: None,
                ..good_proof(3)
            },
        );
        registry.put_proof(
            pk(4),
            SnProof {
                public_ip: None,
                ..good_proof(4)
            },
        );
        registry.put_proof(
            pk(5),
            SnProof {
                quorumnet_port: 0,
                ..good_proof(5)
            },
        );
        // pk(6) not registered at all.

        let candidates = [pk(1), pk(2), pk(3), pk(4), pk(5), pk(6)];
        let remotes = resolve_peers(&registry, candidates.iter());
        assert_eq!(remotes.len(), 1);
        assert!(remotes.contains_key(&pk(1)));
    }
}
