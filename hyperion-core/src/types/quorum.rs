use std::collections::HashMap;

use tracing::{debug, warn};

use crate::{ChainCommunicationError, ChainResult, Confirmation, EthSignature, Valset, H160};

/// Power a confirming signer set must reach, 66% of `2^32 - 1` rounded up.
pub const POWER_THRESHOLD: u64 = 2_834_678_415;

/// Signatures laid out in valset member order, as the contract expects them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepackedSignatures {
    /// One signature per member; zero triplets for members that did not sign
    pub signatures: Vec<EthSignature>,
    /// Summed power of members with a confirmation
    pub good_power: u64,
}

impl RepackedSignatures {
    /// Recovery ids in member order.
    pub fn v(&self) -> Vec<u8> {
        self.signatures.iter().map(|s| s.v).collect()
    }

    /// r components in member order.
    pub fn r(&self) -> Vec<[u8; 32]> {
        self.signatures.iter().map(|s| s.r.to_fixed_bytes()).collect()
    }

    /// s components in member order.
    pub fn s(&self) -> Vec<[u8; 32]> {
        self.signatures.iter().map(|s| s.s.to_fixed_bytes()).collect()
    }
}

/// Arrange `confirmations` in the member order of `valset` and check that the
/// confirming power reaches quorum.
///
/// Members without a confirmation get a zero placeholder. A valset with a
/// single member skips the quorum check. Confirmations that fail to parse are
/// treated as missing.
pub fn repack_signatures<C: Confirmation>(
    valset: &Valset,
    confirmations: &[C],
) -> ChainResult<RepackedSignatures> {
    let by_signer: HashMap<H160, &C> = confirmations
        .iter()
        .map(|c| (c.eth_address(), c))
        .collect();

    let mut repacked = RepackedSignatures::default();
    for member in &valset.members {
        let parsed = by_signer
            .get(&member.eth_address)
            .map(|c| c.signature().parse::<EthSignature>());
        match parsed {
            Some(Ok(sig)) => {
                repacked.good_power = repacked.good_power.saturating_add(member.power);
                repacked.signatures.push(sig);
            }
            Some(Err(err)) => {
                warn!(signer = ?member.eth_address, ?err, "Ignoring malformed confirmation");
                repacked.signatures.push(EthSignature::zero());
            }
            None => repacked.signatures.push(EthSignature::zero()),
        }
    }

    if valset.is_bootstrap() {
        debug!(nonce = valset.nonce, "Single member valset, skipping quorum check");
        return Ok(repacked);
    }

    if repacked.good_power < POWER_THRESHOLD {
        return Err(ChainCommunicationError::InsufficientVotingPower {
            good_power: repacked.good_power,
            threshold: POWER_THRESHOLD,
        });
    }
    Ok(repacked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ValsetConfirm, ValsetMember};

    fn confirm(addr: H160, v: u8) -> ValsetConfirm {
        let mut raw = vec![0x11u8; 65];
        raw[64] = v;
        ValsetConfirm {
            nonce: 1,
            orchestrator: "helios1abc".into(),
            eth_address: addr,
            signature: hex::encode(raw),
        }
    }

    fn valset() -> Valset {
        Valset::new(
            2,
            100,
            vec![
                ValsetMember::new(H160::repeat_byte(1), 2_147_483_647),
                ValsetMember::new(H160::repeat_byte(2), 1_073_741_824),
                ValsetMember::new(H160::repeat_byte(3), 1_073_741_824),
            ],
        )
    }

    #[test]
    fn reaches_quorum_with_enough_power() {
        let confirms = vec![
            confirm(H160::repeat_byte(2), 0),
            confirm(H160::repeat_byte(1), 1),
        ];
        let repacked = repack_signatures(&valset(), &confirms).unwrap();
        assert_eq!(repacked.good_power, 3_221_225_471);
        assert_eq!(repacked.v(), vec![28, 27, 0]);
        assert_eq!(repacked.signatures[2], EthSignature::zero());
    }

    #[test]
    fn rejects_insufficient_power() {
        let confirms = vec![confirm(H160::repeat_byte(1), 27)];
        let err = repack_signatures(&valset(), &confirms).unwrap_err();
        assert!(matches!(
            err,
            ChainCommunicationError::InsufficientVotingPower {
                good_power: 2_147_483_647,
                ..
            }
        ));
    }

    #[test]
    fn bootstrap_valset_skips_quorum() {
        let valset = Valset::new(1, 1, vec![ValsetMember::new(H160::repeat_byte(4), 10)]);
        let repacked = repack_signatures::<ValsetConfirm>(&valset, &[]).unwrap();
        assert_eq!(repacked.signatures, vec![EthSignature::zero()]);
    }

    #[test]
    #[tracing_test::traced_test]
    fn malformed_signature_counts_as_missing() {
        let mut bad = confirm(H160::repeat_byte(2), 0);
        bad.signature = "0xdeadbeef".into();
        let confirms = vec![confirm(H160::repeat_byte(1), 0), bad];
        assert!(repack_signatures(&valset(), &confirms).is_err());
        assert!(logs_contain("Ignoring malformed confirmation"));
    }

    #[test]
    fn ignores_confirmations_from_non_members() {
        let confirms = vec![confirm(H160::repeat_byte(9), 27)];
        assert!(repack_signatures(&valset(), &confirms).is_err());
    }
}
