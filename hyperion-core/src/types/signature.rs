use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ChainCommunicationError, ChainResult, H256};

/// An ECDSA signature split into the form the bridge contract consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EthSignature {
    /// Recovery id, always 27 or 28
    pub v: u8,
    /// r
    pub r: H256,
    /// s
    pub s: H256,
}

impl EthSignature {
    /// Placeholder emitted for members without a confirmation.
    pub fn zero() -> Self {
        Self {
            v: 0,
            r: H256::zero(),
            s: H256::zero(),
        }
    }

    /// Parse a 65 byte `r || s || v` signature, normalizing `v` to {27, 28}.
    pub fn from_bytes(bytes: &[u8]) -> ChainResult<Self> {
        if bytes.len() != 65 {
            return Err(ChainCommunicationError::ParseError(format!(
                "signature must be 65 bytes, got {}",
                bytes.len()
            )));
        }
        let v = match bytes[64] {
            v @ (0 | 1) => v + 27,
            v @ (27 | 28) => v,
            v => {
                return Err(ChainCommunicationError::ParseError(format!(
                    "invalid signature recovery id {v}"
                )))
            }
        };
        Ok(Self {
            v,
            r: H256::from_slice(&bytes[..32]),
            s: H256::from_slice(&bytes[32..64]),
        })
    }

    /// Serialize as 65 bytes `r || s || v`.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(self.r.as_bytes());
        out.extend_from_slice(self.s.as_bytes());
        out.push(self.v);
        out
    }
}

impl FromStr for EthSignature {
    type Err = ChainCommunicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| ChainCommunicationError::ParseError(e.to_string()))?;
        Self::from_bytes(&raw)
    }
}

impl Display for EthSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_recovery_id() {
        let mut raw = vec![7u8; 65];
        raw[64] = 1;
        let sig = EthSignature::from_bytes(&raw).unwrap();
        assert_eq!(sig.v, 28);

        raw[64] = 0;
        assert_eq!(EthSignature::from_bytes(&raw).unwrap().v, 27);

        raw[64] = 27;
        assert_eq!(EthSignature::from_bytes(&raw).unwrap().v, 27);

        raw[64] = 5;
        assert!(EthSignature::from_bytes(&raw).is_err());
    }

    #[test]
    fn hex_form_round_trips_v() {
        let mut raw = vec![1u8; 65];
        raw[64] = 0;
        let hex = format!("0x{}", hex::encode(&raw));
        let sig: EthSignature = hex.parse().unwrap();
        assert_eq!(sig.to_vec()[64], 27);
        assert!(EthSignature::from_bytes(&raw[..64]).is_err());
    }
}
