use ethers::types::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

use hyperion_core::utils::{parse_wei, scale_wei};
use hyperion_core::{ChainCommunicationError, ChainResult};

/// Default multiplier applied to the suggested gas price.
pub const DEFAULT_GAS_PRICE_ADJUSTMENT: f64 = 1.3;
/// Default gas limit used when estimation is disabled.
pub const DEFAULT_GAS_LIMIT: u64 = 2_000_000;

/// Gas pricing parameters of one counterparty chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasConfig {
    /// Multiplier applied to `eth_gasPrice`
    pub gas_price_adjustment: f64,
    /// Hard cap on the adjusted price, in wei
    pub max_gas_price: U256,
    /// Price used when the node can not suggest one, in wei
    pub fallback_gas_price: U256,
    /// Whether to call `eth_estimateGas` before sending
    pub estimate_gas: bool,
    /// Gas limit used when estimation is disabled
    pub gas_limit: U256,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            gas_price_adjustment: DEFAULT_GAS_PRICE_ADJUSTMENT,
            max_gas_price: U256::from(100_000_000_000u64),
            fallback_gas_price: U256::from(10_000_000_000u64),
            estimate_gas: true,
            gas_limit: U256::from(DEFAULT_GAS_LIMIT),
        }
    }
}

impl GasConfig {
    /// Build from the string forms stored in chain settings, e.g. `"100gwei"`.
    pub fn from_strings(
        gas_price_adjustment: f64,
        max_gas_price: &str,
        fallback_gas_price: &str,
        estimate_gas: bool,
    ) -> ChainResult<Self> {
        Ok(Self {
            gas_price_adjustment,
            max_gas_price: parse_wei(max_gas_price)?,
            fallback_gas_price: parse_wei(fallback_gas_price)?,
            estimate_gas,
            ..Default::default()
        })
    }

    /// Adjust `suggested` and make sure it stays under the cap.
    pub fn bounded_gas_price(&self, suggested: U256) -> ChainResult<U256> {
        let price = scale_wei(suggested, self.gas_price_adjustment);
        if price > self.max_gas_price {
            return Err(ChainCommunicationError::GasPriceTooHigh {
                price,
                max: self.max_gas_price,
            });
        }
        debug!(%suggested, %price, adjustment = self.gas_price_adjustment, "Adjusted gas price");
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gwei_strings() {
        let config = GasConfig::from_strings(1.0, "500gwei", "500", true).unwrap();
        assert_eq!(config.max_gas_price, U256::from(500_000_000_000u64));
        assert_eq!(config.fallback_gas_price, U256::from(500u64));
    }

    #[test]
    fn applies_adjustment_under_the_cap() {
        let config = GasConfig::default();
        let price = config.bounded_gas_price(U256::from(10_000_000_000u64)).unwrap();
        assert_eq!(price, U256::from(13_000_000_000u64));
    }

    #[test]
    fn rejects_price_above_cap() {
        let config = GasConfig::from_strings(1.3, "100gwei", "10gwei", true).unwrap();
        let err = config
            .bounded_gas_price(U256::from(80_000_000_000u64))
            .unwrap_err();
        assert!(matches!(
            err,
            ChainCommunicationError::GasPriceTooHigh { max, .. } if max == U256::from(100_000_000_000u64)
        ));
    }
}
