use std::time::Duration;

use derive_new::new;

/// Default bech32 prefix of Helios accounts.
pub const DEFAULT_PREFIX: &str = "helios";

/// Default gas token.
pub const DEFAULT_FEE_DENOM: &str = "ahelios";

/// Cosmos specific connection config
#[derive(Debug, Clone, new)]
pub struct ConnectionConf {
    /// Tendermint RPC endpoints, the first one is preferred
    rpc_urls: Vec<String>,
    /// Home chain id, e.g. `helios-1`
    chain_id: String,
    /// Bech32 prefix of account addresses
    prefix: String,
    /// Denom fees are paid in
    fee_denom: String,
    /// Price of one unit of gas in `fee_denom`
    gas_price: f64,
    /// Multiplier applied to the simulated gas
    gas_adjustment: f64,
    /// Deadline of a single RPC attempt
    timeout: Duration,
}

impl ConnectionConf {
    /// RPC endpoints
    pub fn rpc_urls(&self) -> &[String] {
        &self.rpc_urls
    }

    /// Chain id
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Account prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Fee denom
    pub fn fee_denom(&self) -> &str {
        &self.fee_denom
    }

    /// Gas price
    pub fn gas_price(&self) -> f64 {
        self.gas_price
    }

    /// Gas adjustment, never below 1
    pub fn gas_adjustment(&self) -> f64 {
        self.gas_adjustment.max(1.0)
    }

    /// Attempt timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fee for `gas_limit` units of gas, rounded up.
    pub fn fee_amount(&self, gas_limit: u64) -> u128 {
        (gas_limit as f64 * self.gas_price).ceil() as u128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_rounds_up() {
        let conf = ConnectionConf::new(
            vec!["http://localhost:26657".into()],
            "helios-1".into(),
            DEFAULT_PREFIX.into(),
            DEFAULT_FEE_DENOM.into(),
            0.5,
            0.8,
            Duration::from_secs(5),
        );
        assert_eq!(conf.fee_amount(3), 2);
        assert_eq!(conf.gas_adjustment(), 1.0);
    }
}
