use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use hyperion_core::{ChainCommunicationError, ChainResult};
use hyperion_ethereum::GasConfig;

use super::StorageError;

/// Runtime settings of one counterparty chain, editable through the admin
/// API. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    /// Batches are only requested once their fees reach this value; zero
    /// admits every batch
    pub min_batch_fee_usd: f64,
    /// Multiplier applied to the suggested gas price
    pub eth_gas_price_adjustment: f64,
    /// Cap on the adjusted gas price, e.g. `"100gwei"`
    pub eth_max_gas_price: String,
    /// Whether to estimate gas before sending
    pub estimate_gas: bool,
    /// Gas price used when the node can not suggest one
    pub eth_gas_price: String,
    /// Minimum age of a confirmed valset before it is relayed, e.g. `"5m"`
    pub valset_offset_dur: String,
    /// Minimum age of a confirmed batch before it is relayed
    pub batch_offset_dur: String,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            min_batch_fee_usd: 0.0,
            eth_gas_price_adjustment: 1.3,
            eth_max_gas_price: "100gwei".into(),
            estimate_gas: true,
            eth_gas_price: "10gwei".into(),
            valset_offset_dur: "5m".into(),
            batch_offset_dur: "2m".into(),
        }
    }
}

fn parse_duration(value: &str) -> ChainResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|err| ChainCommunicationError::ParseError(format!("duration {value}: {err}")))
}

impl ChainSettings {
    /// Gas parameters of the committer.
    pub fn gas_config(&self) -> ChainResult<GasConfig> {
        GasConfig::from_strings(
            self.eth_gas_price_adjustment,
            &self.eth_max_gas_price,
            &self.eth_gas_price,
            self.estimate_gas,
        )
    }

    /// Valset relay offset.
    pub fn valset_offset(&self) -> ChainResult<Duration> {
        parse_duration(&self.valset_offset_dur)
    }

    /// Batch relay offset.
    pub fn batch_offset(&self) -> ChainResult<Duration> {
        parse_duration(&self.batch_offset_dur)
    }

    /// Check that every field parses.
    pub fn validate(&self) -> ChainResult<()> {
        self.gas_config()?;
        self.valset_offset()?;
        self.batch_offset()?;
        if self.min_batch_fee_usd < 0.0 || !self.min_batch_fee_usd.is_finite() {
            return Err(ChainCommunicationError::ParseError(format!(
                "min_batch_fee_usd must be a non-negative number, got {}",
                self.min_batch_fee_usd
            )));
        }
        Ok(())
    }

    /// Apply the keys of `patch` over these settings. Unknown keys are
    /// rejected.
    pub fn merged(&self, patch: &Map<String, Value>) -> Result<Self, StorageError> {
        let Value::Object(mut current) = serde_json::to_value(self)? else {
            return Err(StorageError::Invalid("chain settings must be an object".into()));
        };
        for (key, value) in patch {
            if !current.contains_key(key) {
                return Err(StorageError::Invalid(format!("unknown chain setting {key}")));
            }
            current.insert(key.clone(), value.clone());
        }
        let merged: Self = serde_json::from_value(Value::Object(current))?;
        merged
            .validate()
            .map_err(|err| StorageError::Invalid(err.to_string()))?;
        Ok(merged)
    }
}
