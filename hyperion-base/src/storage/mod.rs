//! JSON files kept under the data directory:
//!
//! ```text
//! <data_dir>/fees.json                    append-only fee ledger
//! <data_dir>/rpcs/<chain_id>.json         endpoints with reputation and usage
//! <data_dir>/chain_settings/<chain_id>.json
//! <data_dir>/runners/<chain_id>           instances to start on boot
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use hyperion_core::rpc_clients::EndpointInfo;
use hyperion_core::ChainId;

pub use chain_settings::*;
pub use fees::*;

mod chain_settings;
mod fees;

const FEES_FILE: &str = "fees.json";
const RPCS_DIR: &str = "rpcs";
const CHAIN_SETTINGS_DIR: &str = "chain_settings";
const RUNNERS_DIR: &str = "runners";

/// Errors of the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem error
    #[error("{path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// A file does not hold the expected JSON
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Rejected input
    #[error("{0}")]
    Invalid(String),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_owned(),
        source,
    }
}

/// Handle on the data directory. Writers are serialized per process.
#[derive(Debug)]
pub struct DataDir {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl DataDir {
    /// Open `root`, creating it and its sub directories.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        for dir in [RPCS_DIR, CHAIN_SETTINGS_DIR, RUNNERS_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path).map_err(io_err(&path))?;
        }
        debug!(root = ?root, "Opened data directory");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StorageError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(path)(err)),
        }
    }

    /// Replace `path` atomically with the pretty printed `value`.
    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), StorageError> {
        let dir = path.parent().unwrap_or(self.root.as_path());
        let mut file = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
        serde_json::to_writer_pretty(&mut file, value)?;
        file.flush().map_err(io_err(path))?;
        file.persist(path).map_err(|err| io_err(path)(err.error))?;
        Ok(())
    }

    /// Append a record to the fee ledger.
    pub fn append_fee(&self, record: FeeRecord) -> Result<(), StorageError> {
        let path = self.root.join(FEES_FILE);
        let _guard = self.write_lock.lock();
        let mut records: Vec<FeeRecord> = self.read_json(&path)?.unwrap_or_default();
        records.push(record);
        self.write_json(&path, &records)
    }

    /// The fee ledger, optionally restricted to one chain.
    pub fn fees(&self, chain_id: Option<ChainId>) -> Result<Vec<FeeRecord>, StorageError> {
        let records: Vec<FeeRecord> = self
            .read_json(&self.root.join(FEES_FILE))?
            .unwrap_or_default();
        Ok(records
            .into_iter()
            .filter(|r| chain_id.map_or(true, |id| r.chain_id == id))
            .collect())
    }

    fn rpcs_path(&self, chain_id: ChainId) -> PathBuf {
        self.root.join(RPCS_DIR).join(format!("{chain_id}.json"))
    }

    /// Persisted endpoints of `chain_id`. A corrupt file is ignored.
    pub fn rpcs(&self, chain_id: ChainId) -> Vec<EndpointInfo> {
        match self.read_json(&self.rpcs_path(chain_id)) {
            Ok(endpoints) => endpoints.unwrap_or_default(),
            Err(err) => {
                warn!(chain_id, ?err, "Ignoring unreadable endpoint file");
                vec![]
            }
        }
    }

    /// Replace the persisted endpoints of `chain_id`.
    pub fn save_rpcs(&self, chain_id: ChainId, endpoints: &[EndpointInfo]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        self.write_json(&self.rpcs_path(chain_id), endpoints)
    }

    fn chain_settings_path(&self, chain_id: ChainId) -> PathBuf {
        self.root
            .join(CHAIN_SETTINGS_DIR)
            .join(format!("{chain_id}.json"))
    }

    /// Settings of `chain_id` merged over the defaults.
    pub fn chain_settings(&self, chain_id: ChainId) -> Result<ChainSettings, StorageError> {
        Ok(self
            .read_json(&self.chain_settings_path(chain_id))?
            .unwrap_or_default())
    }

    /// Apply `patch` over the stored settings of `chain_id` and persist the
    /// result.
    pub fn set_chain_settings(
        &self,
        chain_id: ChainId,
        patch: &Map<String, Value>,
    ) -> Result<ChainSettings, StorageError> {
        let _guard = self.write_lock.lock();
        let merged = self.chain_settings(chain_id)?.merged(patch)?;
        self.write_json(&self.chain_settings_path(chain_id), &merged)?;
        Ok(merged)
    }

    fn runner_path(&self, chain_id: ChainId) -> PathBuf {
        self.root.join(RUNNERS_DIR).join(chain_id.to_string())
    }

    /// Mark `chain_id` to be started on boot.
    pub fn add_runner(&self, chain_id: ChainId) -> Result<(), StorageError> {
        let path = self.runner_path(chain_id);
        fs::write(&path, b"").map_err(io_err(&path))
    }

    /// Forget the boot marker of `chain_id`.
    pub fn remove_runner(&self, chain_id: ChainId) -> Result<(), StorageError> {
        let path = self.runner_path(chain_id);
        match fs::remove_file(&path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(io_err(&path)(err)),
            _ => Ok(()),
        }
    }

    /// Chains with a boot marker, ascending.
    pub fn runners(&self) -> Result<Vec<ChainId>, StorageError> {
        let dir = self.root.join(RUNNERS_DIR);
        let mut chains = fs::read_dir(&dir)
            .map_err(io_err(&dir))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str()?.parse::<ChainId>().ok())
            .collect::<Vec<_>>();
        chains.sort_unstable();
        Ok(chains)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use hyperion_core::{TxOutcome, H160, H256, U256};

    use super::*;

    fn data_dir() -> (tempfile::TempDir, DataDir) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::open(tmp.path().join("data")).unwrap();
        (tmp, dir)
    }

    fn outcome(byte: u8) -> TxOutcome {
        TxOutcome {
            tx_hash: H256::repeat_byte(byte),
            gas_cost: U256::from(21_000u64),
        }
    }

    #[test]
    fn fee_ledger_appends_and_filters() {
        let (_tmp, dir) = data_dir();
        assert!(dir.fees(None).unwrap().is_empty());

        dir.append_fee(FeeRecord::new(1, FeeKind::Valset, &outcome(1), H160::zero(), U256::zero(), 10))
            .unwrap();
        dir.append_fee(FeeRecord::new(
            97,
            FeeKind::Batch,
            &outcome(2),
            H160::repeat_byte(7),
            U256::from(5u64),
            20,
        ))
        .unwrap();

        assert_eq!(dir.fees(None).unwrap().len(), 2);
        let bsc = dir.fees(Some(97)).unwrap();
        assert_eq!(bsc.len(), 1);
        assert_eq!(bsc[0].kind, FeeKind::Batch);
        assert_eq!(bsc[0].tx_hash, H256::repeat_byte(2));

        let raw: Value =
            serde_json::from_slice(&fs::read(dir.root().join(FEES_FILE)).unwrap()).unwrap();
        assert_eq!(raw[0]["kind"], "valset");
    }

    #[test]
    fn chain_settings_merge_over_defaults() {
        let (_tmp, dir) = data_dir();
        assert_eq!(dir.chain_settings(1).unwrap(), ChainSettings::default());

        let patch = json!({"min_batch_fee_usd": 51.0});
        let stored = dir.set_chain_settings(1, patch.as_object().unwrap()).unwrap();
        assert_eq!(stored.min_batch_fee_usd, 51.0);
        assert_eq!(dir.chain_settings(1).unwrap(), stored);
        assert_eq!(dir.chain_settings(2).unwrap(), ChainSettings::default());
    }

    #[test]
    fn runner_markers() {
        let (_tmp, dir) = data_dir();
        dir.add_runner(97).unwrap();
        dir.add_runner(1).unwrap();
        dir.add_runner(97).unwrap();
        assert_eq!(dir.runners().unwrap(), vec![1, 97]);
        dir.remove_runner(97).unwrap();
        dir.remove_runner(97).unwrap();
        assert_eq!(dir.runners().unwrap(), vec![1]);
    }

    #[test]
    fn endpoints_round_trip_and_tolerate_corruption() {
        let (_tmp, dir) = data_dir();
        let endpoints = vec![EndpointInfo {
            url: "https://rpc.example".into(),
            reputation: 4,
            primary: false,
            tested: true,
            usage: vec![],
        }];
        dir.save_rpcs(1, &endpoints).unwrap();
        assert_eq!(dir.rpcs(1), endpoints);

        fs::write(dir.rpcs_path(2), "not json").unwrap();
        assert!(dir.rpcs(2).is_empty());
    }
}
