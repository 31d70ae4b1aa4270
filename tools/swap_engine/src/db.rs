//! Recovery store: everything needed to finish a swap without its live session.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use alloy_primitives::B256;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use xmr_wallet::PrivateKey;

use crate::ports::{ContractSwap, SwapId};
use crate::role::RoleKind;
use crate::session::{CounterpartyKeys, SwapTerms, XmrLock};
use crate::state::Stage;

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub offer_id: B256,
    pub role: RoleKind,
    /// Last stage the live session reached.
    pub stage: Stage,
    pub terms: SwapTerms,
    /// Own spend key, little-endian hex.
    pub secret: String,
    pub counterparty: Option<CounterpartyKeys>,
    pub swap_id: Option<SwapId>,
    pub contract: Option<ContractSwap>,
    pub shared_spend_key: Option<String>,
    pub restore_height: u64,
    /// Block the contract swap was created in, or seen pending at.
    #[serde(default)]
    pub from_block: u64,
    /// Responder only: the monero lock, written before the transfer.
    #[serde(default)]
    pub xmr_lock: Option<XmrLock>,
}

impl RecoveryRecord {
    pub fn secret(&self) -> Result<PrivateKey> {
        PrivateKey::from_hex(&self.secret)
            .with_context(|| format!("Invalid secret in record for offer {}", self.offer_id))
    }

    pub fn contract(&self) -> Result<(SwapId, ContractSwap)> {
        match (self.swap_id, self.contract) {
            (Some(swap_id), Some(swap)) => Ok((swap_id, swap)),
            _ => Err(anyhow!("offer {} never reached the contract", self.offer_id)),
        }
    }
}

impl fmt::Debug for RecoveryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryRecord")
            .field("offer_id", &self.offer_id)
            .field("role", &self.role)
            .field("stage", &self.stage)
            .field("swap_id", &self.swap_id)
            .field("restore_height", &self.restore_height)
            .field("from_block", &self.from_block)
            .field("xmr_lock", &self.xmr_lock)
            .finish_non_exhaustive()
    }
}

pub trait RecoveryStore: Send + Sync {
    fn save(&self, record: &RecoveryRecord) -> Result<()>;
    fn load(&self, offer_id: &B256) -> Result<Option<RecoveryRecord>>;
}

/// One pretty-printed JSON file per offer.
pub struct JsonFileStore {
    base_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)
            .with_context(|| format!("Failed to create directory: {:?}", base_dir))?;
        Ok(Self { base_dir })
    }

    fn record_path(&self, offer_id: &B256) -> PathBuf {
        self.base_dir.join(format!("{offer_id}.json"))
    }
}

impl RecoveryStore for JsonFileStore {
    fn save(&self, record: &RecoveryRecord) -> Result<()> {
        let path = self.record_path(&record.offer_id);
        let json = serde_json::to_string_pretty(record)
            .with_context(|| format!("Failed to serialize record for offer {}", record.offer_id))?;
        // write-then-rename so a crash never leaves a truncated record
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write record file: {:?}", tmp))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to move record file into place: {:?}", path))?;
        Ok(())
    }

    fn load(&self, offer_id: &B256) -> Result<Option<RecoveryRecord>> {
        let path = self.record_path(offer_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read record file: {:?}", path))?;
        let record = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse record file: {:?}", path))?;
        Ok(Some(record))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<B256, RecoveryRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecoveryStore for MemoryStore {
    fn save(&self, record: &RecoveryRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow!("memory store poisoned"))?
            .insert(record.offer_id, record.clone());
        Ok(())
    }

    fn load(&self, offer_id: &B256) -> Result<Option<RecoveryRecord>> {
        Ok(self
            .records
            .lock()
            .map_err(|_| anyhow!("memory store poisoned"))?
            .get(offer_id)
            .cloned())
    }
}
