//! Durable storage: an embedded `redb` database with three buckets
//! (`transfers`, `replay`, `retry`), each holding records wrapped in a small
//! versioned envelope so a future schema change can reject or migrate old
//! records instead of silently misreading them.

use redb::{Database, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::domain::error::BridgeError;

const TRANSFERS: TableDefinition<&str, Vec<u8>> = TableDefinition::new("transfers");
const REPLAY: TableDefinition<&str, Vec<u8>> = TableDefinition::new("replay");
const RETRY: TableDefinition<&str, Vec<u8>> = TableDefinition::new("retry");

/// Envelope every record is wrapped in before hitting disk.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Envelope {
    schema_version: u16,
    payload: Vec<u8>,
}

/// Embedded durable store backing the replay, retry, and transfer buckets.
///
/// Cheap to clone; all clones share the same underlying `redb::Database`.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

/// A record type that can be stored, carrying its own schema version and
/// the logic to reject or migrate an older on-disk version.
pub trait Versioned: Serialize + DeserializeOwned + Sized {
    const CURRENT_SCHEMA_VERSION: u16;

    fn schema_version(&self) -> u16;

    /// Migrate a record written under an older schema version forward to
    /// the current one. Returns an error if `from_version` is not a known
    /// prior version this type can migrate from.
    fn migrate(raw: Vec<u8>, from_version: u16) -> Result<Self, BridgeError>;
}

enum Bucket {
    Transfers,
    Replay,
    Retry,
}

impl Bucket {
    fn table(&self) -> TableDefinition<'static, &'static str, Vec<u8>> {
        match self {
            Bucket::Transfers => TRANSFERS,
            Bucket::Replay => REPLAY,
            Bucket::Retry => RETRY,
        }
    }
}

impl Store {
    /// Open (creating if absent) a `redb` database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let db = Database::create(path).map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
        let store = Store { db: Arc::new(db) };
        store.ensure_tables_exist()?;
        Ok(store)
    }

    fn ensure_tables_exist(&self) -> Result<(), BridgeError> {
        let txn = self.db.begin_write().map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
        {
            txn.open_table(TRANSFERS).map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
            txn.open_table(REPLAY).map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
            txn.open_table(RETRY).map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
        }
        txn.commit().map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
        Ok(())
    }

    fn put<T: Versioned>(&self, bucket: Bucket, key: &str, value: &T) -> Result<(), BridgeError> {
        let payload =
            bincode::serialize(value).map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
        let envelope = Envelope { schema_version: value.schema_version(), payload };
        let encoded = bincode::serialize(&envelope)
            .map_err(|e| BridgeError::StorageFailure(e.to_string()))?;

        let txn = self.db.begin_write().map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
        {
            let mut table =
                txn.open_table(bucket.table()).map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
            table
                .insert(key, encoded)
                .map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
        }
        txn.commit().map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
        Ok(())
    }

    fn get<T: Versioned>(&self, bucket: Bucket, key: &str) -> Result<Option<T>, BridgeError> {
        let txn = self.db.begin_read().map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
        let table =
            txn.open_table(bucket.table()).map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
        let Some(raw) = table.get(key).map_err(|e| BridgeError::StorageFailure(e.to_string()))?
        else {
            return Ok(None);
        };
        let envelope: Envelope = bincode::deserialize(raw.value().as_slice())
            .map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
        decode_envelope(envelope).map(Some)
    }

    fn delete(&self, bucket: Bucket, key: &str) -> Result<(), BridgeError> {
        let txn = self.db.begin_write().map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
        {
            let mut table =
                txn.open_table(bucket.table()).map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
            table.remove(key).map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
        }
        txn.commit().map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
        Ok(())
    }

    fn scan<T: Versioned>(&self, bucket: Bucket) -> Result<Vec<T>, BridgeError> {
        let txn = self.db.begin_read().map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
        let table =
            txn.open_table(bucket.table()).map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(|e| BridgeError::StorageFailure(e.to_string()))? {
            let (_, raw) = entry.map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
            let envelope: Envelope = bincode::deserialize(raw.value().as_slice())
                .map_err(|e| BridgeError::StorageFailure(e.to_string()))?;
            out.push(decode_envelope(envelope)?);
        }
        Ok(out)
    }

    pub fn put_transfer<T: Versioned>(&self, key: &str, value: &T) -> Result<(), BridgeError> {
        self.put(Bucket::Transfers, key, value)
    }

    pub fn get_transfer<T: Versioned>(&self, key: &str) -> Result<Option<T>, BridgeError> {
        self.get(Bucket::Transfers, key)
    }

    pub fn scan_transfers<T: Versioned>(&self) -> Result<Vec<T>, BridgeError> {
        self.scan(Bucket::Transfers)
    }

    pub fn put_replay<T: Versioned>(&self, key: &str, value: &T) -> Result<(), BridgeError> {
        self.put(Bucket::Replay, key, value)
    }

    pub fn get_replay<T: Versioned>(&self, key: &str) -> Result<Option<T>, BridgeError> {
        self.get(Bucket::Replay, key)
    }

    pub fn delete_replay(&self, key: &str) -> Result<(), BridgeError> {
        self.delete(Bucket::Replay, key)
    }

    pub fn scan_replay<T: Versioned>(&self) -> Result<Vec<T>, BridgeError> {
        self.scan(Bucket::Replay)
    }

    pub fn put_retry<T: Versioned>(&self, key: &str, value: &T) -> Result<(), BridgeError> {
        self.put(Bucket::Retry, key, value)
    }

    pub fn delete_retry(&self, key: &str) -> Result<(), BridgeError> {
        self.delete(Bucket::Retry, key)
    }

    pub fn scan_retry<T: Versioned>(&self) -> Result<Vec<T>, BridgeError> {
        self.scan(Bucket::Retry)
    }
}

fn decode_envelope<T: Versioned>(envelope: Envelope) -> Result<T, BridgeError> {
    if envelope.schema_version == T::CURRENT_SCHEMA_VERSION {
        bincode::deserialize(&envelope.payload).map_err(|e| BridgeError::StorageFailure(e.to_string()))
    } else if envelope.schema_version > T::CURRENT_SCHEMA_VERSION {
        Err(BridgeError::StorageFailure(format!(
            "record has schema_version {} but this build only understands up to {}",
            envelope.schema_version,
            T::CURRENT_SCHEMA_VERSION
        )))
    } else {
        T::migrate(envelope.payload, envelope.schema_version)
    }
}
