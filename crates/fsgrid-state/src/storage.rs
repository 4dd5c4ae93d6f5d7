//! Registry persistence backends.
//!
//! - [`FileStorage`]: the whole registry as one schema JSON document,
//!   replaced atomically on every save
//! - [`RedbStorage`]: one redb row per node plus registry metadata
//!
//! Both are selected from a [`StorageUri`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fsgrid_core::StorageUri;
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::registry::Registry;
use crate::schema::{self, NodeRecord, RegistryDoc, SCHEMA_VERSION};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Where the registry lives between scheduler runs.
pub trait Storage: Send + Sync {
    /// Load the stored registry, or `None` if nothing was saved yet.
    fn load(&self) -> StateResult<Option<Registry>>;

    /// Durably replace the stored registry.
    fn save(&self, registry: &Registry) -> StateResult<()>;

    /// Remove everything stored.
    fn clear(&self) -> StateResult<()>;
}

/// Open the backend named by `uri`.
pub fn open(uri: &StorageUri) -> StateResult<Arc<dyn Storage>> {
    Ok(match uri {
        StorageUri::File(path) => Arc::new(FileStorage::new(path)),
        StorageUri::Redb(path) => Arc::new(RedbStorage::open(path)?),
    })
}

// ── JSON file ──────────────────────────────────────────────────────

pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Storage for FileStorage {
    fn load(&self) -> StateResult<Option<Registry>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StateError::Read(format!("{}: {e}", self.path.display()))),
        };
        let registry = schema::decode(&bytes)?;
        debug!(path = ?self.path, nodes = registry.nodes().len(), "registry loaded");
        Ok(Some(registry))
    }

    fn save(&self, registry: &Registry) -> StateResult<()> {
        let bytes = schema::encode(registry)?;
        let tmp = self.tmp_path();
        std::fs::write(&tmp, &bytes).map_err(map_err!(Write))?;
        std::fs::rename(&tmp, &self.path).map_err(map_err!(Write))?;
        Ok(())
    }

    fn clear(&self) -> StateResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::Write(e.to_string())),
        }
    }
}

// ── redb ───────────────────────────────────────────────────────────

/// Thread-safe registry store backed by redb.
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "registry store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory registry store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

impl Storage for RedbStorage {
    fn load(&self) -> StateResult<Option<Registry>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let meta = txn.open_table(META).map_err(map_err!(Table))?;

        let Some(version) = meta.get(META_VERSION).map_err(map_err!(Read))? else {
            return Ok(None);
        };
        let version: u32 =
            serde_json::from_slice(version.value()).map_err(map_err!(Deserialize))?;

        let framework_id: Option<String> = match meta.get(META_FRAMEWORK_ID).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
            None => None,
        };

        let order: Vec<String> = match meta.get(META_ORDER).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
            None => Vec::new(),
        };

        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        let mut nodes = Vec::with_capacity(order.len());
        for id in &order {
            let guard = table
                .get(id.as_str())
                .map_err(map_err!(Read))?
                .ok_or_else(|| StateError::Corrupt(format!("missing node record {id}")))?;
            let record: NodeRecord =
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            nodes.push(record);
        }

        let doc = RegistryDoc {
            version,
            framework_id,
            nodes,
        };
        let registry = doc.into_registry()?;
        debug!(nodes = registry.nodes().len(), "registry loaded");
        Ok(Some(registry))
    }

    fn save(&self, registry: &Registry) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            clear_table(&mut table)?;
            for node in registry.nodes() {
                let value =
                    serde_json::to_vec(&NodeRecord::from(node)).map_err(map_err!(Serialize))?;
                table
                    .insert(node.id.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }

            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
            let version = serde_json::to_vec(&SCHEMA_VERSION).map_err(map_err!(Serialize))?;
            let framework_id =
                serde_json::to_vec(&registry.framework_id()).map_err(map_err!(Serialize))?;
            let order = serde_json::to_vec(&registry.ids()).map_err(map_err!(Serialize))?;
            meta.insert(META_VERSION, version.as_slice())
                .map_err(map_err!(Write))?;
            meta.insert(META_FRAMEWORK_ID, framework_id.as_slice())
                .map_err(map_err!(Write))?;
            meta.insert(META_ORDER, order.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn clear(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            clear_table(&mut table)?;
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
            clear_table(&mut meta)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

fn clear_table(table: &mut redb::Table<'_, &str, &[u8]>) -> StateResult<()> {
    let keys: Vec<String> = table
        .iter()
        .map_err(map_err!(Read))?
        .map(|entry| entry.map(|(key, _)| key.value().to_string()))
        .collect::<Result<_, _>>()
        .map_err(map_err!(Read))?;
    for key in &keys {
        table.remove(key.as_str()).map_err(map_err!(Write))?;
    }
    Ok(())
}

/// Load the registry from `storage`, or start empty.
pub fn load_or_default(storage: &dyn Storage) -> StateResult<Registry> {
    Ok(storage.load()?.unwrap_or_default())
}
