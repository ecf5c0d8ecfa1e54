//! Embedded vector engine
//!
//! Collections are persisted in SQLite and brought into memory by
//! [`VectorStore::load_collection`], where the declared index structure is built.

use super::{
    AnnIndex, CollectionInfo, CollectionSchema, Entity, Hit, SearchRequest, StoreError,
    VectorStore,
};
use crate::registry::{CollectionName, IndexConfiguration};
use ahash::AHashMap;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

type DbPool = Pool<SqliteConnectionManager>;
type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    schema_json TEXT NOT NULL,
    index_json TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entities (
    collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    id INTEGER NOT NULL,
    text TEXT NOT NULL,
    vector BLOB NOT NULL,
    PRIMARY KEY (collection, id)
);
";

struct LoadedCollection {
    index: AnnIndex,
    texts: AHashMap<u64, String>,
}

/// SQLite-backed vector store
///
/// Acquire with [`EmbeddedStore::connect`] and release with
/// [`EmbeddedStore::disconnect`] (or by dropping it).
pub struct EmbeddedStore {
    pool: DbPool,
    location: Option<PathBuf>,
    loaded: RwLock<AHashMap<CollectionName, LoadedCollection>>,
}

impl EmbeddedStore {
    /// Open (creating if needed) a store file
    pub fn connect(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                    source: e,
                    context: format!("Failed to create store directory {:?}", parent),
                })?;
            }
        }

        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;"));
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        let store = Self::from_pool(pool, Some(path.to_path_buf()))?;
        tracing::info!("Connected to vector store at {:?}", path);
        Ok(store)
    }

    /// Store that lives only as long as this value
    pub fn in_memory() -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));

        // Every pooled connection to :memory: is its own database
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        Self::from_pool(pool, None)
    }

    fn from_pool(pool: DbPool, location: Option<PathBuf>) -> Result<Self, StoreError> {
        let store = Self {
            pool,
            location,
            loaded: RwLock::new(AHashMap::new()),
        };
        store.conn()?.execute_batch(SCHEMA)?;
        Ok(store)
    }

    /// Release the connection pool and every loaded collection
    pub fn disconnect(self) {
        match &self.location {
            Some(path) => tracing::info!("Disconnected from vector store at {:?}", path),
            None => tracing::debug!("Disconnected from in-memory vector store"),
        }
    }

    fn conn(&self) -> Result<PooledConn, StoreError> {
        self.pool.get().map_err(|e| StoreError::Pool(e.to_string()))
    }

    fn unload(&self, name: &CollectionName) -> Result<(), StoreError> {
        self.loaded
            .write()
            .map_err(|_| StoreError::Pool("loaded collection lock poisoned".to_string()))?
            .remove(name);
        Ok(())
    }

    fn read_meta(
        &self,
        conn: &rusqlite::Connection,
        name: &CollectionName,
    ) -> Result<(CollectionSchema, Option<IndexConfiguration>, String), StoreError> {
        let row: Option<(String, Option<String>, String)> = conn
            .query_row(
                "SELECT schema_json, index_json, created_at FROM collections WHERE name = ?1",
                params![name.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (schema_json, index_json, created_at) =
            row.ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        let schema: CollectionSchema =
            serde_json::from_str(&schema_json).map_err(|e| corrupt(name, e))?;
        let index = index_json
            .map(|json| serde_json::from_str::<IndexConfiguration>(&json))
            .transpose()
            .map_err(|e| corrupt(name, e))?;

        Ok((schema, index, created_at))
    }

    fn count_with(&self, conn: &rusqlite::Connection, name: &CollectionName) -> Result<u64, StoreError> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE collection = ?1",
            params![name.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl VectorStore for EmbeddedStore {
    fn has_collection(&self, name: &CollectionName) -> Result<bool, StoreError> {
        let exists: bool = self.conn()?.query_row(
            "SELECT EXISTS(SELECT 1 FROM collections WHERE name = ?1)",
            params![name.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn describe_collection(&self, name: &CollectionName) -> Result<CollectionInfo, StoreError> {
        let conn = self.conn()?;
        let (schema, index, created_at) = self.read_meta(&conn, name)?;
        let count = self.count_with(&conn, name)?;
        Ok(CollectionInfo {
            schema,
            index,
            count,
            created_at,
        })
    }

    fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        let names: Vec<String> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare("SELECT name FROM collections ORDER BY name")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<_, _>>()?
        };

        names
            .into_iter()
            .map(|name| {
                self.describe_collection(&CollectionName::from_stored(name))
            })
            .collect()
    }

    fn drop_collection(&self, name: &CollectionName) -> Result<(), StoreError> {
        self.unload(name)?;
        let mut conn = self.conn()?;

        // Entities go with their collection row through ON DELETE CASCADE
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM collections WHERE name = ?1",
            params![name.as_str()],
        )?;
        tx.commit()?;
        if removed > 0 {
            tracing::info!("Dropped collection {}", name);
        }
        Ok(())
    }

    fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError> {
        if self.has_collection(&schema.name)? {
            return Err(StoreError::CollectionExists(schema.name.to_string()));
        }

        let schema_json = serde_json::to_string(schema).map_err(|e| corrupt(&schema.name, e))?;
        self.conn()?.execute(
            "INSERT INTO collections (name, schema_json, index_json, created_at) VALUES (?1, ?2, NULL, ?3)",
            params![schema.name.as_str(), schema_json, chrono::Utc::now().to_rfc3339()],
        )?;

        tracing::debug!(
            "Created collection {} ({}D, text field {})",
            schema.name,
            schema.dimension,
            schema.text_field
        );
        Ok(())
    }

    fn create_index(
        &self,
        name: &CollectionName,
        config: &IndexConfiguration,
    ) -> Result<(), StoreError> {
        // Reject bad parameters now rather than at load time
        let (schema, _, _) = self.read_meta(&*self.conn()?, name)?;
        AnnIndex::build(config, schema.dimension, Vec::new())?;

        let index_json = serde_json::to_string(config).map_err(|e| corrupt(name, e))?;
        self.conn()?.execute(
            "UPDATE collections SET index_json = ?2 WHERE name = ?1",
            params![name.as_str(), index_json],
        )?;
        self.unload(name)?;

        tracing::debug!("Declared {} index on {}", config.label(), name);
        Ok(())
    }

    fn insert(&self, name: &CollectionName, entities: &[Entity]) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let (schema, _, _) = self.read_meta(&conn, name)?;

        for entity in entities {
            if entity.vector.len() != schema.dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: schema.dimension,
                    actual: entity.vector.len(),
                });
            }
            let length = entity.text.chars().count();
            if length > schema.text_max_length {
                return Err(StoreError::TextTooLong {
                    id: entity.id,
                    length,
                    max: schema.text_max_length,
                });
            }
        }

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO entities (collection, id, text, vector) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for entity in entities {
                stmt.execute(params![
                    name.as_str(),
                    entity.id as i64,
                    entity.text,
                    encode_vector(&entity.vector)
                ])?;
            }
        }
        tx.commit()?;

        self.unload(name)?;
        Ok(entities.len())
    }

    fn count(&self, name: &CollectionName) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        // Surface a missing collection instead of a zero count
        self.read_meta(&conn, name)?;
        self.count_with(&conn, name)
    }

    fn load_collection(&self, name: &CollectionName) -> Result<(), StoreError> {
        let already_loaded = self
            .loaded
            .read()
            .map_err(|_| StoreError::Pool("loaded collection lock poisoned".to_string()))?
            .contains_key(name);
        if already_loaded {
            return Ok(());
        }

        let (schema, index, entries) = {
            let conn = self.conn()?;
            let (schema, index, _) = self.read_meta(&conn, name)?;
            let index = index.ok_or_else(|| StoreError::NoIndex(name.to_string()))?;

            let mut stmt = conn
                .prepare("SELECT id, text, vector FROM entities WHERE collection = ?1 ORDER BY id")?;
            let rows = stmt.query_map(params![name.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0)? as u64,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })?;
            let entries: Vec<(u64, String, Vec<u8>)> = rows.collect::<Result<_, _>>()?;
            (schema, index, entries)
        };

        let mut texts = AHashMap::with_capacity(entries.len());
        let mut vectors = Vec::with_capacity(entries.len());
        for (id, text, blob) in entries {
            let vector = decode_vector(&blob).ok_or_else(|| StoreError::Corrupt {
                collection: name.to_string(),
                message: format!("vector blob for id {} has {} bytes", id, blob.len()),
            })?;
            texts.insert(id, text);
            vectors.push((id, vector));
        }

        let index = AnnIndex::build(&index, schema.dimension, vectors)?;
        tracing::info!(
            "Loaded collection {} ({} vectors, {} {})",
            name,
            index.len(),
            index.index_type(),
            index.metric()
        );

        self.loaded
            .write()
            .map_err(|_| StoreError::Pool("loaded collection lock poisoned".to_string()))?
            .insert(name.clone(), LoadedCollection { index, texts });
        Ok(())
    }

    fn search(
        &self,
        name: &CollectionName,
        request: &SearchRequest<'_>,
    ) -> Result<Vec<Hit>, StoreError> {
        let loaded = self
            .loaded
            .read()
            .map_err(|_| StoreError::Pool("loaded collection lock poisoned".to_string()))?;

        let collection = match loaded.get(name) {
            Some(collection) => collection,
            None if self.has_collection(name)? => {
                return Err(StoreError::NotLoaded(name.to_string()))
            }
            None => return Err(StoreError::CollectionNotFound(name.to_string())),
        };

        if collection.index.metric() != request.metric {
            return Err(StoreError::MetricMismatch {
                index: collection.index.metric(),
                requested: request.metric,
            });
        }

        let hits = collection
            .index
            .search(request.vector, request.limit, request.params)?
            .into_iter()
            .map(|(id, score)| Hit {
                id,
                score,
                text: collection.texts.get(&id).cloned().unwrap_or_default(),
            })
            .collect();

        Ok(hits)
    }
}

fn corrupt(name: &CollectionName, e: serde_json::Error) -> StoreError {
    StoreError::Corrupt {
        collection: name.to_string(),
        message: e.to_string(),
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}
