//! Coordinate axis cache.
//!
//! Coordinate axes (`lat`, `lon`) of a dataset never change, so they are fetched once and then
//! served from a key-value store. Records keep the source element type so a cached axis reads
//! back exactly as it was fetched.

use crate::array::AxisRange;
use crate::error::AnalysisError;
use crate::metrics::COORD_CACHE_MISSES;
use crate::models::DType;
use crate::types::TypedArray;
use crate::zarr::ArrayReader;

use async_trait::async_trait;
use bytes::Bytes;
use cached::stores::{DiskCache, DiskCacheBuilder};
use cached::IOCached;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// A cached coordinate axis
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CacheRecord {
    /// Key the record is stored under
    pub key: String,
    /// URL of the dataset the axis belongs to
    pub dataset_url: String,
    /// Name of the axis variable
    pub variable_name: String,
    /// Data type tag of the elements
    pub dtype: String,
    /// Number of elements
    pub length: usize,
    /// Shape of the axis array
    pub shape: Vec<usize>,
    /// Little-endian element bytes
    pub buffer: Bytes,
    /// Time the axis was fetched, in milliseconds since the Unix epoch
    pub fetched_at: u64,
}

/// Returns the cache key of an axis of a dataset.
pub fn cache_key(dataset_url: &str, axis_name: &str) -> String {
    format!("coord|{}|{}", dataset_url, axis_name)
}

/// Pack a typed array into a cache record.
///
/// # Arguments
///
/// * `key`: Key to store the record under
/// * `dataset_url`: URL of the dataset
/// * `variable_name`: Name of the axis variable
/// * `shape`: Shape of the axis array
/// * `data`: Axis values
pub fn pack_typed_array(
    key: &str,
    dataset_url: &str,
    variable_name: &str,
    shape: &[usize],
    data: &TypedArray,
) -> CacheRecord {
    let fetched_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default();
    CacheRecord {
        key: key.to_string(),
        dataset_url: dataset_url.to_string(),
        variable_name: variable_name.to_string(),
        dtype: data.dtype().to_string(),
        length: data.len(),
        shape: shape.to_vec(),
        buffer: data.to_bytes().into(),
        fetched_at,
    }
}

/// Unpack the typed array stored in a cache record.
///
/// Bytes beyond `length` elements are ignored.
pub fn unpack_typed_array(record: &CacheRecord) -> Result<TypedArray, AnalysisError> {
    let dtype = DType::from_tag(&record.dtype)?;
    let available = record.buffer.len() / dtype.size_of();
    if available < record.length {
        return Err(AnalysisError::CorruptCacheRecord {
            key: record.key.clone(),
            declared: record.length,
            available,
        });
    }
    TypedArray::from_bytes(dtype, &record.buffer, record.length)
}

/// Cache store trait.
///
/// Persists [CacheRecord]s by key.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the record stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, AnalysisError>;

    /// Store a record under its key, replacing any previous record.
    async fn put(&self, record: CacheRecord) -> Result<(), AnalysisError>;
}

/// In-memory cache store.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    records: RwLock<HashMap<String, CacheRecord>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, AnalysisError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, record: CacheRecord) -> Result<(), AnalysisError> {
        self.records.write().await.insert(record.key.clone(), record);
        Ok(())
    }
}

/// On-disk cache store, persisting records across restarts.
///
/// Disk I/O runs on the blocking thread pool.
pub struct DiskCacheStore {
    records: Arc<DiskCache<String, CacheRecord>>,
}

impl DiskCacheStore {
    /// Open or create a disk cache store.
    ///
    /// # Arguments
    ///
    /// * `path`: Directory to hold the cache
    pub fn new(path: &str) -> Result<Self, AnalysisError> {
        let records = DiskCacheBuilder::new("coord_cache")
            .set_disk_directory(path)
            .build()
            .map_err(|e| AnalysisError::CacheStorage {
                error: format!("{:?}", e),
            })?;
        Ok(Self {
            records: Arc::new(records),
        })
    }
}

fn storage_error<E: std::fmt::Debug>(e: E) -> AnalysisError {
    AnalysisError::CacheStorage {
        error: format!("{:?}", e),
    }
}

#[async_trait]
impl CacheStore for DiskCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheRecord>, AnalysisError> {
        let records = self.records.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || records.cache_get(&key))
            .await
            .map_err(storage_error)?
            .map_err(storage_error)
    }

    async fn put(&self, record: CacheRecord) -> Result<(), AnalysisError> {
        let records = self.records.clone();
        tokio::task::spawn_blocking(move || records.cache_set(record.key.clone(), record))
            .await
            .map_err(storage_error)?
            .map_err(storage_error)?;
        Ok(())
    }
}

/// A coordinate axis, from the cache or freshly fetched
#[derive(Clone, Debug, PartialEq)]
pub struct AxisData {
    /// Axis values in their source type
    pub data: TypedArray,
    /// Shape of the axis array
    pub shape: Vec<usize>,
    /// Whether the axis was served from the cache
    pub from_cache: bool,
}

/// Read-through cache of coordinate axes.
///
/// Concurrent misses for the same key may each fetch the axis; the last write wins and all
/// writes are equivalent.
pub struct CoordinateCache {
    store: Arc<dyn CacheStore>,
    reader: Arc<dyn ArrayReader>,
}

impl CoordinateCache {
    /// Returns a new CoordinateCache.
    ///
    /// # Arguments
    ///
    /// * `store`: Store holding cache records
    /// * `reader`: Reader used to fetch axes on a cache miss
    pub fn new(store: Arc<dyn CacheStore>, reader: Arc<dyn ArrayReader>) -> Self {
        Self { store, reader }
    }

    /// Returns a coordinate axis of a dataset, fetching and caching it on a miss.
    ///
    /// # Arguments
    ///
    /// * `dataset_url`: URL of the dataset
    /// * `axis_name`: Name of the axis variable
    #[tracing::instrument(level = "DEBUG", skip(self))]
    pub async fn get_or_fetch_axis(
        &self,
        dataset_url: &str,
        axis_name: &str,
    ) -> Result<AxisData, AnalysisError> {
        let key = cache_key(dataset_url, axis_name);
        if let Some(record) = self.store.get(&key).await? {
            let data = unpack_typed_array(&record)?;
            return Ok(AxisData {
                data,
                shape: record.shape,
                from_cache: true,
            });
        }
        COORD_CACHE_MISSES.inc();
        tracing::debug!(key = %key, "coordinate cache miss");
        let handle = self.reader.open_variable(dataset_url, axis_name).await?;
        let ranges = vec![AxisRange::All; handle.shape().len()];
        let data = self.reader.read_typed(&handle, &ranges).await?;
        let record = pack_typed_array(&key, dataset_url, axis_name, handle.shape(), &data);
        self.store.put(record).await?;
        Ok(AxisData {
            data,
            shape: handle.shape().to_vec(),
            from_cache: false,
        })
    }
}
