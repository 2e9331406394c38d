//! Zarr array reader.
//!
//! Opens array variables of a Zarr dataset and reads rectangular ranges of them. Metadata, codecs
//! and chunk layout are handled by [zarrs]. Datasets are fetched over HTTP through an
//! [object_store] HTTP store, one per dataset URL.

use crate::array::{self, AxisRange, SlicedArray};
use crate::error::AnalysisError;
use crate::metrics::ARRAY_READS;
use crate::resource_manager::ResourceManager;
use crate::types::element::to_f64;
use crate::types::{Element, TypedArray};

use async_trait::async_trait;
use hashbrown::HashMap;
use object_store::http::HttpBuilder;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::Instrument;
use zarrs::array::{Array, ArrayCreateError, DataType, ElementOwned};
use zarrs::array_subset::ArraySubset;
use zarrs::storage::{AsyncReadableStorage, AsyncReadableStorageTraits};
use zarrs_object_store::AsyncObjectStore;

/// An opened array variable
#[derive(Clone)]
pub struct ArrayHandle {
    /// URL of the array node
    pub url: String,
    shape: Vec<usize>,
    array: Arc<Array<dyn AsyncReadableStorageTraits>>,
}

impl ArrayHandle {
    /// Shape of the array.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Name of the element type, as written in the array metadata.
    pub fn data_type(&self) -> String {
        self.array.data_type().name()
    }
}

impl std::fmt::Debug for ArrayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayHandle")
            .field("url", &self.url)
            .field("shape", &self.shape)
            .field("data_type", &self.data_type())
            .finish()
    }
}

/// Array reader trait.
///
/// Opens variables of a dataset and reads rectangular ranges of them.
#[async_trait]
pub trait ArrayReader: Send + Sync {
    /// Open a variable of a dataset.
    ///
    /// Fails with [AnalysisError::NotFound] if the variable does not exist.
    ///
    /// # Arguments
    ///
    /// * `dataset_url`: URL of the dataset group
    /// * `variable`: Name of the variable within the group
    async fn open_variable(
        &self,
        dataset_url: &str,
        variable: &str,
    ) -> Result<ArrayHandle, AnalysisError>;

    /// Read a range of an array, converted to f64 and laid out in row-major order.
    ///
    /// # Arguments
    ///
    /// * `handle`: Opened array
    /// * `ranges`: One range per dimension
    async fn read(
        &self,
        handle: &ArrayHandle,
        ranges: &[AxisRange],
    ) -> Result<SlicedArray, AnalysisError>;

    /// Read a range of an array in its own element type, in row-major order.
    ///
    /// 64-bit integer arrays are widened to [TypedArray::Float64].
    ///
    /// # Arguments
    ///
    /// * `handle`: Opened array
    /// * `ranges`: One range per dimension
    async fn read_typed(
        &self,
        handle: &ArrayHandle,
        ranges: &[AxisRange],
    ) -> Result<TypedArray, AnalysisError>;
}

/// Zarr array reader.
///
/// Implements [ArrayReader] with [zarrs]. Each dataset URL gets an HTTP store on first use.
/// Stores for other backends may be registered up front with [ZarrArrayReader::with_store].
pub struct ZarrArrayReader {
    stores: RwLock<HashMap<String, AsyncReadableStorage>>,
    resource_manager: Arc<ResourceManager>,
}

impl ZarrArrayReader {
    /// Create a new Zarr array reader.
    ///
    /// # Arguments
    ///
    /// * `resource_manager`: Bounds the number of concurrent store requests
    pub fn new(resource_manager: Arc<ResourceManager>) -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            resource_manager,
        }
    }

    /// Serve `dataset_url` from `store` instead of over HTTP.
    pub fn with_store(mut self, dataset_url: &str, store: AsyncReadableStorage) -> Self {
        self.stores
            .get_mut()
            .insert(dataset_url.trim_end_matches('/').to_string(), store);
        self
    }

    /// Returns the store of a dataset, creating an HTTP store if none exists yet.
    async fn store(&self, dataset_url: &str) -> Result<AsyncReadableStorage, AnalysisError> {
        if let Some(store) = self.stores.read().await.get(dataset_url) {
            return Ok(store.clone());
        }
        let mut stores = self.stores.write().await;
        if let Some(store) = stores.get(dataset_url) {
            return Ok(store.clone());
        }
        let http = HttpBuilder::new()
            .with_url(dataset_url)
            .build()
            .map_err(|source| AnalysisError::StoreOpen {
                url: dataset_url.to_string(),
                source,
            })?;
        tracing::debug!(url = dataset_url, "created HTTP store");
        let store: AsyncReadableStorage = Arc::new(AsyncObjectStore::new(http));
        stores.insert(dataset_url.to_string(), store.clone());
        Ok(store)
    }

    /// Read a range of an array in element type `T`.
    ///
    /// Returns the elements in row-major order and the shape of the range. Chunks absent from
    /// the store read as the fill value.
    async fn read_elements<T: ElementOwned + Send + Sync>(
        &self,
        handle: &ArrayHandle,
        ranges: &[AxisRange],
    ) -> Result<(Vec<T>, Vec<usize>), AnalysisError> {
        let ranges = array::resolve_ranges(ranges, handle.shape())?;
        let shape: Vec<usize> = ranges.iter().map(|range| range.len()).collect();
        if shape.iter().product::<usize>() == 0 {
            return Ok((vec![], shape));
        }
        let subset = ArraySubset::new_with_ranges(&to_u64_ranges(&ranges)?);

        let _conn_permits = self.resource_manager.connection().await?;
        let values = handle
            .array
            .async_retrieve_array_subset_elements::<T>(&subset)
            .instrument(tracing::debug_span!("read_array", url = %handle.url))
            .await
            .map_err(|source| {
                ARRAY_READS.with_label_values(&["error"]).inc();
                AnalysisError::ArrayRead {
                    url: handle.url.clone(),
                    source,
                }
            })?;
        ARRAY_READS.with_label_values(&["success"]).inc();
        Ok((values, shape))
    }

    async fn read_f64<T: ElementOwned + Element>(
        &self,
        handle: &ArrayHandle,
        ranges: &[AxisRange],
    ) -> Result<SlicedArray, AnalysisError> {
        let (values, shape) = self.read_elements::<T>(handle, ranges).await?;
        Ok(SlicedArray::from_row_major(to_f64(&values), shape))
    }
}

fn to_u64_ranges(ranges: &[Range<usize>]) -> Result<Vec<Range<u64>>, AnalysisError> {
    ranges
        .iter()
        .map(|range| Ok(u64::try_from(range.start)?..u64::try_from(range.end)?))
        .collect()
}

fn unsupported(handle: &ArrayHandle) -> AnalysisError {
    AnalysisError::UnsupportedArrayType {
        url: handle.url.clone(),
        data_type: handle.data_type(),
    }
}

#[async_trait]
impl ArrayReader for ZarrArrayReader {
    async fn open_variable(
        &self,
        dataset_url: &str,
        variable: &str,
    ) -> Result<ArrayHandle, AnalysisError> {
        let dataset_url = dataset_url.trim_end_matches('/');
        let url = format!("{}/{}", dataset_url, variable);
        let store = self.store(dataset_url).await?;
        let _conn_permits = self.resource_manager.connection().await?;
        let array = Array::async_open(store, &format!("/{}", variable))
            .instrument(tracing::debug_span!("open_variable", variable))
            .await
            .map_err(|source| match source {
                ArrayCreateError::MissingMetadata => AnalysisError::NotFound { url: url.clone() },
                source => AnalysisError::ArrayOpen {
                    url: url.clone(),
                    source,
                },
            })?;
        let shape = array
            .shape()
            .iter()
            .map(|length| usize::try_from(*length))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ArrayHandle {
            url,
            shape,
            array: Arc::new(array),
        })
    }

    async fn read(
        &self,
        handle: &ArrayHandle,
        ranges: &[AxisRange],
    ) -> Result<SlicedArray, AnalysisError> {
        match handle.array.data_type() {
            DataType::Float64 => self.read_f64::<f64>(handle, ranges).await,
            DataType::Float32 => self.read_f64::<f32>(handle, ranges).await,
            DataType::Int64 => self.read_f64::<i64>(handle, ranges).await,
            DataType::UInt64 => self.read_f64::<u64>(handle, ranges).await,
            DataType::Int32 => self.read_f64::<i32>(handle, ranges).await,
            DataType::UInt32 => self.read_f64::<u32>(handle, ranges).await,
            DataType::Int16 => self.read_f64::<i16>(handle, ranges).await,
            DataType::UInt16 => self.read_f64::<u16>(handle, ranges).await,
            DataType::Int8 => self.read_f64::<i8>(handle, ranges).await,
            DataType::UInt8 => self.read_f64::<u8>(handle, ranges).await,
            _ => Err(unsupported(handle)),
        }
    }

    async fn read_typed(
        &self,
        handle: &ArrayHandle,
        ranges: &[AxisRange],
    ) -> Result<TypedArray, AnalysisError> {
        let array = match handle.array.data_type() {
            DataType::Float64 => TypedArray::Float64(self.read_elements(handle, ranges).await?.0),
            DataType::Float32 => TypedArray::Float32(self.read_elements(handle, ranges).await?.0),
            DataType::Int32 => TypedArray::Int32(self.read_elements(handle, ranges).await?.0),
            DataType::UInt32 => TypedArray::Uint32(self.read_elements(handle, ranges).await?.0),
            DataType::Int16 => TypedArray::Int16(self.read_elements(handle, ranges).await?.0),
            DataType::UInt16 => TypedArray::Uint16(self.read_elements(handle, ranges).await?.0),
            DataType::Int8 => TypedArray::Int8(self.read_elements(handle, ranges).await?.0),
            DataType::UInt8 => TypedArray::Uint8(self.read_elements(handle, ranges).await?.0),
            // Exact for magnitudes up to 2^53, which covers day offsets and counts.
            DataType::Int64 => {
                TypedArray::Float64(to_f64(&self.read_elements::<i64>(handle, ranges).await?.0))
            }
            DataType::UInt64 => {
                TypedArray::Float64(to_f64(&self.read_elements::<u64>(handle, ranges).await?.0))
            }
            _ => return Err(unsupported(handle)),
        };
        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{self, DATASET_URL};

    fn anomaly(t: usize, y: usize, x: usize) -> f64 {
        (100 * t + 4 * y + x) as f64
    }

    #[tokio::test]
    async fn open_variable_not_found() {
        let reader = test_utils::groundwater_reader().await;
        match reader.open_variable(DATASET_URL, "foo").await.unwrap_err() {
            AnalysisError::NotFound { url } => assert_eq!("http://example.com/gw.zarr/foo", url),
            err => panic!("unexpected error {}", err),
        }
    }

    #[tokio::test]
    async fn open_variable_trailing_slash() {
        let reader = test_utils::groundwater_reader().await;
        let url = format!("{}/", DATASET_URL);
        let handle = reader.open_variable(&url, "lat").await.unwrap();
        assert_eq!("http://example.com/gw.zarr/lat", handle.url);
        assert_eq!(&[4], handle.shape());
        assert_eq!("float64", handle.data_type());
    }

    #[tokio::test]
    async fn open_variable_invalid_store_url() {
        let reader = ZarrArrayReader::new(Arc::new(ResourceManager::new(None, None)));
        match reader.open_variable("not a url", "lat").await.unwrap_err() {
            AnalysisError::StoreOpen { url, .. } => assert_eq!("not a url", url),
            err => panic!("unexpected error {}", err),
        }
    }

    #[tokio::test]
    async fn read_1d_padded_edge_chunk() {
        let reader = test_utils::groundwater_reader().await;
        let handle = reader.open_variable(DATASET_URL, "lat").await.unwrap();
        let array = reader.read(&handle, &[AxisRange::All]).await.unwrap();
        assert_eq!(vec![0.125, 0.375, 0.625, 0.875], array.data);
        assert_eq!(vec![4], array.shape);
        assert_eq!(vec![1], array.stride);
    }

    #[tokio::test]
    async fn read_3d_across_chunks() {
        let reader = test_utils::groundwater_reader().await;
        let handle = reader
            .open_variable(DATASET_URL, "lwe_thickness_anomaly")
            .await
            .unwrap();
        let ranges = [AxisRange::All, AxisRange::from(1..3), AxisRange::from(1..4)];
        let array = reader.read(&handle, &ranges).await.unwrap();
        assert_eq!(vec![3, 2, 3], array.shape);
        assert_eq!(vec![6, 3, 1], array.stride);
        for t in 0..3 {
            for y in 0..2 {
                for x in 0..3 {
                    let value = array.value_at(&[t, y, x]).unwrap();
                    if (t, y + 1, x + 1) == (0, 1, 1) {
                        assert!(value.is_nan());
                    } else {
                        assert_eq!(anomaly(t, y + 1, x + 1), value);
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn read_missing_chunk_is_fill_value() {
        let store = test_utils::groundwater_store().await;
        test_utils::erase_chunk(&store, "lwe_thickness_anomaly", &[0, 1, 1]).await;
        let reader = test_utils::reader_for(store);
        let handle = reader
            .open_variable(DATASET_URL, "lwe_thickness_anomaly")
            .await
            .unwrap();
        let ranges = [AxisRange::from(2..3), AxisRange::All, AxisRange::All];
        let array = reader.read(&handle, &ranges).await.unwrap();
        assert_eq!(vec![1, 4, 4], array.shape);
        assert_eq!(Some(anomaly(2, 1, 1)), array.value_at(&[0, 1, 1]));
        assert!(array.value_at(&[0, 2, 2]).unwrap().is_nan());
        assert!(array.value_at(&[0, 3, 3]).unwrap().is_nan());
        assert_eq!(Some(anomaly(2, 3, 0)), array.value_at(&[0, 3, 0]));
    }

    #[tokio::test]
    async fn read_empty_range() {
        let reader = test_utils::groundwater_reader().await;
        let handle = reader
            .open_variable(DATASET_URL, "lwe_thickness_anomaly")
            .await
            .unwrap();
        let ranges = [AxisRange::All, AxisRange::from(2..2), AxisRange::from(0..0)];
        let array = reader.read(&handle, &ranges).await.unwrap();
        assert_eq!(vec![3, 0, 0], array.shape);
        assert!(array.data.is_empty());
    }

    #[tokio::test]
    async fn read_out_of_bounds() {
        let reader = test_utils::groundwater_reader().await;
        let handle = reader.open_variable(DATASET_URL, "lon").await.unwrap();
        let err = reader
            .read(&handle, &[AxisRange::from(2..5)])
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::RangeError { .. }));
    }

    #[tokio::test]
    async fn read_rank_mismatch() {
        let reader = test_utils::groundwater_reader().await;
        let handle = reader.open_variable(DATASET_URL, "lon").await.unwrap();
        let err = reader
            .read(&handle, &[AxisRange::All, AxisRange::All])
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::RangeRank { .. }));
    }

    #[tokio::test]
    async fn read_int64_time_axis() {
        let reader = test_utils::groundwater_reader().await;
        let handle = reader.open_variable(DATASET_URL, "time").await.unwrap();
        assert_eq!("int64", handle.data_type());
        let array = reader.read(&handle, &[AxisRange::from(1..3)]).await.unwrap();
        assert_eq!(vec![31.0, 59.0], array.data);
        assert_eq!(vec![2], array.shape);
    }

    #[tokio::test]
    async fn read_uint64() {
        let reader = test_utils::groundwater_reader().await;
        let handle = reader
            .open_variable(DATASET_URL, "sample_count")
            .await
            .unwrap();
        let array = reader.read(&handle, &[AxisRange::All]).await.unwrap();
        assert_eq!(vec![1.0, 2.0, (1_u64 << 40) as f64], array.data);
    }

    #[tokio::test]
    async fn read_typed_keeps_element_type() {
        let reader = test_utils::groundwater_reader().await;
        let handle = reader.open_variable(DATASET_URL, "lon").await.unwrap();
        let array = reader.read_typed(&handle, &[AxisRange::All]).await.unwrap();
        assert_eq!(
            TypedArray::Float32(vec![10.125, 10.375, 10.625, 10.875]),
            array
        );
    }

    #[tokio::test]
    async fn read_typed_widens_int64() {
        let reader = test_utils::groundwater_reader().await;
        let handle = reader.open_variable(DATASET_URL, "time").await.unwrap();
        let array = reader.read_typed(&handle, &[AxisRange::All]).await.unwrap();
        assert_eq!(TypedArray::Float64(vec![0.0, 31.0, 59.0]), array);
    }

    #[tokio::test]
    async fn read_unsupported_type() {
        let reader = test_utils::groundwater_reader().await;
        let handle = reader.open_variable(DATASET_URL, "land_mask").await.unwrap();
        match reader.read(&handle, &[AxisRange::All]).await.unwrap_err() {
            AnalysisError::UnsupportedArrayType { url, data_type } => {
                assert_eq!("http://example.com/gw.zarr/land_mask", url);
                assert_eq!("bool", data_type);
            }
            err => panic!("unexpected error {}", err),
        }
        assert!(matches!(
            reader.read_typed(&handle, &[AxisRange::All]).await.unwrap_err(),
            AnalysisError::UnsupportedArrayType { .. }
        ));
    }

    #[tokio::test]
    async fn read_with_connection_limit() {
        let store = test_utils::groundwater_store().await;
        let reader = ZarrArrayReader::new(Arc::new(ResourceManager::new(Some(1), None)))
            .with_store(DATASET_URL, store);
        let handle = reader
            .open_variable(DATASET_URL, "uncertainty")
            .await
            .unwrap();
        let first_range = [AxisRange::from(0..1), AxisRange::All, AxisRange::All];
        let second_range = [AxisRange::from(2..3), AxisRange::All, AxisRange::All];
        let (first, second) = tokio::join!(
            reader.read(&handle, &first_range),
            reader.read(&handle, &second_range),
        );
        assert_eq!(vec![1.0; 16], first.unwrap().data);
        assert_eq!(vec![3.0; 16], second.unwrap().data);
    }
}
