use crate::models::*;
use crate::resource_manager::ResourceManager;
use crate::zarr::ZarrArrayReader;

use object_store::memory::InMemory;
use serde_json::json;
use std::sync::Arc;
use zarrs::array::codec::{BytesToBytesCodecTraits, GzipCodec, ZstdCodec};
use zarrs::array::{Array, ArrayBuilder, DataType, ElementOwned, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs_object_store::AsyncObjectStore;

/// URL of the dataset served by [groundwater_reader].
pub(crate) const DATASET_URL: &str = "http://example.com/gw.zarr";

/// In-memory store holding a test dataset.
pub(crate) type TestStore = AsyncObjectStore<InMemory>;

/// Create an AnalysisRequest object with only required fields set.
pub(crate) fn get_test_request_data() -> AnalysisRequest {
    AnalysisRequest {
        selection: Selection::Aquifer(AquiferId::Number(42)),
        threshold: None,
        series: default_series(),
    }
}

/// Create an AnalysisRequest object with all fields set.
pub(crate) fn get_test_request_data_optional() -> AnalysisRequest {
    AnalysisRequest {
        selection: Selection::Aquifer(AquiferId::Text("great-artesian".to_string())),
        threshold: Some(0.5),
        series: vec![SeriesSpec {
            name: "GWS".to_string(),
            variable: "gws".to_string(),
            uncertainty: "gws_uncertainty".to_string(),
            color: "#ff0000".to_string(),
            band_color: "rgba(255,0,0,0.25)".to_string(),
        }],
    }
}

/// Write a row-major array into a store as a Zarr v3 array.
#[allow(clippy::too_many_arguments)]
async fn add_array<T: ElementOwned + Send + Sync>(
    store: &Arc<TestStore>,
    name: &str,
    shape: &[u64],
    chunk_shape: &[u64],
    data_type: DataType,
    fill_value: FillValue,
    values: &[T],
    codec: Option<Arc<dyn BytesToBytesCodecTraits>>,
) {
    let mut builder = ArrayBuilder::new(
        shape.to_vec(),
        data_type,
        chunk_shape.to_vec().try_into().unwrap(),
        fill_value,
    );
    if let Some(codec) = codec {
        builder.bytes_to_bytes_codecs(vec![codec]);
    }
    let array = builder.build(store.clone(), &format!("/{}", name)).unwrap();
    array.async_store_metadata().await.unwrap();
    let subset = ArraySubset::new_with_shape(shape.to_vec());
    array
        .async_store_array_subset_elements::<T>(&subset, values)
        .await
        .unwrap();
}

/// Remove one chunk of an array from a store.
pub(crate) async fn erase_chunk(store: &Arc<TestStore>, name: &str, chunk_indices: &[u64]) {
    let array = Array::async_open(store.clone(), &format!("/{}", name))
        .await
        .unwrap();
    array.async_erase_chunk(chunk_indices).await.unwrap();
}

/// Returns a store holding a small gridded groundwater dataset.
///
/// * `lat`: float64, 0.125 to 0.875 in steps of 0.25, two chunks with a partial edge chunk
/// * `lon`: float32, 10.125 to 10.875 in steps of 0.25
/// * `time`: int64 days 0, 31 and 59 after the time origin
/// * `lwe_thickness_anomaly`: `[time, lat, lon]` valued `100 * t + 4 * y + x`, zstd compressed,
///   with a NaN at `[0, 1, 1]`
/// * `uncertainty`: `[time, lat, lon]` valued `1 + t`, gzip compressed
/// * `sample_count`: uint64 counts
/// * `land_mask`: bool, which the reader cannot convert to numbers
pub(crate) async fn groundwater_store() -> Arc<TestStore> {
    let store = Arc::new(AsyncObjectStore::new(InMemory::new()));
    let lat = [0.125_f64, 0.375, 0.625, 0.875];
    let lon = [10.125_f32, 10.375, 10.625, 10.875];
    add_array(
        &store,
        "lat",
        &[4],
        &[3],
        DataType::Float64,
        FillValue::from(f64::NAN),
        &lat,
        None,
    )
    .await;
    add_array(
        &store,
        "lon",
        &[4],
        &[4],
        DataType::Float32,
        FillValue::from(f32::NAN),
        &lon,
        None,
    )
    .await;
    add_array(
        &store,
        "time",
        &[3],
        &[3],
        DataType::Int64,
        FillValue::from(0_i64),
        &[0_i64, 31, 59],
        None,
    )
    .await;
    add_array(
        &store,
        "sample_count",
        &[3],
        &[2],
        DataType::UInt64,
        FillValue::from(0_u64),
        &[1_u64, 2, 1 << 40],
        None,
    )
    .await;
    add_array(
        &store,
        "land_mask",
        &[2],
        &[2],
        DataType::Bool,
        FillValue::from(false),
        &[true, false],
        None,
    )
    .await;
    let mut anomaly = vec![];
    let mut uncertainty = vec![];
    for t in 0..3 {
        for y in 0..4 {
            for x in 0..4 {
                anomaly.push((100 * t + 4 * y + x) as f32);
                uncertainty.push((1 + t) as f32);
            }
        }
    }
    anomaly[5] = f32::NAN;
    add_array(
        &store,
        "lwe_thickness_anomaly",
        &[3, 4, 4],
        &[3, 2, 2],
        DataType::Float32,
        FillValue::from(f32::NAN),
        &anomaly,
        Some(Arc::new(ZstdCodec::new(3, false))),
    )
    .await;
    add_array(
        &store,
        "uncertainty",
        &[3, 4, 4],
        &[3, 4, 4],
        DataType::Float32,
        FillValue::from(f32::NAN),
        &uncertainty,
        Some(Arc::new(GzipCodec::new(5).unwrap())),
    )
    .await;
    store
}

/// Returns a reader serving [DATASET_URL] from `store`.
pub(crate) fn reader_for(store: Arc<TestStore>) -> ZarrArrayReader {
    ZarrArrayReader::new(Arc::new(ResourceManager::new(None, None)))
        .with_store(DATASET_URL, store)
}

/// Returns a reader serving the dataset of [groundwater_store] at [DATASET_URL].
pub(crate) async fn groundwater_reader() -> ZarrArrayReader {
    reader_for(groundwater_store().await)
}

/// A GeoJSON boundary collection with aquifer 42 covering the cells at `lat` indices 0 and 1 and
/// `lon` indices 0 and 1 of [groundwater_store].
pub(crate) fn boundaries_geojson() -> String {
    json!({
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"id": 42, "name": "Test Aquifer"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[10.0, 0.0], [10.5, 0.0], [10.5, 0.5], [10.0, 0.5], [10.0, 0.0]]]
                }
            },
            {
                "type": "Feature",
                "properties": {"id": "far-away"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[50.0, 50.0], [51.0, 50.0], [51.0, 51.0], [50.0, 51.0], [50.0, 50.0]]]
                }
            }
        ]
    })
    .to_string()
}
