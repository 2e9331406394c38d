//! Data types and associated functions and methods

use crate::error::AnalysisError;
use crate::grid::GridWindow;
use crate::session::CellValue;
use crate::traces::Trace;

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Element types of coordinate cache records
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DType {
    /// [f64]
    Float64,
    /// [f32]
    Float32,
    /// [i32]
    Int32,
    /// [u32]
    Uint32,
    /// [i16]
    Int16,
    /// [u16]
    Uint16,
    /// [i8]
    Int8,
    /// [u8]
    Uint8,
}

impl DType {
    /// Returns the size of the associated type in bytes.
    pub fn size_of(self) -> usize {
        match self {
            Self::Float64 => std::mem::size_of::<f64>(),
            Self::Float32 => std::mem::size_of::<f32>(),
            Self::Int32 => std::mem::size_of::<i32>(),
            Self::Uint32 => std::mem::size_of::<u32>(),
            Self::Int16 => std::mem::size_of::<i16>(),
            Self::Uint16 => std::mem::size_of::<u16>(),
            Self::Int8 => std::mem::size_of::<i8>(),
            Self::Uint8 => std::mem::size_of::<u8>(),
        }
    }

    /// Parse a data type tag, as written in cache records.
    pub fn from_tag(tag: &str) -> Result<Self, AnalysisError> {
        match tag {
            "float64" => Ok(Self::Float64),
            "float32" => Ok(Self::Float32),
            "int32" => Ok(Self::Int32),
            "uint32" => Ok(Self::Uint32),
            "int16" => Ok(Self::Int16),
            "uint16" => Ok(Self::Uint16),
            "int8" => Ok(Self::Int8),
            "uint8" => Ok(Self::Uint8),
            _ => Err(AnalysisError::UnsupportedType {
                type_name: tag.to_string(),
            }),
        }
    }
}

/// Identifier of an aquifer in the boundary collection
///
/// Boundary collections key features by either numeric or textual ids, so both are accepted.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AquiferId {
    /// Numeric id
    Number(u64),
    /// Textual id
    Text(String),
}

impl std::fmt::Display for AquiferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(id) => write!(f, "{}", id),
            Self::Text(id) => write!(f, "{}", id),
        }
    }
}

/// Region to analyse
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    /// User-drawn GeoJSON Polygon or MultiPolygon, in WGS84 lon/lat
    Polygon(geojson::Geometry),
    /// Aquifer looked up in the boundary collection
    Aquifer(AquiferId),
}

/// A pair of variables to aggregate and plot
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SeriesSpec {
    /// Display name of the series, also used as its legend group
    #[validate(length(min = 1, message = "series name must not be empty"))]
    pub name: String,
    /// Array variable holding the anomaly values
    #[validate(length(min = 1, message = "variable must not be empty"))]
    pub variable: String,
    /// Array variable holding the uncertainty half-width
    #[validate(length(min = 1, message = "uncertainty must not be empty"))]
    pub uncertainty: String,
    /// Line color
    #[serde(default = "default_color")]
    pub color: String,
    /// Fill color of the uncertainty band
    #[serde(default = "default_band_color")]
    pub band_color: String,
}

fn default_color() -> String {
    "#1c6eec".to_string()
}

fn default_band_color() -> String {
    "rgba(28,110,236,0.25)".to_string()
}

/// The series analysed when a request does not name any.
///
/// Groundwater (GWA), soil moisture (SMA) and total water storage (TWSA) anomalies. The dataset
/// only publishes the groundwater variables so far, so all three read them.
pub fn default_series() -> Vec<SeriesSpec> {
    let series = |name: &str, color: &str, band_color: &str| SeriesSpec {
        name: name.to_string(),
        variable: "lwe_thickness_anomaly".to_string(),
        uncertainty: "uncertainty".to_string(),
        color: color.to_string(),
        band_color: band_color.to_string(),
    };
    vec![
        series("GWA", &default_color(), &default_band_color()),
        series("SMA", "#d73027", "rgba(215,48,39,0.25)"),
        series("TWSA", "#8c510a", "rgba(140,81,10,0.25)"),
    ]
}

/// Request data for analyses
#[derive(Debug, Deserialize, PartialEq, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_request_data"))]
pub struct AnalysisRequest {
    /// Region to analyse
    pub selection: Selection,
    /// Minimum area fraction for a cell to be included. Defaults to the server's threshold.
    #[validate(range(min = 0.0, max = 1.0, message = "threshold must be between 0 and 1"))]
    pub threshold: Option<f64>,
    /// Series to aggregate
    #[validate]
    #[validate(length(min = 1, message = "series length must be greater than 0"))]
    #[serde(default = "default_series")]
    pub series: Vec<SeriesSpec>,
}

/// Validate that series names are unique
fn validate_series_names(series: &[SeriesSpec]) -> Result<(), ValidationError> {
    for (index, spec) in series.iter().enumerate() {
        if series[..index].iter().any(|other| other.name == spec.name) {
            let mut error = ValidationError::new("series names must be unique");
            error.add_param("name".into(), &spec.name);
            return Err(error);
        }
    }
    Ok(())
}

/// Validate request data
fn validate_request_data(request_data: &AnalysisRequest) -> Result<(), ValidationError> {
    validate_series_names(&request_data.series)?;
    if let Some(threshold) = request_data.threshold {
        if threshold.is_nan() {
            return Err(ValidationError::new("threshold must be a number"));
        }
    }
    Ok(())
}

/// A selected grid cell in an analysis response
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CellFeature {
    /// Row-major index of the cell within the analysis window
    pub idx: usize,
    /// Cell center longitude
    pub lon: f64,
    /// Cell center latitude
    pub lat: f64,
    /// Fraction of the cell's area covered by the region
    pub frac: f64,
    /// Closed exterior ring of the cell as [lon, lat] pairs
    pub ring: Vec<[f64; 2]>,
}

/// Response body of a completed analysis
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    /// Session id for subsequent frame requests
    pub session: Uuid,
    /// Calendar dates of the time axis, formatted YYYY-MM-DD
    pub dates: Vec<String>,
    /// Index window of the grid read for the analysis
    pub window: GridWindow,
    /// Number of candidate cells examined
    pub candidates: usize,
    /// Inclusion threshold applied
    pub threshold: f64,
    /// Included cells
    pub cells: Vec<CellFeature>,
    /// Uncertainty band and mean line traces, two per series
    pub traces: Vec<Trace<String>>,
}

/// Response body of a per-time-step frame
#[derive(Debug, Serialize)]
pub struct FrameResponse {
    /// Time step index
    pub step: usize,
    /// Calendar date of the time step
    pub date: String,
    /// Whether this frame became the session's current frame
    pub applied: bool,
    /// Values of the included cells at this time step
    pub cells: Vec<CellValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use serde_test::{assert_de_tokens, assert_de_tokens_error, Token};

    // The following tests use serde_test to validate the correct function of the deserialiser.
    // The validations are also tested.

    #[test]
    fn test_required_fields() {
        let request_data = test_utils::get_test_request_data();
        assert_de_tokens(
            &request_data,
            &[
                Token::Struct {
                    name: "AnalysisRequest",
                    len: 1,
                },
                Token::Str("selection"),
                Token::Enum { name: "Selection" },
                Token::Str("aquifer"),
                Token::U64(42),
                Token::StructEnd,
            ],
        );
        request_data.validate().unwrap()
    }

    #[test]
    fn test_optional_fields() {
        let request_data = test_utils::get_test_request_data_optional();
        assert_de_tokens(
            &request_data,
            &[
                Token::Struct {
                    name: "AnalysisRequest",
                    len: 3,
                },
                Token::Str("selection"),
                Token::Enum { name: "Selection" },
                Token::Str("aquifer"),
                Token::Str("great-artesian"),
                Token::Str("threshold"),
                Token::Some,
                Token::F64(0.5),
                Token::Str("series"),
                Token::Seq { len: Some(1) },
                Token::Struct {
                    name: "SeriesSpec",
                    len: 5,
                },
                Token::Str("name"),
                Token::Str("GWS"),
                Token::Str("variable"),
                Token::Str("gws"),
                Token::Str("uncertainty"),
                Token::Str("gws_uncertainty"),
                Token::Str("color"),
                Token::Str("#ff0000"),
                Token::Str("band_color"),
                Token::Str("rgba(255,0,0,0.25)"),
                Token::StructEnd,
                Token::SeqEnd,
                Token::StructEnd,
            ],
        );
        request_data.validate().unwrap()
    }

    #[test]
    fn test_default_series() {
        let request_data = test_utils::get_test_request_data();
        let expected = [
            ("GWA", "#1c6eec", "rgba(28,110,236,0.25)"),
            ("SMA", "#d73027", "rgba(215,48,39,0.25)"),
            ("TWSA", "#8c510a", "rgba(140,81,10,0.25)"),
        ];
        assert_eq!(expected.len(), request_data.series.len());
        for (series, (name, color, band_color)) in std::iter::zip(&request_data.series, expected) {
            assert_eq!(name, series.name);
            assert_eq!("lwe_thickness_anomaly", series.variable);
            assert_eq!("uncertainty", series.uncertainty);
            assert_eq!(color, series.color);
            assert_eq!(band_color, series.band_color);
            series.validate().unwrap();
        }
    }

    #[test]
    fn test_missing_selection() {
        assert_de_tokens_error::<AnalysisRequest>(
            &[
                Token::Struct {
                    name: "AnalysisRequest",
                    len: 1,
                },
                Token::StructEnd,
            ],
            "missing field `selection`",
        )
    }

    #[test]
    fn test_invalid_selection() {
        assert_de_tokens_error::<AnalysisRequest>(
            &[
                Token::Struct {
                    name: "AnalysisRequest",
                    len: 1,
                },
                Token::Str("selection"),
                Token::Enum { name: "Selection" },
                Token::Str("basin"),
                Token::StructEnd,
            ],
            "unknown variant `basin`, expected `polygon` or `aquifer`",
        )
    }

    #[test]
    fn test_unknown_field() {
        assert_de_tokens_error::<AnalysisRequest>(
            &[
                Token::Struct {
                    name: "AnalysisRequest",
                    len: 1,
                },
                Token::Str("foo"),
                Token::StructEnd,
            ],
            "unknown field `foo`, expected one of `selection`, `threshold`, `series`",
        )
    }

    #[test]
    fn test_missing_series_variable() {
        assert_de_tokens_error::<SeriesSpec>(
            &[
                Token::Struct {
                    name: "SeriesSpec",
                    len: 1,
                },
                Token::Str("name"),
                Token::Str("GWA"),
                Token::StructEnd,
            ],
            "missing field `variable`",
        )
    }

    #[test]
    fn test_polygon_selection() {
        let json = r#"{
            "selection": {
                "polygon": {
                    "type": "Polygon",
                    "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
                }
            }
        }"#;
        let request_data: AnalysisRequest = serde_json::from_str(json).unwrap();
        match request_data.selection {
            Selection::Polygon(geometry) => {
                assert!(matches!(geometry.value, geojson::Value::Polygon(_)))
            }
            selection => panic!("unexpected selection {:?}", selection),
        }
    }

    #[test]
    #[should_panic(expected = "threshold must be between 0 and 1")]
    fn test_invalid_threshold() {
        let mut request_data = test_utils::get_test_request_data();
        request_data.threshold = Some(1.5);
        request_data.validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "threshold must be between 0 and 1")]
    fn test_negative_threshold() {
        let mut request_data = test_utils::get_test_request_data();
        request_data.threshold = Some(-0.1);
        request_data.validate().unwrap()
    }

    #[test]
    fn test_threshold_bounds() {
        let mut request_data = test_utils::get_test_request_data();
        request_data.threshold = Some(0.0);
        request_data.validate().unwrap();
        request_data.threshold = Some(1.0);
        request_data.validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "series length must be greater than 0")]
    fn test_empty_series() {
        let mut request_data = test_utils::get_test_request_data();
        request_data.series = vec![];
        request_data.validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "series name must not be empty")]
    fn test_invalid_series_name() {
        let mut request_data = test_utils::get_test_request_data();
        request_data.series[0].name = "".to_string();
        request_data.validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "variable must not be empty")]
    fn test_invalid_series_variable() {
        let mut request_data = test_utils::get_test_request_data();
        request_data.series[0].variable = "".to_string();
        request_data.validate().unwrap()
    }

    #[test]
    #[should_panic(expected = "series names must be unique")]
    fn test_duplicate_series_names() {
        let mut request_data = test_utils::get_test_request_data();
        request_data.series.push(request_data.series[0].clone());
        request_data.validate().unwrap()
    }

    #[test]
    fn test_aquifer_id_display() {
        assert_eq!("42", AquiferId::Number(42).to_string());
        assert_eq!("foo", AquiferId::Text("foo".to_string()).to_string());
    }

    #[test]
    fn test_dtype_tags() {
        for dtype in [
            DType::Float64,
            DType::Float32,
            DType::Int32,
            DType::Uint32,
            DType::Int16,
            DType::Uint16,
            DType::Int8,
            DType::Uint8,
        ] {
            assert_eq!(dtype, DType::from_tag(&dtype.to_string()).unwrap());
        }
    }

    #[test]
    fn test_dtype_unknown_tag() {
        match DType::from_tag("complex128").unwrap_err() {
            AnalysisError::UnsupportedType { type_name } => assert_eq!("complex128", type_name),
            err => panic!("unexpected error {}", err),
        }
    }

    #[test]
    fn test_dtype_size_of() {
        assert_eq!(8, DType::Float64.size_of());
        assert_eq!(2, DType::Int16.size_of());
        assert_eq!(1, DType::Uint8.size_of());
    }
}
