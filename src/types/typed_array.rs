use crate::error::AnalysisError;
use crate::models::DType;
use crate::types::ByteOrder;
use crate::types::element::{decode_elements, encode_elements, to_f64};

/// Byte order of [TypedArray::to_bytes], fixed so cache files move between hosts.
pub const CACHE_BYTE_ORDER: ByteOrder = ByteOrder::Little;

/// A flat array of elements in their source data type.
#[derive(Clone, Debug, PartialEq)]
pub enum TypedArray {
    Float64(Vec<f64>),
    Float32(Vec<f32>),
    Int32(Vec<i32>),
    Uint32(Vec<u32>),
    Int16(Vec<i16>),
    Uint16(Vec<u16>),
    Int8(Vec<i8>),
    Uint8(Vec<u8>),
}

impl TypedArray {
    /// Data type of the elements.
    pub fn dtype(&self) -> DType {
        match self {
            Self::Float64(_) => DType::Float64,
            Self::Float32(_) => DType::Float32,
            Self::Int32(_) => DType::Int32,
            Self::Uint32(_) => DType::Uint32,
            Self::Int16(_) => DType::Int16,
            Self::Uint16(_) => DType::Uint16,
            Self::Int8(_) => DType::Int8,
            Self::Uint8(_) => DType::Uint8,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Float64(values) => values.len(),
            Self::Float32(values) => values.len(),
            Self::Int32(values) => values.len(),
            Self::Uint32(values) => values.len(),
            Self::Int16(values) => values.len(),
            Self::Uint16(values) => values.len(),
            Self::Int8(values) => values.len(),
            Self::Uint8(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Little-endian bytes of the elements.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Float64(values) => encode_elements(values, CACHE_BYTE_ORDER),
            Self::Float32(values) => encode_elements(values, CACHE_BYTE_ORDER),
            Self::Int32(values) => encode_elements(values, CACHE_BYTE_ORDER),
            Self::Uint32(values) => encode_elements(values, CACHE_BYTE_ORDER),
            Self::Int16(values) => encode_elements(values, CACHE_BYTE_ORDER),
            Self::Uint16(values) => encode_elements(values, CACHE_BYTE_ORDER),
            Self::Int8(values) => encode_elements(values, CACHE_BYTE_ORDER),
            Self::Uint8(values) => encode_elements(values, CACHE_BYTE_ORDER),
        }
    }

    /// Decode `length` little-endian elements of type `dtype` from `data`.
    ///
    /// Trailing bytes are ignored.
    pub fn from_bytes(dtype: DType, data: &[u8], length: usize) -> Result<Self, AnalysisError> {
        let array = match dtype {
            DType::Float64 => Self::Float64(decode_elements(data, length, CACHE_BYTE_ORDER)?),
            DType::Float32 => Self::Float32(decode_elements(data, length, CACHE_BYTE_ORDER)?),
            DType::Int32 => Self::Int32(decode_elements(data, length, CACHE_BYTE_ORDER)?),
            DType::Uint32 => Self::Uint32(decode_elements(data, length, CACHE_BYTE_ORDER)?),
            DType::Int16 => Self::Int16(decode_elements(data, length, CACHE_BYTE_ORDER)?),
            DType::Uint16 => Self::Uint16(decode_elements(data, length, CACHE_BYTE_ORDER)?),
            DType::Int8 => Self::Int8(decode_elements(data, length, CACHE_BYTE_ORDER)?),
            DType::Uint8 => Self::Uint8(decode_elements(data, length, CACHE_BYTE_ORDER)?),
        };
        Ok(array)
    }

    /// Convert the elements to f64.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            Self::Float64(values) => values.clone(),
            Self::Float32(values) => to_f64(values),
            Self::Int32(values) => to_f64(values),
            Self::Uint32(values) => to_f64(values),
            Self::Int16(values) => to_f64(values),
            Self::Uint16(values) => to_f64(values),
            Self::Int8(values) => to_f64(values),
            Self::Uint8(values) => to_f64(values),
        }
    }
}
