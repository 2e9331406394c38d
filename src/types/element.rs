//! Numeric element encoding used by the coordinate cache codec.

use crate::error::AnalysisError;
use crate::types::ByteOrder;

use num_traits::AsPrimitive;
use zerocopy::AsBytes;

/// Trait for array elements.
pub trait Element:
    'static
    + Clone
    + Copy
    + PartialEq
    + Send
    + Sync
    + num_traits::Zero
    + std::fmt::Debug
    + AsPrimitive<f64>
    + zerocopy::AsBytes
    + zerocopy::FromBytes
{
}

/// Blanket implementation of Element.
impl<T> Element for T
where
    T: 'static
        + Clone
        + Copy
        + PartialEq
        + Send
        + Sync
        + num_traits::Zero
        + std::fmt::Debug
        + AsPrimitive<f64>
        + zerocopy::AsBytes
        + zerocopy::FromBytes
{
}

/// Decode the first `length` elements of `data`.
///
/// Any trailing bytes beyond `length` elements are ignored. Fails if `data` holds fewer than
/// `length` whole elements.
///
/// # Arguments
///
/// * `data`: Raw bytes, with no alignment requirement
/// * `length`: Number of elements to decode
/// * `byte_order`: Byte order of the encoded elements
pub fn decode_elements<T: Element>(
    data: &[u8],
    length: usize,
    byte_order: ByteOrder,
) -> Result<Vec<T>, AnalysisError> {
    let size = std::mem::size_of::<T>();
    if data.len() / size < length {
        return Err(AnalysisError::FromBytes {
            type_name: std::any::type_name::<T>(),
        });
    }
    let mut values = vec![T::zero(); length];
    // Copying into a Vec<T> gives correct alignment regardless of the source buffer.
    values
        .as_mut_slice()
        .as_bytes_mut()
        .copy_from_slice(&data[..length * size]);
    if !byte_order.is_native() {
        swap_bytes(values.as_mut_slice().as_bytes_mut(), size);
    }
    Ok(values)
}

/// Encode elements as bytes in the given byte order.
pub fn encode_elements<T: Element>(values: &[T], byte_order: ByteOrder) -> Vec<u8> {
    let mut data = values.as_bytes().to_vec();
    if !byte_order.is_native() {
        swap_bytes(&mut data, std::mem::size_of::<T>());
    }
    data
}

/// Reverse each `size`-byte element in place.
fn swap_bytes(data: &mut [u8], size: usize) {
    if size > 1 {
        for element in data.chunks_exact_mut(size) {
            element.reverse();
        }
    }
}

/// Convert elements to f64.
pub fn to_f64<T: Element>(values: &[T]) -> Vec<f64> {
    values.iter().map(|value| value.as_()).collect()
}
