use serde::{Deserialize, Serialize};

#[cfg(target_endian = "big")]
pub const NATIVE_BYTE_ORDER: ByteOrder = ByteOrder::Big;

#[cfg(target_endian = "little")]
pub const NATIVE_BYTE_ORDER: ByteOrder = ByteOrder::Little;

#[cfg(target_endian = "big")]
pub const NON_NATIVE_BYTE_ORDER: ByteOrder = ByteOrder::Little;

#[cfg(target_endian = "little")]
pub const NON_NATIVE_BYTE_ORDER: ByteOrder = ByteOrder::Big;

/// Byte order / endianness.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Big Endian
    Big,
    /// Little Endian
    #[default]
    Little,
}

impl ByteOrder {
    /// Whether data in this byte order can be reinterpreted without swapping.
    pub fn is_native(self) -> bool {
        self == NATIVE_BYTE_ORDER
    }
}
