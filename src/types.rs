pub mod byte_order;
pub mod element;
pub mod typed_array;

// Re-export types for convenience.
pub use crate::types::byte_order::ByteOrder;
pub use crate::types::element::Element;
pub use crate::types::typed_array::TypedArray;
