//! Turns an IR module into a typelib image: field layout first, then the
//! two-phase binary build.

mod build;
mod canon;
mod error;
mod offsets;
mod pools;

pub use build::build_typelib;
pub use canon::canonical_type;
pub use error::{BuildError, LayoutError};
pub use offsets::{compute_offsets, enum_storage_tag, AggregateLayout, LayoutEngine};
