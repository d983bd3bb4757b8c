//! Data model shared by every stage of a reconciliation pass.
//!
//! - [`Value`]: canonical, ordered field values
//! - [`ResourceSpec`] / [`ObservedState`]: desired and observed documents
//! - [`ApiVersion`]: backend version used for version-gated fields

mod document;
mod value;
mod version;

pub use document::{ObservedState, RawSpec, ResourceId, ResourceKind, ResourceSpec};
pub use value::Value;
pub use version::ApiVersion;
