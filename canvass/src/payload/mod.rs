//! Payload data model: field-set documents and result collections.

pub mod fields;
pub mod result;

pub use fields::{FieldSet, FlagDef, WireType, CLEAR_BEFORE_WRITE};
pub use result::{ResultCollection, ResultPayload, SourceRef};
