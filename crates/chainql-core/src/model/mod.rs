//! Runtime data model definitions.
//!
//! Types in `model` are the runtime representations of schema-level
//! entities: built once when the application is loaded, immutable afterwards,
//! and shared by the SQL generator and the at-expression executor.
//!
//! In general:
//! - The compiler defines *what exists*
//! - `model` defines *what runs*
pub mod attribute;
pub mod entity;

pub use attribute::AttributeModel;
pub use entity::{EntityFlags, EntityModel, ExternalChainRef, ExternalEntityRef};
