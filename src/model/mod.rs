//! # Property Graph Model
//!
//! Store-level DTOs for the property graph the ontology lives in.
//! These types cross the storage boundary; the API-facing records built
//! from them live in [`crate::identity`].
//!
//! Design rule: this module is pure data with no I/O and no async.

pub mod node;
pub mod relationship;
pub mod path;
pub mod value;
pub mod property_map;

pub use node::{Node, NodeId};
pub use relationship::{Relationship, RelId, Direction};
pub use path::Path;
pub use value::Value;
pub use property_map::{PropertyMap, props, props_from_json, props_to_json};
