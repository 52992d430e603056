//! Weft Model - Replicated item state
//!
//! Every item is owned by one model instance. A model never changes its own
//! state when written to: writes go out through the replication pipeline and
//! come back in total order with everyone else's, and only then are applied.
//!
//! - `model`: the model wrapper, reducer and codec traits
//! - `registry`: type id to constructor mapping
//! - `object`: key/value reference model

pub mod model;
pub mod object;
pub mod registry;

pub use model::*;
pub use object::*;
pub use registry::*;
