//! Field storage, boundary conditions, and staggered-grid operators.

mod field;
mod store;

pub use field::{FaceBc, Field, FieldKind};
pub use store::FieldStore;
