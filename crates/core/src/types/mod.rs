//! Core type definitions.

mod id;
mod money;
mod step;

pub use id::*;
pub use money::*;
pub use step::*;
