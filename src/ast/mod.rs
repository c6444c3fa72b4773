pub mod types;
pub mod types_impl;

pub use types::*;
