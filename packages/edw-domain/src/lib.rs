pub mod classify;
pub mod entity;
pub mod query;
pub mod relation;
pub mod semantic;
pub mod snapshot;
pub mod term;

mod error;
mod time_serde;

pub use error::{Error, Result};
