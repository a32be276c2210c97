//! Consilium Core - Case, agent, result and lifecycle types plus error handling

pub mod case;
pub mod error;
pub mod result;
pub mod task;
pub mod types;

pub use case::*;
pub use error::{Error, Result};
pub use result::*;
pub use task::*;
pub use types::*;
