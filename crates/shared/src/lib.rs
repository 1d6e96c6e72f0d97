pub mod error;
pub mod config;

pub use error::{Error, Result};
