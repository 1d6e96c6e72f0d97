pub mod logging;
pub mod transport;

pub use transport::{serve, Request, Response, Transport, WireError};
