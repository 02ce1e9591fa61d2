//! Client configuration
//!
//! Configuration is immutable once a client has been built from it.

mod schema;
mod store;

pub use schema::{ClientConfig, SignalingConfig, DEFAULT_NATIVE_PORT, DEFAULT_SENSOR_PORT};
pub use store::PASSWORD_ENV;
