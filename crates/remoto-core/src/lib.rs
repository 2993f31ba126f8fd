//! remoto-core: shared configuration and error types
//!
//! Everything the relay worker and the supervisor need to agree on before a
//! socket is bound: listening port, basic-auth credentials, static asset
//! directory and the liveness sweep interval.

pub mod config;
pub mod error;

pub use config::{Config, ConfigOverrides, Credentials};
pub use error::{Error, Result};
