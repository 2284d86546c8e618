pub mod catalog;
pub mod config;
pub mod core;
pub mod gateway;
pub mod normalize;
pub mod providers;
pub mod routing;
pub mod stream;
pub mod transport;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use config::GatewayConfig;
pub use core::types::*;
pub use gateway::{Gateway, GatewayBuilder, GatewayResponse, PreparedRequest};
