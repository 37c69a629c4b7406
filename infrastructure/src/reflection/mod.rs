//! Reflection adapters

mod gateway_reflector;

pub use gateway_reflector::GatewayReflector;
