//! HTTP API handlers for leadflow-intake

pub mod ci;
pub mod health;
pub mod quote;
pub mod voice;

pub use ci::ci_routes;
pub use health::health_routes;
pub use quote::quote_routes;
pub use voice::voice_routes;
