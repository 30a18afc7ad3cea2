//! service-core: error taxonomy, configuration loading, logging and HTTP
//! middleware shared by the gateway binary.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
