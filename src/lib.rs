pub mod aggregator;
pub mod config;
pub mod constants;
pub mod logging;
pub mod response;
pub mod routes;
pub mod source;
pub mod state;
pub mod store;
pub mod validation;
pub mod workers;
