pub mod ai;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod suggestions;
