pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod state;
