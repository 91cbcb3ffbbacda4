pub mod bridge;
pub mod config;
pub mod error;
pub mod models;
pub mod omdb;
pub mod routes;
pub mod search;
pub mod state;
