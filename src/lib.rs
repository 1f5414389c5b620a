pub mod auth;
pub mod cache;
pub mod config;
pub mod dto;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod password;
pub mod rate_limit;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
