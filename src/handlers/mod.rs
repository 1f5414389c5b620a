pub mod auth;
pub mod health;
pub mod products;
pub mod user;
