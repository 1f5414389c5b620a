pub mod jwt;
pub mod product;
pub mod refresh_token;
pub mod user;
