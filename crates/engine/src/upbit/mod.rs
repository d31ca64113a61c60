pub mod auth;
mod model;
pub mod rest;

pub use auth::{KeyPair, KeyResolver, StaticKeyResolver};
pub use rest::UpbitClient;
