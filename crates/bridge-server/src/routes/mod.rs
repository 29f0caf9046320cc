pub mod auth;
pub mod chat;
pub mod health;
pub mod models;
pub mod sessions;
