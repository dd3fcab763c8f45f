pub mod auth;
pub mod config;
pub mod docs;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod reserved;
