/*
 * Responsibility
 * - ドメインサービス群 (HTTP 層から独立)
 * - identity → credentials (roles / crypto / cache / backend) → forward
 */
pub mod backend;
pub mod cache;
pub mod credentials;
pub mod crypto;
pub mod forward;
pub mod identity;
pub mod roles;
pub mod sanitize;
