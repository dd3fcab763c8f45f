pub mod account;
pub mod client;
pub mod elasticsearch;

pub use account::{AccountMetadata, BackendAccount};
pub use client::{BackendError, UserManager};
pub use elasticsearch::ElasticsearchUserManager;
