//! # Infrastructure Adapters
//!
//! Infrastructure implementations of the secret store interface.

pub mod filesystem_secret_store;
pub mod memory_secret_store;

pub use filesystem_secret_store::FilesystemSecretStore;
pub use memory_secret_store::InMemorySecretStore;
