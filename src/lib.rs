pub mod cli;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod file;
pub mod store;

#[cfg(feature = "keyring-store")]
pub mod keyring;
