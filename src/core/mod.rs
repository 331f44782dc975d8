pub mod builtin_providers;
pub mod completion;
pub mod config;
pub mod context;
pub mod error;
pub mod keyring;
pub mod providers;
pub mod session;
pub mod storage;
pub mod store;
