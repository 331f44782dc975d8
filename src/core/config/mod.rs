pub mod data;
pub mod defaults;
pub mod io;
pub mod printing;

pub use data::{Config, CustomModel, CustomProvider};

#[cfg(test)]
mod tests;
