pub mod executor;
pub mod loader;
