//! Worker process: built-in work functions and their registry.

pub mod jobs;

pub use jobs::builtin_registry;
