//! threadweave/crates/tw-core/src/lib.rs
//!
//! The central domain model and port definitions for the threaded
//! content store.

pub mod error;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;
