//! Domain models and types for Conduit.
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`ResourceType`], [`ResourceKey`])
//! - **The record model** ([`ExternalRecord`], [`Identifier`], [`Bundle`])
//! - **Error types** ([`ConduitError`], [`StoreError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, ConduitError>`]:
//!
//! ```rust
//! use conduit::domain::{ConduitError, Result};
//!
//! fn example() -> Result<()> {
//!     let config = conduit::config::load_config("conduit.toml")?;
//!     Ok(())
//! }
//! ```

pub mod bundle;
pub mod errors;
pub mod ids;
pub mod record;
pub mod result;

// Re-export commonly used types for convenience
pub use bundle::Bundle;
pub use errors::{ConduitError, StoreError};
pub use ids::{ResourceKey, ResourceType};
pub use record::{ExternalRecord, Identifier};
pub use result::Result;
