/*!
 * Prelude module for labbridge core.
 *
 * Re-exports the commonly used types so downstream crates can glob-import them.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::{ConnectionKind, ConnectionMode, Id};

// Re-export config types
pub use crate::config::{Config, ConfigBuilder, OutletBackend};

// Re-export logging macros
pub use tracing::{debug, error, info, trace, warn};
