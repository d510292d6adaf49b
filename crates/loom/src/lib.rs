//! # Loom
//!
//! Token tree explorer: starting from a prompt, expands the `width` most
//! probable next tokens of every branch, layer by layer, until `depth`.
//!
//! ## Quick Start
//!
//! ```rust
//! use loom::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let backend = StaticBackend::with_probabilities(["A", "B", "C"], &[0.6, 0.3, 0.1])?;
//!
//! let loom = Loom::builder()
//!     .backend(backend)
//!     .prompt("A")
//!     .depth(2)
//!     .width(2)
//!     .build()?;
//! loom.run()?;
//!
//! assert_eq!(loom.store().len(), 7);
//! println!("{}", loom.to_json()?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Re-export core crate
pub use loom_core::*;

mod engine;

pub use engine::{Loom, LoomBuilder};

/// Commonly used types.
pub mod prelude {
    pub use crate::engine::{Loom, LoomBuilder};
    pub use loom_core::prelude::*;

    // Re-export useful external types
    pub use anyhow;
    pub use tracing;
}
