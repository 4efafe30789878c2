//! # notesync Testkit
//!
//! Test utilities for notesync.
//!
//! This crate provides:
//! - Temporary sync roots and chunk builders
//! - Scripted conflict resolvers that log every call
//! - Callbacks that record processing events
//! - Fake payload downloaders with injectable failures
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use notesync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn applies_notebooks() {
//!     let storage = memory_storage();
//!     let chunk = ChunkBuilder::new(1, 2)
//!         .notebook(Notebook::new("a").with_guid("nb1", 1))
//!         .build();
//!     // ... run a processor
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod callback;
pub mod download;
pub mod fixtures;
pub mod generators;
pub mod resolver;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::callback::*;
    pub use crate::download::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::resolver::*;
}

pub use callback::*;
pub use download::*;
pub use fixtures::*;
pub use generators::*;
pub use resolver::*;
