//! # medlearn-storage
//!
//! Document storage abstraction for the MedLearn server.
//!
//! This crate defines the traits and types that all storage backends must implement.
//! It does not contain any implementations - those are provided by
//! `medlearn-db-memory` and `medlearn-db-postgres`.
//!
//! ## Example
//!
//! ```ignore
//! use medlearn_storage::{Collection, Document, Query};
//!
//! let events: Collection<Event> = Collection::new(store.clone());
//! let open = events.find(&Query::new().eq("status", "open").limit(20)).await?;
//! ```

mod collection;
mod error;
mod traits;
mod types;

pub use collection::{Collection, Document, Versioned};
pub use error::{ErrorCategory, StorageError};
pub use traits::DocumentStore;
pub use types::{MAX_PAGE_SIZE, Page, Query, Sort, StoredDocument};

/// Type alias for a shareable document store.
pub type DynDocumentStore = std::sync::Arc<dyn DocumentStore>;
