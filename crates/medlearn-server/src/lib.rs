pub mod attachments;
pub mod bootstrap;
pub mod config;
pub mod cv;
pub mod error;
pub mod events;
pub mod handlers;
pub mod locks;
pub mod middleware;
pub mod observability;
pub mod pagination;
pub mod registrations;
pub mod server;
pub mod users;

pub use bootstrap::{BootstrapOutcome, bootstrap_admin};
pub use config::{
    AppConfig, BootstrapConfig, LoggingConfig, ObjectBackend, ObjectsConfig, PdfConfig,
    ServerConfig, StorageBackend, StorageConfig,
};
pub use locks::KeyedLocks;
pub use observability::{init_tracing, shutdown_tracing};
pub use server::{AppState, MedlearnServer, ServerBuilder, build_app};
