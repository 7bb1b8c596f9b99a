use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    middleware,
    routing::{get, post, put},
};
use medlearn_auth::{AuthState, JwtService};
use medlearn_objects::{DynObjectStore, FsObjectStore, MemoryObjectStore};
use medlearn_storage::DynDocumentStore;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::config::{AppConfig, ObjectBackend, StorageBackend};
use crate::locks::KeyedLocks;
use crate::middleware::{self as app_middleware, RequestId};
use crate::{attachments, cv, events, handlers, registrations, users};

/// Extra room for multipart framing on top of the file size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

const LOCK_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: DynDocumentStore,
    pub objects: DynObjectStore,
    pub auth: AuthState,
    pub config: Arc<AppConfig>,
    pub locks: KeyedLocks,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl AppState {
    pub fn new(config: AppConfig, store: DynDocumentStore, objects: DynObjectStore) -> Self {
        let jwt = Arc::new(JwtService::new(&config.auth));
        Self {
            store,
            objects,
            auth: AuthState::new(jwt),
            config: Arc::new(config),
            locks: KeyedLocks::new(),
        }
    }

    /// State backed by the in-memory stores, whatever the config says.
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(
            config,
            medlearn_db_memory::create_store(),
            Arc::new(MemoryObjectStore::new()),
        )
    }

    /// Connects the configured backends.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let store = match config.storage.backend {
            StorageBackend::Memory => medlearn_db_memory::create_store(),
            StorageBackend::Postgres => {
                let pg = config
                    .storage
                    .postgres
                    .clone()
                    .context("storage.backend = \"postgres\" requires [storage.postgres]")?;
                medlearn_db_postgres::create_store(pg)
                    .await
                    .context("failed to connect to PostgreSQL")?
            }
        };

        let objects: DynObjectStore = match config.objects.backend {
            ObjectBackend::Memory => Arc::new(MemoryObjectStore::new()),
            ObjectBackend::Filesystem => Arc::new(
                FsObjectStore::new(config.objects.root.clone())
                    .await
                    .with_context(|| {
                        format!("failed to open object root {}", config.objects.root.display())
                    })?,
            ),
        };

        tracing::info!(
            storage = store.backend_name(),
            objects = objects.backend_name(),
            "Backends initialized"
        );
        Ok(Self::new(config, store, objects))
    }
}

pub struct MedlearnServer {
    addr: SocketAddr,
    app: Router,
    locks: KeyedLocks,
}

fn api_routes(state: &AppState) -> Router<AppState> {
    let upload_limit = state.config.objects.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        // Accounts
        .route("/auth/register", post(users::register))
        .route("/auth/login", post(users::login))
        .route("/auth/me", get(users::me))
        .route("/users/me", put(users::update_me))
        .route("/users/me/password", post(users::change_password))
        .route("/admin/users", get(users::list_users))
        .route("/admin/users/{id}", axum::routing::patch(users::admin_update_user))
        // CV
        .route("/cv", get(cv::get_cv).put(cv::put_cv).delete(cv::delete_cv))
        .route("/cv/pdf", get(cv::my_cv_pdf))
        .route("/admin/users/{id}/cv/pdf", get(cv::user_cv_pdf))
        // Events
        .route("/events", get(events::handlers::list).post(events::handlers::create))
        .route(
            "/events/{id}",
            get(events::handlers::get)
                .put(events::handlers::update)
                .delete(events::handlers::delete),
        )
        .route("/events/{id}/status", post(events::handlers::set_status))
        // Registrations
        .route(
            "/events/{id}/registrations",
            get(registrations::handlers::list_for_event).post(registrations::handlers::create),
        )
        .route("/registrations/me", get(registrations::handlers::list_mine))
        .route("/registrations/{id}", get(registrations::handlers::get))
        .route("/registrations/{id}/cancel", post(registrations::handlers::cancel))
        .route("/registrations/{id}/status", post(registrations::handlers::set_status))
        // Attachments
        .route(
            "/attachments",
            get(attachments::list)
                .post(attachments::upload)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/attachments/{id}",
            get(attachments::get).delete(attachments::delete),
        )
        .route("/attachments/{id}/content", get(attachments::content))
}

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .nest("/api", api_routes(&state))
        .with_state(state)
        // Layers run outside in: request id -> trace -> compression -> cors -> body limit
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<RequestId>()
                        .and_then(|id| id.0.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    state: AppState,
}

impl ServerBuilder {
    pub fn new(state: AppState) -> Self {
        Self {
            addr: state.config.addr(),
            state,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn build(self) -> MedlearnServer {
        MedlearnServer {
            addr: self.addr,
            locks: self.state.locks.clone(),
            app: build_app(self.state),
        }
    }
}

impl MedlearnServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.addr))?;
        tracing::info!("listening on {}", self.addr);

        let locks = self.locks;
        let pruner = tokio::spawn(async move {
            let mut tick = tokio::time::interval(LOCK_PRUNE_INTERVAL);
            loop {
                tick.tick().await;
                locks.prune();
            }
        });

        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;
        pruner.abort();
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
