//! The serve-and-trigger delivery engine: a short-lived HTTP origin over an
//! ephemeral workspace, with an idle-timeout lifecycle.
//!
//! Fork-per-request in the reference implementation becomes one `tokio`
//! task per accepted connection here; the state machine in [`Outcome`] is
//! what matters, not the concurrency primitive underneath it.

use crate::error::{self, Result};
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use snafu::ResultExt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

const DEFAULT_FIRST_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// How a serve session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Requests were served and then the idle timeout elapsed.
    Completed,
    /// Explicitly cancelled (user interrupt, or caller-initiated close).
    Aborted,
    /// `first_request_timeout` elapsed without any client connecting.
    AbortedNoClient,
}

/// An ephemeral workspace plus the loads bundle assembled within it.
pub struct ServeEngine {
    workspace: tempfile::TempDir,
    manifest_relative_path: PathBuf,
    first_request_timeout: Duration,
    idle_timeout: Duration,
}

impl ServeEngine {
    /// Create a fresh ephemeral workspace and populate it by calling
    /// `assemble`, which receives the workspace root and must return the
    /// path to the `.loads` manifest it wrote (typically delegating to
    /// `loads_bundle::build` or `build_with_deps`).
    pub fn new(
        assemble: impl FnOnce(&Path) -> loads_bundle::Result<PathBuf>,
    ) -> Result<Self> {
        let workspace = tempfile::tempdir().context(error::CreateWorkspaceSnafu {
            path: std::env::temp_dir(),
        })?;
        let manifest_path = assemble(workspace.path())?;
        let manifest_relative_path = manifest_path
            .strip_prefix(workspace.path())
            .unwrap_or(&manifest_path)
            .to_path_buf();
        Ok(ServeEngine {
            workspace,
            manifest_relative_path,
            first_request_timeout: DEFAULT_FIRST_REQUEST_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        })
    }

    pub fn with_timeouts(mut self, first_request: Duration, idle: Duration) -> Self {
        self.first_request_timeout = first_request;
        self.idle_timeout = idle;
        self
    }

    /// Path to the `.loads` manifest, relative to the served workspace root.
    /// The caller combines this with the bound address to build the trigger
    /// URL handed to the device over the remote shell.
    pub fn manifest_relative_path(&self) -> &Path {
        &self.manifest_relative_path
    }

    /// The workspace directory this engine serves from. Exists only until
    /// the session this engine produces via [`listen`](Self::listen) ends.
    pub fn workspace_root(&self) -> &Path {
        self.workspace.path()
    }

    /// Bind on `[::]:0` and begin listening. Returns immediately with the
    /// bound address and a handle to await the eventual [`Outcome`]; the
    /// request-serving and idle-timeout accounting run in the background.
    pub async fn listen(self, cancel: CancellationToken) -> Result<Listening> {
        let listener = TcpListener::bind("[::]:0")
            .await
            .context(error::BindSnafu { addr: "[::]:0".to_string() })?;
        let addr = listener
            .local_addr()
            .context(error::BindSnafu { addr: "[::]:0".to_string() })?;
        log::info!("Serving {} over port {}...", self.workspace.path().display(), addr.port());

        let (tx, rx) = mpsc::unbounded_channel::<()>();
        let root = self.workspace.path().to_path_buf();
        let router = Router::new()
            .fallback_service(ServeDir::new(&root))
            .layer(SetResponseHeaderLayer::overriding(
                axum::http::header::SERVER,
                HeaderValue::from_static("loadsdir.py/1"),
            ))
            .layer(middleware::from_fn_with_state(tx, log_and_notify));

        let server_token = CancellationToken::new();
        let server_handle = tokio::spawn({
            let token = server_token.clone();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move { token.cancelled().await })
                    .await
            }
        });

        let first_request_timeout = self.first_request_timeout;
        let idle_timeout = self.idle_timeout;
        let workspace = self.workspace;

        let handle = tokio::spawn(async move {
            let outcome = run_until_idle(rx, cancel, first_request_timeout, idle_timeout).await;
            server_token.cancel();
            let join_result = server_handle.await.context(error::ServerTaskSnafu);
            // Workspace teardown happens on every exit path, including an
            // abnormal one, because dropping it here runs unconditionally.
            drop(workspace);
            join_result?;
            Ok(outcome)
        });

        Ok(Listening { addr, handle })
    }
}

async fn run_until_idle(
    mut rx: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
    first_request_timeout: Duration,
    idle_timeout: Duration,
) -> Outcome {
    tokio::select! {
        _ = cancel.cancelled() => return Outcome::Aborted,
        res = tokio::time::timeout(first_request_timeout, rx.recv()) => {
            match res {
                Err(_elapsed) => return Outcome::AbortedNoClient,
                Ok(None) => return Outcome::AbortedNoClient,
                Ok(Some(())) => {}
            }
        }
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Outcome::Aborted,
            res = tokio::time::timeout(idle_timeout, rx.recv()) => {
                match res {
                    Err(_elapsed) => return Outcome::Completed,
                    Ok(None) => return Outcome::Completed,
                    Ok(Some(())) => continue,
                }
            }
        }
    }
}

async fn log_and_notify(
    State(tx): State<mpsc::UnboundedSender<()>>,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    log::info!("  << Requested: {}...", path);
    let response = next.run(req).await;
    log::info!("  >> Responded: {}", path);
    let _ = tx.send(());
    response
}

/// A listening serve session: the bound address is known immediately, the
/// [`Outcome`] resolves once the session ends.
pub struct Listening {
    addr: SocketAddr,
    handle: JoinHandle<Result<Outcome>>,
}

impl Listening {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn join(self) -> Result<Outcome> {
        self.handle.await.context(error::ServerTaskSnafu)?
    }
}
