//! HTTP transport for the export pipeline.
//!
//! The handler authorizes the caller and validates the range before any store work happens,
//! then runs [`pipeline::export`] on a blocking worker. The worker writes CSV chunks into a
//! small bounded channel that backs the response body, so a slow client slows the store
//! queries down and a gone client stops them.

use crate::auth::{self, Authorizer};
use crate::error::ExportError;
use crate::pipeline::{self, ExportOptions, PipelineError};
use crate::range::{DateRange, RangeError};
use crate::store::ExportStore;
use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Query, State, rejection::QueryRejection},
    http::{
        HeaderMap, HeaderValue,
        header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{Stream, StreamExt, future, stream};
use serde::Deserialize;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::{self, ctrl_c};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{Span, error, info, warn};

/// Chunks in flight between the worker and the response body.
const CHANNEL_CAPACITY: usize = 4;

type Chunk = Result<Bytes, PipelineError>;

/// Everything a request needs. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ExportStore>,
    pub authorizer: Arc<dyn Authorizer>,
    pub export_roles: Arc<[String]>,
    pub options: ExportOptions,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ExportStore>,
        authorizer: Arc<dyn Authorizer>,
        export_roles: Vec<String>,
        options: ExportOptions,
    ) -> Self {
        Self {
            store,
            authorizer,
            export_roles: export_roles.into(),
            options,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/attendance/export", get(export_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn export_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<ExportParams>, QueryRejection>,
) -> Result<Response, ExportError> {
    let credential = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let principal = auth::authorize(state.authorizer.as_ref(), credential, &state.export_roles)?;

    let Query(params) = params.map_err(|e| RangeError::Malformed(e.body_text()))?;
    let range = DateRange::parse(params.start_date.as_deref(), params.end_date.as_deref())?;

    info!(subject = %principal.subject, role = %principal.role, %range, "export started");

    let (tx, mut rx) = mpsc::channel::<Chunk>(CHANNEL_CAPACITY);
    let span = Span::current();
    let worker = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        run_export(state.store.as_ref(), range, &state.options, tx);
    });

    // Nothing is committed until the worker has produced bytes, so an early failure still
    // gets a proper status code.
    let first = match rx.recv().await {
        Some(Ok(chunk)) => chunk,
        Some(Err(err)) => return Err(err.into()),
        None => {
            if let Err(err) = worker.await {
                error!(%range, error = %err, "export worker died before streaming");
            }
            return Err(ExportError::WorkerLost);
        }
    };

    let rest = remaining_chunks(rx, worker);
    let body = Body::from_stream(stream::once(future::ready(Ok(first))).chain(rest));

    let disposition = format!("attachment; filename=\"{}\"", range.file_name());
    let mut response = body.into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/csv"));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// The rest of the body. A worker that dies without reporting an error still ends the
/// body with one, so the download never looks complete.
fn remaining_chunks(
    rx: mpsc::Receiver<Chunk>,
    worker: JoinHandle<()>,
) -> impl Stream<Item = Result<Bytes, ExportError>> {
    stream::unfold((rx, Some(worker)), |(mut rx, worker)| async move {
        if let Some(chunk) = rx.recv().await {
            return Some((chunk.map_err(ExportError::from), (rx, worker)));
        }
        match worker?.await {
            Ok(()) => None,
            Err(err) => {
                error!(error = %err, "export worker died mid-stream");
                Some((Err(ExportError::WorkerLost), (rx, None)))
            }
        }
    })
}

/// Runs one export to completion on the current (blocking) thread.
fn run_export(
    store: &dyn ExportStore,
    range: DateRange,
    options: &ExportOptions,
    tx: mpsc::Sender<Chunk>,
) {
    let sink = ChunkSender { tx: tx.clone() };
    match pipeline::export(store, &range, options, sink) {
        Ok(summary) => info!(
            %range,
            rows = summary.rows,
            failed_lookups = summary.failed_lookups,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "export finished"
        ),
        Err(PipelineError::Disconnected) => warn!(%range, "export cancelled, client went away"),
        Err(err) => {
            error!(%range, error = %err, "export aborted");
            // Fails only if the client is already gone.
            let _ = tx.blocking_send(Err(err));
        }
    }
}

/// Hands each buffer the encoder flushes to the response body.
struct ChunkSender {
    tx: mpsc::Sender<Chunk>,
}

impl Write for ChunkSender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "export response dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Binds `bind` and serves until ctrl-c or SIGTERM.
pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(bind).await?;
    info!("Server running on {bind}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
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
}
