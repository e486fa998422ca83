// Copyright 2025-2026 CEMAXECUTER LLC

//! Small web server publishing the evolving spectrum: static files, a JSON
//! snapshot, and a chunked text stream. Runs on its own thread; the scan
//! side only ever hands it a read view of the accumulator.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::handler::HandlerWithoutStateExt;
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use hyper::body::Incoming;
use hyper_util::rt::{TokioIo, TokioTimer};
use serde::Serialize;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use ps_scan::{Frequency, ScanPlan, SharedSpectrum};

/// Seconds between chunks on the streaming endpoint
const STREAM_INTERVAL: Duration = Duration::from_secs(2);

/// Keep-alive policy: at most this many requests per connection
const KEEP_ALIVE_MAX_REQUESTS: usize = 20;

/// Keep-alive policy: drop a connection idle for this long between requests
const KEEP_ALIVE_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Read-only view of the scan handed to request handlers.
#[derive(Clone)]
pub struct SpectrumView {
    pub start_frequency: Frequency,
    pub end_frequency: Frequency,
    pub frequency_resolution: Frequency,
    pub spectrum: SharedSpectrum,
}

impl SpectrumView {
    pub fn new(plan: &ScanPlan, spectrum: SharedSpectrum) -> Self {
        Self {
            start_frequency: plan.start_frequency,
            end_frequency: plan.end_frequency,
            frequency_resolution: plan.frequency_resolution,
            spectrum,
        }
    }
}

#[derive(Clone)]
struct AppState {
    view: SpectrumView,
    running: Arc<AtomicBool>,
}

/// Handle to the running server thread.
pub struct WebServer {
    handle: Option<JoinHandle<()>>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    running: Arc<AtomicBool>,
}

/// Spawn the server thread listening on localhost:`port`.
pub fn start(port: u16, public_dir: PathBuf, view: SpectrumView) -> WebServer {
    let running = Arc::new(AtomicBool::new(true));
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let state = AppState {
        view,
        running: Arc::clone(&running),
    };
    let handle = thread::Builder::new()
        .name("web".to_string())
        .spawn(move || run_server(port, public_dir, state, shutdown_rx))
        .expect("failed to spawn web thread");

    WebServer {
        handle: Some(handle),
        shutdown: Some(shutdown_tx),
        running,
    }
}

impl WebServer {
    /// Ask the serving loop to return and wait for the thread. Streaming
    /// responses notice the stop flag at their next tick.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WebServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_server(
    port: u16,
    public_dir: PathBuf,
    state: AppState,
    shutdown: tokio::sync::oneshot::Receiver<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("can't start web runtime: {}", e);
            return;
        }
    };

    runtime.block_on(async move {
        let app = Router::new()
            .route("/", get(redirect_to_index))
            .route("/spectrum", get(spectrum_snapshot))
            .route("/chunked", get(chunked_snapshots))
            .fallback_service(
                ServeDir::new(&public_dir).not_found_service(not_found.into_service()),
            )
            .layer(middleware::from_fn(log_request))
            .with_state(state);

        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                log::error!("can't start web server on localhost:{}: {}", port, e);
                return;
            }
        };
        log::info!("web interface on http://localhost:{}/", port);

        let mut shutdown = pin!(shutdown);
        loop {
            let stream = tokio::select! {
                _ = shutdown.as_mut() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => stream,
                    Err(e) => {
                        log::debug!("accept failed: {}", e);
                        continue;
                    }
                },
            };
            tokio::spawn(serve_connection(stream, app.clone()));
        }
        log::debug!("web server done");
    });
}

/// Serve one keep-alive connection: at most `KEEP_ALIVE_MAX_REQUESTS`
/// requests, closed when idle for `KEEP_ALIVE_IDLE_TIMEOUT` between
/// requests (the header-read timer covers the wait for the next request).
async fn serve_connection(stream: tokio::net::TcpStream, app: Router) {
    let served = Arc::new(AtomicUsize::new(0));
    let service = hyper::service::service_fn(move |request: axum::http::Request<Incoming>| {
        let count = served.fetch_add(1, Ordering::SeqCst) + 1;
        let response = app.clone().oneshot(request);
        async move {
            let mut response = response.await?;
            if count >= KEEP_ALIVE_MAX_REQUESTS {
                response
                    .headers_mut()
                    .insert(header::CONNECTION, HeaderValue::from_static("close"));
            }
            Ok::<_, Infallible>(response)
        }
    });

    let result = hyper::server::conn::http1::Builder::new()
        .timer(TokioTimer::new())
        .keep_alive(true)
        .header_read_timeout(KEEP_ALIVE_IDLE_TIMEOUT)
        .serve_connection(TokioIo::new(stream), service)
        .await;
    if let Err(e) = result {
        log::debug!("connection closed: {}", e);
    }
}

async fn log_request(request: Request, next: Next) -> Response {
    log::debug!("{} {}", request.method(), request.uri().path());
    next.run(request).await
}

async fn redirect_to_index() -> impl IntoResponse {
    (
        StatusCode::FOUND,
        [(header::LOCATION, "/index.html")],
    )
}

/// Minimal error page in the style of the rest of the UI.
async fn not_found() -> impl IntoResponse {
    error_page(StatusCode::NOT_FOUND)
}

fn error_page(status: StatusCode) -> (StatusCode, Html<String>) {
    (
        status,
        Html(format!(
            "<p>Error Status: <span style='color:red;'>{}</span></p>",
            status.as_u16()
        )),
    )
}

#[derive(Serialize)]
struct SpectrumSnapshot {
    start_frequency: Frequency,
    end_frequency: Frequency,
    frequency_resolution: Frequency,
    accumulation_count: u64,
    /// Accumulated magnitude per bucket, averaged over the frame count
    power: Vec<f32>,
}

impl SpectrumSnapshot {
    fn capture(view: &SpectrumView) -> Self {
        let (power, accumulation_count) = {
            let acc = view
                .spectrum
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            (acc.power().to_vec(), acc.accumulation_count())
        };
        let power = if accumulation_count > 0 {
            let scale = 1.0 / accumulation_count as f32;
            power.into_iter().map(|p| p * scale).collect()
        } else {
            power
        };
        Self {
            start_frequency: view.start_frequency,
            end_frequency: view.end_frequency,
            frequency_resolution: view.frequency_resolution,
            accumulation_count,
            power,
        }
    }

    fn summary_line(&self) -> String {
        let peak = self.power.iter().cloned().fold(0.0f32, f32::max);
        format!(
            "{} accumulations over {} buckets, peak {:.3}\n\n",
            self.accumulation_count,
            self.power.len(),
            peak
        )
    }
}

/// One JSON copy of the whole accumulation.
async fn spectrum_snapshot(State(state): State<AppState>) -> Json<SpectrumSnapshot> {
    Json(SpectrumSnapshot::capture(&state.view))
}

/// Keep-alive chunked stream: one accumulator summary line every couple of
/// seconds until the client goes away or the server stops.
async fn chunked_snapshots(State(state): State<AppState>) -> impl IntoResponse {
    let stream = futures::stream::unfold((state, 0u64), |(state, tick)| async move {
        if tick > 0 {
            tokio::time::sleep(STREAM_INTERVAL).await;
        }
        if !state.running.load(Ordering::SeqCst) {
            return None;
        }
        let line = SpectrumSnapshot::capture(&state.view).summary_line();
        Some((Ok::<Bytes, Infallible>(Bytes::from(line)), (state, tick + 1)))
    });

    (
        [(header::CONTENT_TYPE, "text/plain")],
        Body::from_stream(stream),
    )
}
