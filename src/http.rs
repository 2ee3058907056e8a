/// Report HTTP endpoint
///
/// A small HTTP/1.1 server for triggering reports and collecting them:
/// `/trigger_report`, `/get_report`, `/download_report`, plus `/health` and
/// `/metrics` for monitoring.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::reference_time;
use crate::jobs::{ReportRegistry, ReportStats, ReportStatus};
use crate::orchestrator::run_report;
use crate::report::{report_file_name, write_report};
use crate::source::{Dataset, ObservationSource};

/// Timeout for reading HTTP request (prevents slow-loris attacks)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// Everything a request handler needs
#[derive(Debug)]
pub struct AppState {
    pub dataset: Arc<Dataset>,
    pub registry: ReportRegistry,
    pub report_dir: PathBuf,
    pub default_tz: Tz,
    pub now_override: Option<DateTime<Utc>>,
    pub workers: usize,
}

impl AppState {
    pub fn new(dataset: Arc<Dataset>, report_dir: PathBuf, default_tz: Tz) -> Self {
        Self {
            dataset,
            registry: ReportRegistry::new(),
            report_dir,
            default_tz,
            now_override: None,
            workers: default_workers(),
        }
    }

    pub fn with_now(mut self, now: Option<DateTime<Utc>>) -> Self {
        self.now_override = now;
        self
    }
}

/// One blocking worker per available core
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Run the report HTTP server until cancelled
pub async fn run_server(port: u16, state: Arc<AppState>, cancel_token: CancellationToken) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind report server on port {}: {}", port, e);
            return;
        }
    };

    info!("Report server listening on http://0.0.0.0:{}", port);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((mut socket, peer_addr)) => {
                        let state = state.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(&mut socket, &state).await {
                                debug!("Error handling request from {}: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!("Report server shutting down");
                break;
            }
        }
    }
}

async fn handle_connection(
    socket: &mut tokio::net::TcpStream,
    state: &Arc<AppState>,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; MAX_REQUEST_BYTES];

    let n = match timeout(REQUEST_TIMEOUT, socket.read(&mut buf)).await {
        Ok(result) => result?,
        Err(_) => {
            debug!("Request timeout after {:?}", REQUEST_TIMEOUT);
            return Ok(());
        }
    };

    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buf[..n]);
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("GET");
    let target = parts.next().unwrap_or("/");

    let response = route(state, method, target).await;
    socket.write_all(response.as_bytes()).await?;
    socket.flush().await?;

    Ok(())
}

/// Dispatch one request to its handler and return the raw HTTP response
pub async fn route(state: &Arc<AppState>, method: &str, target: &str) -> String {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let report_id = query_param(query, "report_id");
    let report_id = report_id.as_deref();

    match (method, path.trim_end_matches('/')) {
        ("GET", "/health") => build_json_response(200, "OK", &json!({ "ok": true })),
        ("POST", "/trigger_report") => {
            let id = trigger_report(state);
            build_json_response(200, "OK", &json!({ "report_id": id }))
        }
        ("GET", "/get_report") => match report_id {
            Some(id) => build_report_status_response(&state.registry, id),
            None => build_bad_request_response("report_id is required"),
        },
        ("GET", "/download_report") => match report_id {
            Some(id) => build_download_response(&state.registry, id).await,
            None => build_bad_request_response("report_id is required"),
        },
        ("GET", "/metrics") => build_metrics_response(&state.registry.stats()),
        (_, "/health" | "/trigger_report" | "/get_report" | "/download_report" | "/metrics") => {
            build_json_response(405, "Method Not Allowed", &json!({ "error": "Method Not Allowed" }))
        }
        _ => build_not_found_response(),
    }
}

/// Register a job and compute it in the background
pub fn trigger_report(state: &Arc<AppState>) -> String {
    let id = state.registry.start();
    let state = Arc::clone(state);
    let report_id = id.clone();

    tokio::spawn(async move {
        let now = reference_time(state.now_override, state.dataset.latest_timestamp());
        info!("Report {} computing at reference time {}", report_id, now);
        let outcome = run_report(Arc::clone(&state.dataset), now, state.default_tz, state.workers).await;

        let dir = state.report_dir.clone();
        let file_id = report_id.clone();
        let written = tokio::task::spawn_blocking(move || {
            let path = write_report(&dir, &file_id, &outcome)?;
            Ok::<_, anyhow::Error>((path, outcome.failures.len()))
        })
        .await;

        match written {
            Ok(Ok((path, stores_failed))) => {
                state.registry.complete(&report_id, path, stores_failed);
            }
            Ok(Err(e)) => {
                error!("Report {} failed: {:#}", report_id, e);
                state.registry.fail(&report_id, format!("{:#}", e));
            }
            Err(e) => {
                error!("Report {} task failed: {}", report_id, e);
                state.registry.fail(&report_id, e.to_string());
            }
        }
    });

    id
}

/// Percent-decoded value of `key`; empty values count as absent
fn query_param(query: &str, key: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| urlencoding::decode(v).ok())
        .map(|v| v.into_owned())
        .filter(|v| !v.is_empty())
}

fn build_report_status_response(registry: &ReportRegistry, id: &str) -> String {
    match registry.status(id) {
        Some(ReportStatus::Running) => {
            build_json_response(200, "OK", &json!({ "status": "Running" }))
        }
        Some(ReportStatus::Complete { path }) => build_json_response(
            200,
            "OK",
            &json!({
                "status": "Complete",
                "report_path": path.display().to_string(),
                "download_name": report_file_name(id),
            }),
        ),
        Some(ReportStatus::Failed { reason }) => build_json_response(
            200,
            "OK",
            &json!({ "status": format!("Error: {}", reason) }),
        ),
        None => build_not_found_response(),
    }
}

async fn build_download_response(registry: &ReportRegistry, id: &str) -> String {
    let Some(ReportStatus::Complete { path }) = registry.status(id) else {
        return build_not_found_response();
    };

    match tokio::fs::read_to_string(&path).await {
        Ok(body) => format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/csv\r\nContent-Disposition: attachment; filename=\"{}\"\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            report_file_name(id),
            body.len(),
            body
        ),
        Err(e) => {
            warn!("Report {} file {} unreadable: {}", id, path.display(), e);
            build_not_found_response()
        }
    }
}

fn build_json_response(status_code: u16, status_text: &str, body: &serde_json::Value) -> String {
    let body = body.to_string();
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_code,
        status_text,
        body.len(),
        body
    )
}

fn build_bad_request_response(message: &str) -> String {
    build_json_response(400, "Bad Request", &json!({ "error": message }))
}

fn build_metrics_response(stats: &ReportStats) -> String {
    // Prometheus-compatible metrics format
    let body = format!(
        "# HELP storemon_reports_total Reports by lifecycle event\n\
         # TYPE storemon_reports_total counter\n\
         storemon_reports_total{{event=\"triggered\"}} {}\n\
         storemon_reports_total{{event=\"completed\"}} {}\n\
         storemon_reports_total{{event=\"failed\"}} {}\n\
         # HELP storemon_store_failures_total Stores left out of completed reports\n\
         # TYPE storemon_store_failures_total counter\n\
         storemon_store_failures_total {}\n",
        stats.triggered, stats.completed, stats.failed, stats.stores_failed
    );

    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

fn build_not_found_response() -> String {
    build_json_response(404, "Not Found", &json!({ "error": "Not Found" }))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Query parsing never panics and only returns non-empty values
        #[test]
        fn query_param_never_panics(query in ".*", key in "[a-z_]{1,10}") {
            if let Some(v) = query_param(&query, &key) {
                prop_assert!(!v.is_empty());
            }
        }

        /// JSON responses always carry a matching Content-Length
        #[test]
        fn json_response_length_matches(msg in ".*") {
            let response = build_bad_request_response(&msg);
            let (head, body) = response.split_once("\r\n\r\n").unwrap();
            let expected = format!("Content-Length: {}", body.len());
            prop_assert!(head.contains(&expected));
        }
    }
}
