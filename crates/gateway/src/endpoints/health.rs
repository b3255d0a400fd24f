//! # GET /healthz

/// GET /healthz: liveness probe.
pub async fn handle_health() -> &'static str {
    "ok"
}
