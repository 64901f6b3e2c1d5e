//! The Prometheus exporter: a single `/metrics` route rendering whatever this process has
//! recorded through the `metrics` facade.

use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub fn build_router() -> Router<()> {
    let recorder = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install prometheus recorder");

    Router::new()
        .route("/metrics", get(render))
        .with_state(recorder)
}

async fn render(axum::extract::State(handle): axum::extract::State<PrometheusHandle>) -> String {
    handle.render()
}
