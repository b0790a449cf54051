//! Local HTTP listener serving the single-point route (C9, spec §4.8).

use std::io::Write;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use flate2::write::GzEncoder;
use flate2::Compression;

use worker_core::{CoreError, NetworkPreloader, OutputFormat, PointSetCache, RoutingEngine, SinglePointTask};

use crate::single_point::SinglePointHandler;

/// Builds the `POST /single` route (§4.8). The endpoint's own Tokio task
/// pool is independent of the compute queue; nothing here shares state
/// with the polling loop beyond what the handler itself was constructed
/// with.
pub fn router<N, R, C>(handler: Arc<SinglePointHandler<N, R, C>>) -> Router
where
    N: NetworkPreloader + 'static,
    R: RoutingEngine<Graph = N::Graph> + 'static,
    C: PointSetCache + 'static,
{
    Router::new()
        .route("/single", post(handle_single::<N, R, C>))
        .with_state(handler)
}

async fn handle_single<N, R, C>(
    State(handler): State<Arc<SinglePointHandler<N, R, C>>>,
    Json(task): Json<SinglePointTask>,
) -> Response
where
    N: NetworkPreloader,
    R: RoutingEngine<Graph = N::Graph>,
    C: PointSetCache,
{
    let format = task.format;
    match handler.handle(task).await {
        Ok(body) => match gzip(&body) {
            Ok(compressed) => {
                let content_type = match format {
                    OutputFormat::Grid => "application/octet-stream",
                    OutputFormat::Geotiff => "image/tiff",
                };
                (
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, content_type),
                        (header::CONTENT_ENCODING, "gzip"),
                    ],
                    compressed,
                )
                    .into_response()
            }
            Err(e) => error_response(&CoreError::Compute(format!("gzip failed: {e}"))),
        },
        Err(e) => error_response(&e),
    }
}

fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

fn error_response(err: &CoreError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match err {
        CoreError::NotReady(progress) => (status, Json(progress)).into_response(),
        other => (status, Json(other.to_descriptor())).into_response(),
    }
}
