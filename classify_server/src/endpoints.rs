//! Endpoints of HTTP server.
//!
use std::{io::Cursor, sync::Arc};

use anyhow::Result;
use axum::{
    body::StreamBody,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use bytes::Bytes;
use common::protocol::{PageState, StartReply};
use futures::StreamExt;
use image::{codecs::jpeg::JpegEncoder, ColorType, RgbImage};
use tokio_stream::wrappers::WatchStream;

use crate::controller::{DemoController, InitError, StartOutcome};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Build the router serving the demo page.
pub fn router(controller: Arc<DemoController>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthcheck", get(healthcheck))
        .route("/start", post(start))
        .route("/labels", get(labels))
        .route("/webcam", get(webcam_stream))
        .layer(Extension(controller))
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// The Start action.
pub async fn start(
    Extension(controller): Extension<Arc<DemoController>>,
) -> (StatusCode, Json<StartReply>) {
    match controller.start().await {
        Ok(StartOutcome::Started { class_count }) => {
            (StatusCode::OK, Json(StartReply::started(class_count)))
        }
        Ok(StartOutcome::AlreadyRunning { class_count }) => {
            (StatusCode::OK, Json(StartReply::already_running(class_count)))
        }
        Err(err @ InitError::ShuttingDown) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(StartReply::failed(format!("Error: {err}"))),
        ),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(StartReply::failed(format!("Error: {err}"))),
        ),
    }
}

/// Current content of the label slots.
pub async fn labels(Extension(controller): Extension<Arc<DemoController>>) -> Json<PageState> {
    Json(controller.page().state())
}

/// Live MJPEG stream of the webcam surface.
pub async fn webcam_stream(Extension(controller): Extension<Arc<DemoController>>) -> Response {
    let Some(canvas) = controller.page().canvas() else {
        return (StatusCode::NOT_FOUND, "webcam not started").into_response();
    };
    log::info!("Webcam stream requested");

    let stream = WatchStream::new(canvas.subscribe()).filter_map(|frame| async move {
        match encode_jpeg(&frame) {
            Ok(buf) => Some(Ok::<_, std::io::Error>(as_jpeg_stream_item(&buf))),
            Err(err) => {
                log::warn!("Failed to encode webcam frame: {err}");
                None
            }
        }
    });

    // Set body and headers for multipart streaming
    let body = StreamBody::new(stream);
    let headers = [(
        header::CONTENT_TYPE,
        "multipart/x-mixed-replace; boundary=frame",
    )];

    (headers, body).into_response()
}

/// Wrap a JPEG image as one part of a `multipart/x-mixed-replace` stream.
pub fn as_jpeg_stream_item(jpeg: &[u8]) -> Bytes {
    Bytes::copy_from_slice(
        &[
            "--frame\r\nContent-Type: image/jpeg\r\n\r\n".as_bytes(),
            jpeg,
            "\r\n\r\n".as_bytes(),
        ]
        .concat(),
    )
}

fn encode_jpeg(frame: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, 70).encode(
        frame.as_raw(),
        frame.width(),
        frame.height(),
        ColorType::Rgb8,
    )?;

    Ok(buf.into_inner())
}
