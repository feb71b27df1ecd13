//! HTTP skin over the router core.
//!
//! A deliberately thin surface: two POST endpoints carrying base64
//! bodies in a multipart field `d`, two GET endpoints serving the
//! cached JSON documents, and a plaintext marker for everything else.
//! The router never answers 5xx for application-level problems — bad
//! input produces an empty 200 and a statistics bump.
//!
//! CORS is wide open (`Access-Control-Allow-Origin: *`): router
//! mailboxes hold only ciphertext and routing metadata, and browser
//! peers are legitimate clients.

use std::sync::Arc;

use axum::{
    Router as AxumRouter,
    extract::{DefaultBodyLimit, Multipart, Request, State},
    http::{Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::{RequestKind, Router, RouterError};

/// Largest accepted request body. Covers a full read response worth of
/// frames re-encoded as base64 with headroom.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Build the axum application for a router.
#[must_use]
pub fn app(router: Arc<Router>) -> AxumRouter {
    AxumRouter::new()
        .route("/api/w", post(write_handler))
        .route("/api/r", post(read_handler))
        .route("/api/debug", get(debug_handler))
        .route("/api/stat", get(stat_handler))
        .fallback(fallback_handler)
        .layer(middleware::from_fn(cors))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(router)
}

/// Bind `bind_address` and serve the router until `shutdown` resolves.
pub async fn serve(
    router: Arc<Router>,
    bind_address: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), RouterError> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    tracing::info!("router listening on {}", listener.local_addr()?);

    axum::serve(listener, app(router)).with_graceful_shutdown(shutdown).await?;
    Ok(())
}

/// `POST /api/w` — deposit a blob of concatenated frames.
async fn write_handler(State(router): State<Arc<Router>>, multipart: Multipart) -> Response {
    router.declare_request(RequestKind::Write);

    if let Some(blob) = decode_data_field(multipart).await {
        router.put_blob(&blob);
    }
    StatusCode::OK.into_response()
}

/// `POST /api/r` — long-poll read for one destination address.
async fn read_handler(State(router): State<Arc<Router>>, multipart: Multipart) -> Response {
    router.declare_request(RequestKind::Read);

    let Some(request) = decode_data_field(multipart).await else {
        return StatusCode::OK.into_response();
    };

    match router.read_long_poll(&request).await {
        Some(response) => BASE64.encode(response).into_response(),
        None => StatusCode::OK.into_response(),
    }
}

/// `GET /api/debug` — the full debug document.
async fn debug_handler(State(router): State<Arc<Router>>) -> Response {
    router.declare_request(RequestKind::Debug);
    json_response(router.debug_document())
}

/// `GET /api/stat` — the per-second rate block alone.
async fn stat_handler(State(router): State<Arc<Router>>) -> Response {
    router.declare_request(RequestKind::Stat);
    json_response(router.stat_document())
}

/// Any other URI: a short plaintext marker, counted as unknown.
async fn fallback_handler(State(router): State<Arc<Router>>) -> Response {
    router.declare_request(RequestKind::Unknown);
    "wrong request".into_response()
}

/// Extract and base64-decode the multipart field `d`.
///
/// Any shape mismatch (missing field, bad encoding) yields `None`; the
/// caller answers with an empty 200 per the silent-drop rule.
async fn decode_data_field(mut multipart: Multipart) -> Option<Vec<u8>> {
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("d") {
            let text = field.text().await.ok()?;
            return BASE64.decode(text.trim()).ok();
        }
    }
    None
}

fn json_response(body: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// Inject the open CORS header on every response and answer preflights
/// without touching the router.
async fn cors(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return (
            [
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                (header::ACCESS_CONTROL_ALLOW_METHODS, "POST"),
                (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
            ],
            StatusCode::OK,
        )
            .into_response();
    }

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        header::HeaderValue::from_static("*"),
    );
    response
}
