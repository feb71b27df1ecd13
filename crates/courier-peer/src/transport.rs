//! Router transport abstraction and its two implementations.
//!
//! The peer engine needs exactly two verbs against a router: deposit a
//! blob of frames (fire-and-forget) and long-poll a read request. The
//! HTTP implementation talks to a real router process; the memory
//! implementation holds router values in-process, which gives tests a
//! full fabric with no sockets and makes router "restarts" a matter of
//! swapping the value behind an endpoint name.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use courier_router::Router;

use crate::error::TransportError;

/// Byte transport to a router endpoint.
#[async_trait]
pub trait RouterTransport: Send + Sync {
    /// Deposit a blob of concatenated frames. Fire-and-forget: errors
    /// are reported for logging but carry no delivery guarantee either
    /// way.
    async fn write(&self, endpoint: &str, blob: &[u8]) -> Result<(), TransportError>;

    /// Long-poll read. Blocks until the router answers or its long-poll
    /// deadline passes; the body is `last_id (u64 LE) || frames`.
    async fn read(&self, endpoint: &str, request: &[u8]) -> Result<Vec<u8>, TransportError>;
}

/// HTTP transport: `POST /api/w` and `POST /api/r` with the base64
/// multipart body convention.
pub struct HttpTransport {
    write_client: reqwest::Client,
    read_client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with a short write timeout and a read timeout
    /// that outlasts the router's long poll.
    pub fn new() -> Result<Self, TransportError> {
        let write_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        let read_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(12))
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self { write_client, read_client })
    }

    async fn post(
        &self,
        client: &reqwest::Client,
        endpoint: &str,
        api: &str,
        body: &[u8],
    ) -> Result<Vec<u8>, TransportError> {
        let base = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("http://{endpoint}")
        };

        let form = reqwest::multipart::Form::new().text("d", BASE64.encode(body));

        let response = client
            .post(format!("{base}/api/{api}"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let text = response.text().await.map_err(|e| TransportError::Http(e.to_string()))?;
        BASE64
            .decode(text.trim())
            .map_err(|e| TransportError::Http(format!("bad response encoding: {e}")))
    }
}

#[async_trait]
impl RouterTransport for HttpTransport {
    async fn write(&self, endpoint: &str, blob: &[u8]) -> Result<(), TransportError> {
        // The write response body is ignored by design.
        let base = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("http://{endpoint}")
        };
        let form = reqwest::multipart::Form::new().text("d", BASE64.encode(blob));
        self.write_client
            .post(format!("{base}/api/w"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(())
    }

    async fn read(&self, endpoint: &str, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.post(&self.read_client, endpoint, "r", request).await
    }
}

/// In-process transport over shared [`Router`] values.
///
/// Endpoints are plain names. Registering a new router under an
/// existing name simulates a router restart: the id counter regresses
/// and all mailboxes vanish, exactly what a real restart does.
#[derive(Default)]
pub struct MemoryTransport {
    routers: Mutex<HashMap<String, Arc<Router>>>,
}

impl MemoryTransport {
    /// Empty transport; register routers before use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `endpoint` to a router, replacing any previous binding.
    pub fn register(&self, endpoint: impl Into<String>, router: Arc<Router>) {
        if let Ok(mut routers) = self.routers.lock() {
            routers.insert(endpoint.into(), router);
        }
    }

    /// The router currently behind `endpoint`.
    #[must_use]
    pub fn router(&self, endpoint: &str) -> Option<Arc<Router>> {
        self.routers.lock().ok().and_then(|routers| routers.get(endpoint).cloned())
    }
}

#[async_trait]
impl RouterTransport for MemoryTransport {
    async fn write(&self, endpoint: &str, blob: &[u8]) -> Result<(), TransportError> {
        let router = self
            .router(endpoint)
            .ok_or_else(|| TransportError::UnknownEndpoint(endpoint.to_string()))?;
        router.put_blob(blob);
        Ok(())
    }

    async fn read(&self, endpoint: &str, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        let router = self
            .router(endpoint)
            .ok_or_else(|| TransportError::UnknownEndpoint(endpoint.to_string()))?;
        Ok(router.read_long_poll(request).await.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use courier_proto::{FrameType, ReadRequest, read_response, split_into_frames};
    use courier_router::RouterConfig;

    use super::*;

    fn quick_router() -> Arc<Router> {
        Arc::new(Router::new(RouterConfig {
            long_poll_timeout: Duration::from_millis(50),
            ..RouterConfig::default()
        }))
    }

    #[tokio::test]
    async fn memory_transport_round_trip() {
        let transport = MemoryTransport::new();
        transport.register("r1", quick_router());

        let dst = [7u8; 32];
        let frame = &split_into_frames(FrameType::CallRequest, &[1; 32], &dst, 1, 0, "t", b"hi")[0];
        transport.write("r1", &frame.to_vec()).await.unwrap();

        let request = ReadRequest { after_id: 0, max_bytes: 1 << 20, src_address: dst }.encode();
        let body = transport.read("r1", &request).await.unwrap();
        let (last_id, frames) = read_response::decode(&body).unwrap();
        assert_eq!(last_id, 1);
        assert!(!frames.is_empty());
    }

    #[tokio::test]
    async fn unknown_endpoint_errors() {
        let transport = MemoryTransport::new();
        assert!(matches!(
            transport.write("nowhere", b"").await,
            Err(TransportError::UnknownEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn reregistering_simulates_restart() {
        let transport = MemoryTransport::new();
        transport.register("r1", quick_router());
        let first = transport.router("r1").unwrap();

        transport.register("r1", quick_router());
        let second = transport.router("r1").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
