//! Mock Klipper peer bound to a Unix socket in a temporary directory.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

use klipperstat_client::{Orchestrator, RetryPolicy, SessionOptions};
use klipperstat_core::Endpoint;
use klipperstat_discovery::StaticResolver;

pub struct MockPeer {
    _dir: TempDir,
    pub path: PathBuf,
    listener: UnixListener,
}

impl MockPeer {
    pub fn bind() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("klippy.sock");
        let listener = UnixListener::bind(&path).unwrap();
        Self {
            _dir: dir,
            path,
            listener,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(&self.path)
    }

    pub async fn accept(&self) -> PeerConn {
        let (stream, _) = self.listener.accept().await.unwrap();
        PeerConn {
            stream,
            buffer: Vec::new(),
        }
    }
}

pub struct PeerConn {
    stream: UnixStream,
    buffer: Vec<u8>,
}

impl PeerConn {
    /// Reads one ETX-terminated request.
    pub async fn read_request(&mut self) -> Value {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == 0x03) {
                let body: Vec<u8> = self.buffer.drain(..=pos).collect();
                return serde_json::from_slice(&body[..body.len() - 1]).unwrap();
            }
            let mut chunk = [0u8; 1024];
            let n = self.stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending a full request");
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    pub async fn send(&mut self, frame: Value) {
        let mut bytes = serde_json::to_vec(&frame).unwrap();
        bytes.push(0x03);
        self.send_raw(&bytes).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Writes `bytes` a few at a time, yielding between writes.
    pub async fn send_chunked(&mut self, bytes: &[u8], chunk: usize) {
        for piece in bytes.chunks(chunk) {
            self.stream.write_all(piece).await.unwrap();
            self.stream.flush().await.unwrap();
            tokio::task::yield_now().await;
        }
    }

    /// Answers `objects/list` with the given object names.
    pub async fn answer_list(&mut self, objects: &[&str]) -> Value {
        let request = self.read_request().await;
        assert_eq!(request["method"], "objects/list");
        assert_eq!(request["id"], 123);
        self.send(serde_json::json!({"id": 123, "result": {"objects": objects}}))
            .await;
        request
    }
}

/// Orchestrator against a fixed endpoint with short delays.
pub fn orchestrator(endpoint: Endpoint) -> Orchestrator {
    Orchestrator::new(Arc::new(StaticResolver::new(endpoint)))
        .with_session_options(
            SessionOptions::default()
                .with_attempt_delay(Duration::from_millis(10))
                .with_read_timeout(Some(Duration::from_secs(5))),
        )
        .with_retry_policy(RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(10),
        })
}
