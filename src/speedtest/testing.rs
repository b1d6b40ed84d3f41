//! In-memory backend and sink used by unit tests, plus a loopback HTTP
//! responder for exercising the real measurement code.

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cadence::{MetricError, MetricResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::{Server, Speed, SpeedtestBackend};
use crate::error::BackendError;
use crate::reporter::MetricsSink;

/// Call counter with a queue of scripted failures, consumed one per call.
#[derive(Default)]
pub struct StubStep {
    calls: AtomicUsize,
    failures: Mutex<Vec<&'static str>>,
}

impl StubStep {
    fn call(&self) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut failures = self.failures.lock().unwrap();
        if failures.is_empty() {
            Ok(())
        } else {
            let message = failures.remove(0);
            Err(BackendError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                message,
            )))
        }
    }

    fn fail_next(&self, message: &'static str) {
        self.failures.lock().unwrap().push(message);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub struct StubBackend {
    pub servers: Vec<Server>,
    pub unreachable: HashSet<String>,
    pub download_bps: u64,
    pub upload_bps: u64,
    pub latency: Duration,
    pub download: StubStep,
    pub upload: StubStep,
    pub ping: StubStep,
    pub pinged: Mutex<Vec<(String, usize)>>,
}

impl StubBackend {
    /// 100 Mbps down, 20 Mbps up, 15 ms ping.
    pub fn healthy() -> Self {
        Self {
            servers: Vec::new(),
            unreachable: HashSet::new(),
            download_bps: 100_000_000,
            upload_bps: 20_000_000,
            latency: Duration::from_millis(15),
            download: StubStep::default(),
            upload: StubStep::default(),
            ping: StubStep::default(),
            pinged: Mutex::new(Vec::new()),
        }
    }

    pub fn with_servers(mut self, servers: Vec<Server>) -> Self {
        self.servers = servers;
        self
    }

    pub fn with_unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }

    pub fn fail_download(self, message: &'static str) -> Self {
        self.download.fail_next(message);
        self
    }

    pub fn fail_upload(self, message: &'static str) -> Self {
        self.upload.fail_next(message);
        self
    }

    pub fn fail_ping(self, message: &'static str) -> Self {
        self.ping.fail_next(message);
        self
    }

    pub fn pinged_hosts(&self) -> Vec<String> {
        self.pinged
            .lock()
            .unwrap()
            .iter()
            .map(|(host, _)| host.clone())
            .collect()
    }
}

#[async_trait]
impl SpeedtestBackend for StubBackend {
    async fn fetch_servers(&self) -> Result<Vec<Server>, BackendError> {
        Ok(self.servers.clone())
    }

    async fn ping(&self, server: &Server, count: usize) -> Result<Duration, BackendError> {
        self.pinged
            .lock()
            .unwrap()
            .push((server.host.clone(), count));
        self.ping.call()?;
        if self.unreachable.contains(&server.host) {
            return Err(BackendError::InvalidResponse(format!(
                "{} unreachable",
                server.host
            )));
        }
        Ok(self.latency)
    }

    async fn measure_downstream(
        &self,
        _server: &Server,
        _duration: Duration,
    ) -> Result<Speed, BackendError> {
        self.download.call()?;
        Ok(Speed(self.download_bps))
    }

    async fn measure_upstream(
        &self,
        _server: &Server,
        _duration: Duration,
    ) -> Result<Speed, BackendError> {
        self.upload.call()?;
        Ok(Speed(self.upload_bps))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Emitted {
    pub kind: &'static str,
    pub name: String,
    pub value: f64,
    pub tags: Vec<String>,
}

/// Sink that records every emission and can reject one metric name.
#[derive(Default)]
pub struct RecordingSink {
    pub emitted: Mutex<Vec<Emitted>>,
    pub attempts: AtomicUsize,
    pub reject: Option<&'static str>,
}

impl RecordingSink {
    pub fn rejecting(name: &'static str) -> Self {
        Self {
            reject: Some(name),
            ..Self::default()
        }
    }

    pub fn emitted(&self) -> Vec<Emitted> {
        self.emitted.lock().unwrap().clone()
    }

    fn record(&self, kind: &'static str, name: &str, value: f64, tags: &[String]) -> MetricResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.reject == Some(name) {
            return Err(MetricError::from(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "statsd unreachable",
            )));
        }
        self.emitted.lock().unwrap().push(Emitted {
            kind,
            name: name.to_string(),
            value,
            tags: tags.to_vec(),
        });
        Ok(())
    }
}

impl MetricsSink for RecordingSink {
    fn histogram(&self, name: &str, value: f64, tags: &[String]) -> MetricResult<()> {
        self.record("histogram", name, value, tags)
    }

    fn count(&self, name: &str, value: i64, tags: &[String]) -> MetricResult<()> {
        self.record("count", name, value as f64, tags)
    }
}

/// Serves one response per connection on a loopback port. `route` maps the
/// request path (query stripped) to a status code and body.
pub async fn serve_http<F>(route: F) -> SocketAddr
where
    F: Fn(&str) -> (u16, Vec<u8>) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let route = Arc::new(route);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let route = Arc::clone(&route);
            tokio::spawn(async move {
                let _ = respond(stream, route.as_ref()).await;
            });
        }
    });

    addr
}

async fn respond<F>(mut stream: TcpStream, route: &F) -> io::Result<()>
where
    F: Fn(&str) -> (u16, Vec<u8>),
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 16 * 1024];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let target = head.split_whitespace().nth(1).unwrap_or("/");
    let path = target.split('?').next().unwrap_or(target);
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    // Drain the request body before answering.
    let mut remaining = content_length.saturating_sub(buf.len() - header_end);
    while remaining > 0 {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        remaining = remaining.saturating_sub(n);
    }

    let (status, body) = route(path);
    let reason = if status < 400 { "OK" } else { "Error" };
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&body).await?;
    stream.shutdown().await
}
