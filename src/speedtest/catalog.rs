use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::download::DownloadTest;
use super::ping::PingTest;
use super::upload::UploadTest;
use super::{Server, Speed};
use crate::error::BackendError;

pub const CATALOG_URL: &str = "https://www.speedtest.net/api/js/servers";
const CATALOG_LIMIT: usize = 10;

const DOWNLOAD_IMAGE_SIZE: u32 = 2000;
const UPLOAD_PAYLOAD_SIZE: usize = 1_000_000; // 1MB per POST

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_GRACE: Duration = Duration::from_secs(10);

/// Source of measurement servers and the measurements run against them.
#[async_trait]
pub trait SpeedtestBackend: Send + Sync {
    /// Candidate servers, closest first.
    async fn fetch_servers(&self) -> Result<Vec<Server>, BackendError>;

    /// Median round trip over `count` requests.
    async fn ping(&self, server: &Server, count: usize) -> Result<Duration, BackendError>;

    async fn measure_downstream(
        &self,
        server: &Server,
        duration: Duration,
    ) -> Result<Speed, BackendError>;

    async fn measure_upstream(
        &self,
        server: &Server,
        duration: Duration,
    ) -> Result<Speed, BackendError>;
}

/// Talks to speedtest.net style servers over plain HTTP.
pub struct HttpBackend {
    client: reqwest::Client,
    catalog_url: String,
    download: DownloadTest,
    upload: UploadTest,
}

impl HttpBackend {
    pub fn new(probe_duration: Duration, catalog_url: &str) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(probe_duration + REQUEST_GRACE)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            catalog_url: catalog_url.to_string(),
            download: DownloadTest::new(DOWNLOAD_IMAGE_SIZE),
            upload: UploadTest::new(UPLOAD_PAYLOAD_SIZE),
        })
    }
}

/// URL of a resource under the server's `/speedtest/` directory.
pub(super) fn server_url(server: &Server, resource: &str) -> String {
    format!("http://{}/speedtest/{}", server.host, resource)
}

#[async_trait]
impl SpeedtestBackend for HttpBackend {
    async fn fetch_servers(&self) -> Result<Vec<Server>, BackendError> {
        let limit = CATALOG_LIMIT.to_string();
        let servers: Vec<Server> = self
            .client
            .get(&self.catalog_url)
            .query(&[("engine", "js"), ("limit", limit.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(count = servers.len(), "fetched server catalog");
        Ok(servers)
    }

    async fn ping(&self, server: &Server, count: usize) -> Result<Duration, BackendError> {
        PingTest::new(count).run(&self.client, server).await
    }

    async fn measure_downstream(
        &self,
        server: &Server,
        duration: Duration,
    ) -> Result<Speed, BackendError> {
        self.download.run(&self.client, server, duration).await
    }

    async fn measure_upstream(
        &self,
        server: &Server,
        duration: Duration,
    ) -> Result<Speed, BackendError> {
        self.upload.run(&self.client, server, duration).await
    }
}
