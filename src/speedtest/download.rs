use futures::StreamExt;
use std::time::{Duration, Instant};

use super::catalog::server_url;
use super::{Server, Speed};
use crate::error::BackendError;

/// Streams random images from the server until the probe duration elapses.
pub struct DownloadTest {
    image_size: u32,
}

impl DownloadTest {
    pub fn new(image_size: u32) -> Self {
        Self { image_size }
    }

    fn url(&self, server: &Server) -> String {
        server_url(
            server,
            &format!("random{}x{}.jpg", self.image_size, self.image_size),
        )
    }

    pub async fn run(
        &self,
        client: &reqwest::Client,
        server: &Server,
        duration: Duration,
    ) -> Result<Speed, BackendError> {
        let url = self.url(server);
        let start = Instant::now();
        let deadline = start + duration;
        let mut downloaded: u64 = 0;

        'requests: while Instant::now() < deadline {
            // Cache buster so intermediaries can't serve the image locally.
            let nonce = rand::random::<u32>().to_string();
            let response = client
                .get(&url)
                .query(&[("x", nonce.as_str())])
                .send()
                .await?
                .error_for_status()?;
            let mut stream = response.bytes_stream();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                downloaded += chunk.len() as u64;

                if Instant::now() >= deadline {
                    break 'requests;
                }
            }
        }

        if downloaded == 0 {
            return Err(BackendError::InvalidResponse(
                "download returned no data".to_string(),
            ));
        }

        Ok(Speed::from_transfer(downloaded, start.elapsed()))
    }
}
