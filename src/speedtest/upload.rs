use bytes::Bytes;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

use super::catalog::server_url;
use super::{Server, Speed};
use crate::error::BackendError;

const UPLOAD_RESOURCE: &str = "upload.php";

/// Posts a random payload repeatedly until the probe duration elapses.
pub struct UploadTest {
    data: Bytes,
}

impl UploadTest {
    pub fn new(payload_size: usize) -> Self {
        let mut rng = rand::rngs::StdRng::from_entropy();
        let data: Vec<u8> = (0..payload_size).map(|_| rng.gen()).collect();
        Self {
            data: Bytes::from(data),
        }
    }

    pub async fn run(
        &self,
        client: &reqwest::Client,
        server: &Server,
        duration: Duration,
    ) -> Result<Speed, BackendError> {
        let url = server_url(server, UPLOAD_RESOURCE);
        let start = Instant::now();
        let deadline = start + duration;
        let mut uploaded: u64 = 0;

        // `Bytes` clones share the buffer.
        while Instant::now() < deadline {
            client
                .post(&url)
                .body(self.data.clone())
                .send()
                .await?
                .error_for_status()?;
            uploaded += self.data.len() as u64;
        }

        Ok(Speed::from_transfer(uploaded, start.elapsed()))
    }
}
