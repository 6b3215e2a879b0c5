use std::io::Cursor;
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{Rgb, RgbImage};
use sha2::{Digest, Sha256};

use crate::error::{AvatarError, Result};
use crate::file::SelectedFile;
use crate::service::{decode_data_url, AvatarService};

const DEFAULT_SIZE: u32 = 256;

/// Offline stand-in for the avatar endpoint.
///
/// Produces a solid-colour PNG whose colour is derived from the uploaded
/// bytes, delivered as a `data:` URL. Latency and a failure rate can be
/// injected to mimic the mock backend (2 s, 10% HTTP 500).
#[derive(Debug, Clone)]
pub struct DryrunAvatarService {
    latency: Duration,
    failure_rate: f64,
    size: u32,
}

impl Default for DryrunAvatarService {
    fn default() -> Self {
        Self::new()
    }
}

impl DryrunAvatarService {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            failure_rate: 0.0,
            size: DEFAULT_SIZE,
        }
    }

    pub fn simulated_backend() -> Self {
        Self::new()
            .with_latency(Duration::from_secs(2))
            .with_failure_rate(0.1)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = if rate.is_finite() {
            rate.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size.max(1);
        self
    }

    fn render(&self, file: &SelectedFile) -> Result<Vec<u8>> {
        let (r, g, b) = color_from_bytes(file.bytes());
        let image = RgbImage::from_pixel(self.size, self.size, Rgb([r, g, b]));
        let mut encoded = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
            .map_err(|err| AvatarError::Io(std::io::Error::other(err.to_string())))?;
        Ok(encoded)
    }
}

impl AvatarService for DryrunAvatarService {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, file: &SelectedFile) -> Result<String> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        if self.failure_rate > 0.0 && rand::random::<f64>() < self.failure_rate {
            tracing::debug!(file = file.name(), "dryrun service simulating a server error");
            return Err(AvatarError::Transport { status: 500 });
        }
        let png = self.render(file)?;
        Ok(format!("data:image/png;base64,{}", BASE64.encode(png)))
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        match decode_data_url(url) {
            Some(decoded) => decoded.map(|(_, bytes)| bytes),
            None => Err(AvatarError::DownloadFailed(format!(
                "dryrun service cannot fetch {url}"
            ))),
        }
    }
}

fn color_from_bytes(bytes: &[u8]) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
