use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::config::ServiceConfig;
use crate::dryrun::DryrunAvatarService;
use crate::error::{AvatarError, Result};
use crate::file::SelectedFile;
use crate::http::HttpAvatarService;

/// The remote side of the interaction: turns a photo into an avatar URL and
/// fetches the bytes behind such a URL.
pub trait AvatarService: Send + Sync {
    fn name(&self) -> &str;

    /// Submits `file` and returns the URL of the generated avatar.
    fn generate(&self, file: &SelectedFile) -> Result<String>;

    /// Fetches the image bytes behind a URL previously returned by `generate`.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

#[derive(Default)]
pub struct AvatarServiceRegistry {
    services: BTreeMap<String, Arc<dyn AvatarService>>,
}

impl AvatarServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: AvatarService + 'static>(&mut self, service: S) {
        self.services
            .insert(service.name().to_string(), Arc::new(service));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AvatarService>> {
        self.services.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }
}

pub fn default_service_registry(config: &ServiceConfig) -> Result<AvatarServiceRegistry> {
    let mut services = AvatarServiceRegistry::new();
    services.register(HttpAvatarService::new(config.clone())?);
    services.register(DryrunAvatarService::new());
    Ok(services)
}

/// Decodes a base64 `data:` URL into its MIME type and bytes.
///
/// Returns `None` when `url` is not a `data:` URL at all.
pub fn decode_data_url(url: &str) -> Option<Result<(String, Vec<u8>)>> {
    let rest = url.trim().strip_prefix("data:")?;
    Some(decode_data_url_body(rest))
}

fn decode_data_url_body(rest: &str) -> Result<(String, Vec<u8>)> {
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| AvatarError::DownloadFailed("data URL has no payload".to_string()))?;
    let Some(mime) = header.strip_suffix(";base64") else {
        return Err(AvatarError::DownloadFailed(
            "only base64 data URLs are supported".to_string(),
        ));
    };
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|err| AvatarError::DownloadFailed(format!("data URL decode failed: {err}")))?;
    let mime = if mime.is_empty() {
        "application/octet-stream"
    } else {
        mime
    };
    Ok((mime.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl AvatarService for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn generate(&self, _file: &SelectedFile) -> Result<String> {
            Ok(format!("https://x/{}.png", self.0))
        }

        fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn registry_lists_names_sorted() {
        let mut registry = AvatarServiceRegistry::new();
        registry.register(Named("zeta"));
        registry.register(Named("alpha"));
        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn default_registry_has_http_and_dryrun() -> anyhow::Result<()> {
        let registry = default_service_registry(&ServiceConfig::default())?;
        assert_eq!(registry.names(), vec!["dryrun", "http"]);
        Ok(())
    }

    #[test]
    fn decodes_base64_data_urls() -> anyhow::Result<()> {
        let url = format!("data:image/png;base64,{}", BASE64.encode(b"abc"));
        let (mime, bytes) = decode_data_url(&url).transpose()?.unwrap_or_default();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"abc");
        Ok(())
    }

    #[test]
    fn rejects_non_base64_data_urls() {
        assert!(decode_data_url("https://x/a.png").is_none());
        assert!(matches!(
            decode_data_url("data:text/plain,hello"),
            Some(Err(AvatarError::DownloadFailed(_)))
        ));
        assert!(matches!(
            decode_data_url("data:image/png;base64,!!!"),
            Some(Err(AvatarError::DownloadFailed(_)))
        ));
    }
}
