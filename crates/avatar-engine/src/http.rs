use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use url::Url;

use crate::config::ServiceConfig;
use crate::error::{AvatarError, Result};
use crate::file::SelectedFile;
use crate::service::{decode_data_url, AvatarService};

const BODY_LOG_MAX_CHARS: usize = 512;

#[derive(Debug, Deserialize)]
struct GenerateAvatarResponse {
    #[serde(rename = "avatarUrl")]
    avatar_url: Option<String>,
    error: Option<String>,
}

/// Maps a generation response to the avatar URL or the matching error.
///
/// Non-2xx statuses are transport failures whatever the body says.
pub fn interpret_generation_response(status: u16, body: &str) -> Result<String> {
    if !(200..300).contains(&status) {
        return Err(AvatarError::Transport { status });
    }
    let parsed: GenerateAvatarResponse = serde_json::from_str(body)
        .map_err(|err| AvatarError::InvalidResponse(format!("body is not JSON: {err}")))?;
    if let Some(message) = parsed.error.filter(|value| !value.trim().is_empty()) {
        return Err(AvatarError::RemoteRejected(message));
    }
    parsed
        .avatar_url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AvatarError::InvalidResponse("response has no avatarUrl".to_string()))
}

/// Talks to the avatar endpoint over HTTP.
pub struct HttpAvatarService {
    config: ServiceConfig,
    http: HttpClient,
}

impl HttpAvatarService {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let http = HttpClient::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    /// Resolves a possibly relative avatar URL against the API base.
    fn absolute_url(&self, raw: &str) -> Result<String> {
        if raw.starts_with("data:") {
            return Ok(raw.to_string());
        }
        match Url::parse(raw) {
            Ok(_) => Ok(raw.to_string()),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = Url::parse(&format!("{}/", self.config.api_base))?;
                Ok(base.join(raw)?.to_string())
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl AvatarService for HttpAvatarService {
    fn name(&self) -> &str {
        "http"
    }

    fn generate(&self, file: &SelectedFile) -> Result<String> {
        let endpoint = self.config.endpoint();
        let part = MultipartPart::bytes(file.bytes().to_vec())
            .file_name(file.name().to_string())
            .mime_str(file.mime_type())?;
        let form = MultipartForm::new().part("file", part);

        tracing::debug!(%endpoint, file = file.name(), bytes = file.size(), "sending avatar request");
        let response = self.http.post(&endpoint).multipart(form).send()?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            // Body is for the log only; a failed read must not hide the status.
            let body = response.text().unwrap_or_default();
            tracing::debug!(status, body = %truncate_text(&body, BODY_LOG_MAX_CHARS), "avatar request rejected");
            return Err(AvatarError::Transport { status });
        }
        let body = response.text()?;
        tracing::debug!(status, body = %truncate_text(&body, BODY_LOG_MAX_CHARS), "avatar response");

        let avatar_url = interpret_generation_response(status, &body)?;
        self.absolute_url(&avatar_url)
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(decoded) = decode_data_url(url) {
            return decoded.map(|(_, bytes)| bytes);
        }
        tracing::debug!(%url, "fetching generated avatar");
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|err| AvatarError::DownloadFailed(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AvatarError::DownloadFailed(format!(
                "GET {url} returned {}",
                status.as_u16()
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|err| AvatarError::DownloadFailed(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
