use avatar_contracts::notifications::GENERIC_FAILURE_DESCRIPTION;

/// Failures of the avatar interaction.
#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    /// The generation endpoint answered with a non-2xx status.
    #[error("Server error: {status}")]
    Transport { status: u16 },

    /// The generation endpoint answered 2xx but reported an error in the body.
    #[error("{0}")]
    RemoteRejected(String),

    /// The generation endpoint answered 2xx with a body we cannot use.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Re-fetching or saving the generated image failed.
    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// The picked file is not image-typed.
    #[error("unsupported file: {0}")]
    UnsupportedFile(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl AvatarError {
    /// Text shown to the user in the failure notification.
    pub fn user_message(&self) -> String {
        let message = match self {
            Self::RemoteRejected(message) => message.trim().to_string(),
            Self::DownloadFailed(_) => String::new(),
            other => other.to_string(),
        };
        if message.is_empty() {
            GENERIC_FAILURE_DESCRIPTION.to_string()
        } else {
            message
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status } => Some(*status),
            Self::Network(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AvatarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_message_carries_status() {
        let err = AvatarError::Transport { status: 500 };
        assert_eq!(err.to_string(), "Server error: 500");
        assert_eq!(err.user_message(), "Server error: 500");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn remote_rejection_uses_body_message() {
        let err = AvatarError::RemoteRejected("bad image".into());
        assert_eq!(err.user_message(), "bad image");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn blank_messages_fall_back_to_generic_text() {
        assert_eq!(
            AvatarError::RemoteRejected("  ".into()).user_message(),
            GENERIC_FAILURE_DESCRIPTION
        );
        assert_eq!(
            AvatarError::DownloadFailed("status 404".into()).user_message(),
            GENERIC_FAILURE_DESCRIPTION
        );
    }
}
