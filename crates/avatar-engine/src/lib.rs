//! Headless core of the cute-avatar interaction: pick an image, submit it to
//! an avatar-generation service, present the result and save it locally.

mod config;
mod dryrun;
mod error;
mod file;
mod http;
mod objects;
mod service;
mod session;

pub use config::{ServiceConfig, DEFAULT_API_BASE, DEFAULT_TIMEOUT_SECS, GENERATE_AVATAR_PATH};
pub use dryrun::DryrunAvatarService;
pub use error::{AvatarError, Result};
pub use file::{mime_for_path, SelectedFile, ACCEPTED_EXTENSIONS};
pub use http::{interpret_generation_response, HttpAvatarService};
pub use objects::{HandleStats, ObjectHandle, ObjectStore};
pub use service::{
    decode_data_url, default_service_registry, AvatarService, AvatarServiceRegistry,
};
pub use session::{
    download_file_name, AvatarSession, CyclePhase, DisplayImage, DisplayState, GenerationOutcome,
    PendingGeneration, SessionStats,
};
