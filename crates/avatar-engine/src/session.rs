use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use avatar_contracts::notifications::{Notification, NotificationSink};

use crate::error::{AvatarError, Result};
use crate::file::SelectedFile;
use crate::objects::{HandleStats, ObjectStore, ObjectHandle};
use crate::service::AvatarService;

pub fn download_file_name(generation_count: u64) -> String {
    format!("cute-avatar-{generation_count}.png")
}

/// Where the current generation cycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayImage {
    Empty,
    Preview { url: String },
    Generated { url: String },
}

/// What a host should render right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub image: DisplayImage,
    pub busy: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub generations: u64,
    pub failures: u64,
    pub downloads: u64,
}

/// Result of applying a finished generation to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Succeeded { url: String },
    Failed { message: String },
    /// The ticket did not belong to the outstanding request.
    Ignored,
}

/// An outstanding generation request, detached from the session so it can be
/// executed elsewhere and handed back through [`AvatarSession::complete_submit`].
#[derive(Debug, Clone)]
pub struct PendingGeneration {
    ticket: u64,
    selection_epoch: u64,
    file: SelectedFile,
}

impl PendingGeneration {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn file(&self) -> &SelectedFile {
        &self.file
    }

    pub fn execute(&self, service: &dyn AvatarService) -> Result<String> {
        service.generate(&self.file)
    }
}

struct Selection {
    file: SelectedFile,
    preview: ObjectHandle,
}

/// View state of one avatar-generation widget.
///
/// All mutation goes through `&mut self`; hosts that run requests on another
/// thread use [`begin_submit`](Self::begin_submit) and
/// [`complete_submit`](Self::complete_submit).
pub struct AvatarSession {
    service: Arc<dyn AvatarService>,
    notifier: Arc<dyn NotificationSink>,
    objects: ObjectStore,
    selection: Option<Selection>,
    selection_epoch: u64,
    outstanding: Option<u64>,
    next_ticket: u64,
    phase: CyclePhase,
    generated_url: Option<String>,
    generation_count: u64,
    stats: SessionStats,
}

impl AvatarSession {
    pub fn new(service: Arc<dyn AvatarService>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            service,
            notifier,
            objects: ObjectStore::new(),
            selection: None,
            selection_epoch: 0,
            outstanding: None,
            next_ticket: 0,
            phase: CyclePhase::Idle,
            generated_url: None,
            generation_count: 0,
            stats: SessionStats::default(),
        }
    }

    pub fn service(&self) -> Arc<dyn AvatarService> {
        Arc::clone(&self.service)
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn select_file(&mut self, file: SelectedFile) {
        let preview = self.objects.create(file.bytes().to_vec());
        tracing::debug!(file = file.name(), preview = preview.url(), "file selected");
        // Replacing the selection drops the previous preview handle.
        self.selection = Some(Selection { file, preview });
        self.selection_epoch += 1;
        self.generated_url = None;
        if self.outstanding.is_none() {
            self.phase = CyclePhase::Idle;
        }
    }

    pub fn selected_file(&self) -> Option<&SelectedFile> {
        self.selection.as_ref().map(|selection| &selection.file)
    }

    pub fn preview_url(&self) -> Option<&str> {
        self.selection
            .as_ref()
            .map(|selection| selection.preview.url())
    }

    pub fn is_processing(&self) -> bool {
        self.outstanding.is_some()
    }

    pub fn can_submit(&self) -> bool {
        self.selection.is_some() && self.outstanding.is_none()
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn generated_url(&self) -> Option<&str> {
        self.generated_url.as_deref()
    }

    pub fn generation_count(&self) -> u64 {
        self.generation_count
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn handle_stats(&self) -> HandleStats {
        self.objects.stats()
    }

    /// Starts a generation cycle. `None` when no file is selected or a request
    /// is already outstanding.
    pub fn begin_submit(&mut self) -> Option<PendingGeneration> {
        if !self.can_submit() {
            return None;
        }
        let file = self.selection.as_ref()?.file.clone();
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.outstanding = Some(ticket);
        self.phase = CyclePhase::Submitting;
        tracing::debug!(ticket, file = file.name(), "generation started");
        Some(PendingGeneration {
            ticket,
            selection_epoch: self.selection_epoch,
            file,
        })
    }

    /// Applies the result of a generation started by `begin_submit`.
    pub fn complete_submit(
        &mut self,
        pending: PendingGeneration,
        result: Result<String>,
    ) -> GenerationOutcome {
        if self.outstanding != Some(pending.ticket) {
            tracing::warn!(ticket = pending.ticket, "ignoring result for unknown generation");
            return GenerationOutcome::Ignored;
        }
        self.outstanding = None;

        match result {
            Ok(url) => {
                if pending.selection_epoch != self.selection_epoch {
                    // Not cancelled on reselection; the late result still lands.
                    tracing::warn!(
                        ticket = pending.ticket,
                        file = pending.file.name(),
                        "generation finished after a newer file was selected"
                    );
                }
                self.generated_url = Some(url.clone());
                self.generation_count += 1;
                self.stats.generations += 1;
                self.phase = CyclePhase::Succeeded;
                tracing::info!(ticket = pending.ticket, %url, "avatar generated");
                self.notifier.notify(&Notification::avatar_ready());
                GenerationOutcome::Succeeded { url }
            }
            Err(err) => {
                let message = err.user_message();
                self.stats.failures += 1;
                self.phase = CyclePhase::Failed;
                tracing::warn!(
                    ticket = pending.ticket,
                    status = ?err.status(),
                    "avatar generation failed: {err}"
                );
                self.notifier
                    .notify(&Notification::generation_failed(&message));
                GenerationOutcome::Failed { message }
            }
        }
    }

    /// Runs a full generation cycle on the calling thread.
    pub fn submit(&mut self) -> Option<GenerationOutcome> {
        let pending = self.begin_submit()?;
        let result = pending.execute(self.service.as_ref());
        Some(self.complete_submit(pending, result))
    }

    /// Returns a terminal phase to `Idle`.
    pub fn acknowledge(&mut self) {
        if matches!(self.phase, CyclePhase::Succeeded | CyclePhase::Failed) {
            self.phase = CyclePhase::Idle;
        }
    }

    pub fn display(&self) -> DisplayState {
        let image = match (&self.generated_url, &self.selection) {
            (Some(url), _) => DisplayImage::Generated { url: url.clone() },
            (None, Some(selection)) => DisplayImage::Preview {
                url: selection.preview.url().to_string(),
            },
            (None, None) => DisplayImage::Empty,
        };
        DisplayState {
            image,
            busy: self.is_processing(),
        }
    }

    pub fn submit_label(&self) -> &'static str {
        if self.is_processing() {
            "Creating Magic..."
        } else if self.generation_count > 0 {
            "Create Another!"
        } else {
            "Create Cute Avatar"
        }
    }

    pub fn file_label(&self) -> &str {
        self.selected_file()
            .map(SelectedFile::name)
            .unwrap_or("No file selected")
    }

    pub fn download_available(&self) -> bool {
        self.generated_url.is_some()
    }

    /// Saves the generated avatar into `dest_dir`.
    ///
    /// `None` without touching the network when nothing has been generated.
    /// Failures are reported to the notifier and leave the view state alone.
    pub fn download(&mut self, dest_dir: &Path) -> Option<Result<PathBuf>> {
        let url = self.generated_url.clone()?;
        let target = dest_dir.join(download_file_name(self.generation_count));
        let saved = self.save_generated(&url, &target);
        match &saved {
            Ok(path) => {
                self.stats.downloads += 1;
                tracing::info!(path = %path.display(), "avatar downloaded");
                self.notifier.notify(&Notification::avatar_downloaded());
            }
            Err(err) => {
                tracing::warn!(%url, "avatar download failed: {err}");
                self.notifier.notify(&Notification::download_failed());
            }
        }
        Some(saved)
    }

    fn save_generated(&self, url: &str, target: &Path) -> Result<PathBuf> {
        let bytes = self.service.fetch(url).map_err(into_download_error)?;
        let object = self.objects.create(bytes);
        let written = write_object(&object, target);
        object.release();
        written.map_err(into_download_error)?;
        Ok(target.to_path_buf())
    }

    /// Drops the selection and returns the final counters.
    pub fn teardown(mut self) -> (SessionStats, HandleStats) {
        self.selection = None;
        (self.stats, self.objects.stats())
    }
}

fn write_object(object: &ObjectHandle, target: &Path) -> Result<()> {
    let bytes = object
        .bytes()
        .ok_or_else(|| AvatarError::DownloadFailed("object url already revoked".to_string()))?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(target, &bytes)?;
    Ok(())
}

fn into_download_error(err: AvatarError) -> AvatarError {
    match err {
        AvatarError::DownloadFailed(_) => err,
        other => AvatarError::DownloadFailed(other.to_string()),
    }
}
