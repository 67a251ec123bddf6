// Ties input acquisition, the analysis worker and the UI state together

use crate::camera::{CameraManager, CameraStream, DeviceOpener, NokhwaOpener};
use crate::controller::{AnalysisEvent, AnalysisWorker};
use crate::error::FaceScanError;
use crate::input::acquire_from_file;
use crate::models::{Frame, ImagePayload};
use crate::state::{AppState, ModelStatus, Origin};
use std::path::Path;
use tracing::{info, warn};

/// One user session: at most one camera stream, one displayed image and one
/// analysis that can still reach the display
pub struct ScanSession<O: DeviceOpener = NokhwaOpener> {
    state: AppState,
    worker: AnalysisWorker,
    cameras: CameraManager<O>,
    stream: Option<CameraStream<O::Device>>,
    image: Option<ImagePayload>,
    image_version: u64,
}

impl<O: DeviceOpener> ScanSession<O> {
    pub fn new(worker: AnalysisWorker, cameras: CameraManager<O>) -> Self {
        Self {
            state: AppState::default(),
            worker,
            cameras,
            stream: None,
            image: None,
            image_version: 0,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Image currently on display
    pub fn image(&self) -> Option<&ImagePayload> {
        self.image.as_ref()
    }

    /// Bumped whenever the displayed image is replaced
    pub fn image_version(&self) -> u64 {
        self.image_version
    }

    pub fn camera_enabled(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_live())
    }

    /// Loads a user-selected file and submits it
    pub fn upload(&mut self, path: &Path) {
        if self.state.is_loading_from(Origin::Upload) {
            return;
        }
        self.release_camera();

        match acquire_from_file(path) {
            Ok(payload) => self.submit(payload, Origin::Upload),
            Err(e) => {
                warn!("Upload of {:?} failed: {}", path, e);
                self.state.report(&e);
            }
        }
    }

    /// Opens the camera for live preview. A failure leaves the result on screen
    /// and any analysis in flight running.
    pub fn start_camera(&mut self) {
        self.release_camera();

        match self.cameras.acquire() {
            Ok(stream) => {
                self.stream = Some(stream);
                // an upload in flight keeps its image for the result
                if !self.state.is_loading_from(Origin::Upload) {
                    self.set_image(None);
                }
                self.state.dismiss();
            }
            Err(e) => {
                warn!("Camera unavailable: {}", e);
                self.state.report(&e);
            }
        }
    }

    /// Captures the current camera frame, submits it and releases the camera
    pub fn capture_and_analyze(&mut self) {
        if self.state.is_loading_from(Origin::Camera) {
            return;
        }

        let captured = match self.stream.as_mut() {
            Some(stream) => stream.capture_frame(),
            None => Err(FaceScanError::CameraNotInitialized),
        };
        self.release_camera();

        match captured {
            Ok(payload) => self.submit(payload, Origin::Camera),
            Err(e) => {
                warn!("Capture failed: {}", e);
                self.state.report(&e);
            }
        }
    }

    /// Latest camera frame while previewing
    pub fn preview_frame(&mut self) -> Option<Frame> {
        if self.image.is_some() {
            return None;
        }
        self.stream.as_mut()?.preview_frame().ok()
    }

    pub fn release_camera(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
        }
    }

    /// Applies every pending worker event. Returns whether anything changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Some(event) = self.worker.try_next() {
            self.apply(event);
            changed = true;
        }
        changed
    }

    /// Blocks until one worker event has been applied.
    /// Returns false once the worker has stopped.
    pub fn wait_for_update(&mut self) -> bool {
        match self.worker.wait_next() {
            Some(event) => {
                self.apply(event);
                true
            }
            None => false,
        }
    }

    fn submit(&mut self, payload: ImagePayload, origin: Origin) {
        let Some(id) = self.state.begin(origin) else {
            return;
        };
        self.set_image(Some(payload.clone()));
        if let Err(e) = self.worker.submit(id, payload) {
            warn!("Could not submit request {}: {}", id, e);
            self.state.finish(id, Err(e));
        }
    }

    fn set_image(&mut self, image: Option<ImagePayload>) {
        self.image = image;
        self.image_version += 1;
    }

    fn apply(&mut self, event: AnalysisEvent) {
        match event {
            AnalysisEvent::ModelsReady => {
                info!("Models ready");
                self.state.set_models(ModelStatus::Ready);
            }
            AnalysisEvent::ModelsFailed(message) => {
                self.state.set_models(ModelStatus::Failed(message));
            }
            AnalysisEvent::Finished { id, result } => {
                // a late successful load after a failed preload
                if result.is_ok() {
                    self.state.set_models(ModelStatus::Ready);
                }
                self.state.finish(id, result);
            }
        }
    }
}
