//! End-to-end flows through a scan session with a scripted model stack and camera.

use face_scan::camera::{CameraManager, DeviceOpener, VideoDevice};
use face_scan::controller::AnalysisWorker;
use face_scan::detector::FaceAnalysisBackend;
use face_scan::error::{FaceScanError, Result};
use face_scan::input::{decode_payload, encode_frame};
use face_scan::models::{
    DetectionResult, Expression, ExpressionDistribution, FaceBox, Frame, ImagePayload,
    ImageSource, Landmark,
};
use face_scan::scoring::MentalAbility;
use face_scan::session::ScanSession;
use face_scan::state::ModelStatus;
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc;

struct ScriptedBackend {
    faces: Vec<DetectionResult>,
    /// Detection waits for one message when set
    gate: Option<mpsc::Receiver<()>>,
}

impl FaceAnalysisBackend for ScriptedBackend {
    fn load(&mut self) -> Result<()> {
        Ok(())
    }

    fn decode(&self, payload: &ImagePayload) -> Result<Frame> {
        decode_payload(payload)
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<DetectionResult>> {
        if let Some(gate) = &self.gate {
            gate.recv().ok();
        }
        Ok(self.faces.clone())
    }
}

struct FakeWebcam {
    streaming: Rc<Cell<bool>>,
}

impl VideoDevice for FakeWebcam {
    fn open_stream(&mut self) -> Result<()> {
        self.streaming.set(true);
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.streaming.get()
    }

    fn frame(&mut self) -> Result<Frame> {
        Ok(Frame::new(vec![90; 32 * 24 * 3], 32, 24))
    }

    fn stop_stream(&mut self) -> Result<()> {
        self.streaming.set(false);
        Ok(())
    }
}

struct FakeOpener {
    streaming: Rc<Cell<bool>>,
    denied: bool,
}

impl DeviceOpener for FakeOpener {
    type Device = FakeWebcam;

    fn open(&self, _index: u32) -> Result<FakeWebcam> {
        if self.denied {
            return Err(FaceScanError::CameraAccessDenied);
        }
        Ok(FakeWebcam {
            streaming: self.streaming.clone(),
        })
    }
}

fn happy_face() -> DetectionResult {
    let values = [0.0, 0.0, 0.0, 0.7, 0.2, 0.1, 0.0];
    DetectionResult {
        face: FaceBox {
            x: 4,
            y: 4,
            width: 16,
            height: 16,
        },
        expressions: ExpressionDistribution::from_pairs(Expression::ALL.into_iter().zip(values)),
        landmarks: (0..68).map(|i| Landmark::new(i as f32 * 0.25, 10.0)).collect(),
    }
}

fn session(
    faces: Vec<DetectionResult>,
    denied: bool,
) -> (ScanSession<FakeOpener>, Rc<Cell<bool>>) {
    with_backend(ScriptedBackend { faces, gate: None }, denied)
}

/// Session whose detections are held until the returned sender fires
fn gated_session(
    denied: bool,
) -> (ScanSession<FakeOpener>, Rc<Cell<bool>>, mpsc::Sender<()>) {
    let (release, gate) = mpsc::channel();
    let backend = ScriptedBackend {
        faces: vec![happy_face()],
        gate: Some(gate),
    };
    let (session, streaming) = with_backend(backend, denied);
    (session, streaming, release)
}

fn with_backend(
    backend: ScriptedBackend,
    denied: bool,
) -> (ScanSession<FakeOpener>, Rc<Cell<bool>>) {
    let streaming = Rc::new(Cell::new(false));
    let opener = FakeOpener {
        streaming: streaming.clone(),
        denied,
    };
    let worker = AnalysisWorker::spawn(backend);
    let session = ScanSession::new(worker, CameraManager::new(opener, vec![0]));
    (session, streaming)
}

/// Waits until models are loaded and no analysis is in flight
fn settle(session: &mut ScanSession<FakeOpener>) {
    while session.state().is_loading() || *session.state().models() == ModelStatus::Loading {
        assert!(session.wait_for_update(), "worker stopped");
    }
}

fn photo(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("face-scan-flow-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let png = encode_frame(&Frame::new(vec![200; 40 * 30 * 3], 40, 30)).unwrap();
    std::fs::write(&path, png).unwrap();
    path
}

#[test]
fn uploaded_photo_shows_expression_and_score() {
    let (mut session, _) = session(vec![happy_face()], false);
    session.upload(&photo("happy.png"));
    settle(&mut session);

    let state = session.state();
    assert_eq!(state.expression_label(), "Happy");
    assert_eq!(state.mental_ability(), MentalAbility::Low);
    assert_eq!(state.mental_ability().label(), "Low mental ability");
    assert_eq!(state.landmarks().len(), 68);
    assert_eq!(state.current_analysis().unwrap().image_size, (40, 30));
    assert!(session.image().is_some());
}

#[test]
fn photo_without_face_clears_result() {
    let (mut session, _) = session(vec![], false);
    session.upload(&photo("empty.png"));
    settle(&mut session);

    let state = session.state();
    assert_eq!(state.expression_label(), "");
    assert!(state.landmarks().is_empty());
    assert_eq!(state.score(), 0.0);
    assert!(!state.error_message().unwrap_or("").is_empty());
}

#[test]
fn capture_cycle_releases_camera() {
    let (mut session, streaming) = session(vec![happy_face()], false);
    settle(&mut session);

    session.start_camera();
    assert!(session.camera_enabled());
    assert!(streaming.get());
    assert!(session.preview_frame().is_some());

    session.capture_and_analyze();
    assert!(!streaming.get());
    assert!(!session.camera_enabled());

    settle(&mut session);
    assert_eq!(session.state().expression_label(), "Happy");
    assert_eq!(session.state().current_analysis().unwrap().image_size, (32, 24));
}

#[test]
fn capture_without_camera_is_reported() {
    let (mut session, _) = session(vec![happy_face()], false);
    settle(&mut session);

    session.capture_and_analyze();
    assert!(!session.state().is_loading());
    assert_eq!(
        session.state().error_message(),
        Some("Camera is not initialized. Start the camera first.")
    );
}

#[test]
fn denied_camera_keeps_previous_result() {
    let (mut session, streaming) = session(vec![happy_face()], true);
    session.upload(&photo("before-camera.png"));
    settle(&mut session);

    session.start_camera();
    assert!(!streaming.get());
    assert!(!session.camera_enabled());

    let state = session.state();
    assert_eq!(
        state.error_message(),
        Some("Error accessing camera. Please try again.")
    );
    assert_eq!(state.expression_label(), "Happy");
    assert_eq!(state.landmarks().len(), 68);
}

#[test]
fn non_image_upload_is_reported() {
    let (mut session, _) = session(vec![happy_face()], false);
    settle(&mut session);

    let path = std::env::temp_dir().join(format!("face-scan-flow-{}.txt", std::process::id()));
    std::fs::write(&path, "not a picture").unwrap();
    session.upload(&path);

    assert!(!session.state().is_loading());
    assert!(session.state().error_message().is_some());
    assert!(session.image().is_none());
}

#[test]
fn denied_camera_does_not_cancel_upload() {
    let (mut session, _, release) = gated_session(true);
    session.upload(&photo("in-flight.png"));

    session.start_camera();
    assert!(session.state().is_loading());
    assert_eq!(
        session.state().error_message(),
        Some("Error accessing camera. Please try again.")
    );

    release.send(()).unwrap();
    settle(&mut session);

    let state = session.state();
    assert_eq!(state.expression_label(), "Happy");
    assert_eq!(state.landmarks().len(), 68);
    assert_eq!(state.error_message(), None);
    assert!(session.image().is_some());
}

#[test]
fn camera_opened_during_upload_keeps_its_image() {
    let (mut session, streaming, release) = gated_session(false);
    let path = photo("kept.png");
    session.upload(&path);

    session.start_camera();
    assert!(streaming.get());
    assert_eq!(session.image().unwrap().source(), &ImageSource::File(path));

    release.send(()).unwrap();
    settle(&mut session);
    assert_eq!(session.state().expression_label(), "Happy");
    assert!(session.image().is_some());
}

#[test]
fn failed_upload_does_not_cancel_capture() {
    let (mut session, _, release) = gated_session(false);
    session.start_camera();
    session.capture_and_analyze();
    assert!(session.state().is_loading());

    let path = std::env::temp_dir().join(format!("face-scan-busy-{}.txt", std::process::id()));
    std::fs::write(&path, "not a picture").unwrap();
    session.upload(&path);
    assert!(session.state().is_loading());
    assert!(session.state().error_message().is_some());

    release.send(()).unwrap();
    settle(&mut session);
    let state = session.state();
    assert_eq!(state.expression_label(), "Happy");
    assert_eq!(state.current_analysis().unwrap().image_size, (32, 24));
}
