// Detection controller and the background worker that runs it

use crate::detector::FaceAnalysisBackend;
use crate::error::{FaceScanError, Result};
use crate::models::{Analysis, DetectionResult, FaceAnalysis, ImagePayload};
use crate::scoring::{dominant_expression, expression_label, mental_ability_score};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Runs the model stack and maps its output for display.
/// Models are loaded once; a failed load is retried on the next call.
pub struct AnalysisController<B> {
    backend: B,
    loaded: bool,
}

impl<B: FaceAnalysisBackend> AnalysisController<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            loaded: false,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn ensure_loaded(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        self.backend.load().map_err(|e| {
            error!("Model loading failed: {}", e);
            e
        })?;
        self.loaded = true;
        Ok(())
    }

    /// Analyzes one image, using only the first detected face
    pub fn analyze(&mut self, payload: &ImagePayload) -> Result<Analysis> {
        self.ensure_loaded()?;
        let frame = self.backend.decode(payload)?;
        let detections = self.backend.detect(&frame)?;
        Ok(map_detections(detections, (frame.width, frame.height)))
    }
}

/// Maps raw detections to the display result of the first face
pub fn map_detections(detections: Vec<DetectionResult>, image_size: (u32, u32)) -> Analysis {
    let faces_found = detections.len();
    let Some(first) = detections.into_iter().next() else {
        return Analysis::NoFaceFound;
    };

    let dominant = dominant_expression(&first.expressions);
    Analysis::Face(FaceAnalysis {
        dominant,
        label: expression_label(dominant.key()),
        score: mental_ability_score(&first.expressions),
        expressions: first.expressions,
        landmarks: first.landmarks,
        image_size,
        faces_found,
    })
}

/// Identifies one submitted analysis
pub type RequestId = u64;

/// Work item for the analysis worker
#[derive(Debug)]
pub struct AnalysisRequest {
    pub id: RequestId,
    pub payload: ImagePayload,
}

/// Messages from the analysis worker
#[derive(Debug)]
pub enum AnalysisEvent {
    ModelsReady,
    ModelsFailed(String),
    Finished {
        id: RequestId,
        result: Result<Analysis>,
    },
}

/// Handle to the background analysis thread
pub struct AnalysisWorker {
    requests: mpsc::UnboundedSender<AnalysisRequest>,
    events: mpsc::UnboundedReceiver<AnalysisEvent>,
}

impl AnalysisWorker {
    /// Starts the worker thread. Models are loaded right away; requests queue
    /// behind the load.
    pub fn spawn<B>(backend: B) -> Self
    where
        B: FaceAnalysisBackend + Send + 'static,
    {
        let (request_sender, request_receiver) = mpsc::unbounded_channel();
        let (event_sender, event_receiver) = mpsc::unbounded_channel();

        std::thread::Builder::new()
            .name("analysis".into())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Failed to start analysis runtime: {}", e);
                        return;
                    }
                };
                rt.block_on(run_worker(
                    AnalysisController::new(backend),
                    request_receiver,
                    event_sender,
                ));
            })
            .map_err(|e| error!("Failed to spawn analysis thread: {}", e))
            .ok();

        Self {
            requests: request_sender,
            events: event_receiver,
        }
    }

    pub fn submit(&self, id: RequestId, payload: ImagePayload) -> Result<()> {
        self.requests
            .send(AnalysisRequest { id, payload })
            .map_err(|_| FaceScanError::WorkerStopped)
    }

    /// Next pending event without blocking
    pub fn try_next(&mut self) -> Option<AnalysisEvent> {
        self.events.try_recv().ok()
    }

    /// Blocks until the next event; `None` once the worker is gone
    pub fn wait_next(&mut self) -> Option<AnalysisEvent> {
        self.events.blocking_recv()
    }
}

async fn run_worker<B: FaceAnalysisBackend>(
    mut controller: AnalysisController<B>,
    mut requests: mpsc::UnboundedReceiver<AnalysisRequest>,
    events: mpsc::UnboundedSender<AnalysisEvent>,
) {
    let event = match controller.ensure_loaded() {
        Ok(()) => AnalysisEvent::ModelsReady,
        Err(e) => AnalysisEvent::ModelsFailed(e.to_string()),
    };
    if events.send(event).is_err() {
        return;
    }

    while let Some(mut request) = requests.recv().await {
        // Only the newest queued request can still reach the display
        while let Ok(newer) = requests.try_recv() {
            debug!("Skipping superseded request {}", request.id);
            request = newer;
        }

        let result = controller.analyze(&request.payload);
        match &result {
            Ok(Analysis::Face(face)) => info!(
                "Request {}: {} face(s), {} (score {:.3})",
                request.id, face.faces_found, face.label, face.score
            ),
            Ok(Analysis::NoFaceFound) => info!("Request {}: no face found", request.id),
            Err(e) => warn!("Request {} failed: {}", request.id, e),
        }

        if events
            .send(AnalysisEvent::Finished {
                id: request.id,
                result,
            })
            .is_err()
        {
            break;
        }
    }
    debug!("Analysis worker exiting");
}
