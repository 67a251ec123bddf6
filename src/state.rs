// UI state: one explicit object with named transitions

use crate::controller::RequestId;
use crate::error::{ErrorKind, FaceScanError, Result};
use crate::models::{Analysis, FaceAnalysis, Landmark};
use crate::scoring::MentalAbility;
use tracing::debug;

/// The control that submitted an analysis
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Upload,
    Camera,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelStatus {
    Loading,
    Ready,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Phase {
    Idle,
    Loading {
        request: RequestId,
        origin: Origin,
        /// Input error raised while the request runs; it does not cancel it
        notice: Option<String>,
    },
    Ready(FaceAnalysis),
    Failed {
        kind: ErrorKind,
        message: String,
        /// Result still on screen when the failure did not invalidate it
        retained: Option<FaceAnalysis>,
    },
}

#[derive(Clone, Debug)]
pub struct AppState {
    phase: Phase,
    models: ModelStatus,
    next_request: RequestId,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            models: ModelStatus::Loading,
            next_request: 1,
        }
    }
}

impl AppState {
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn models(&self) -> &ModelStatus {
        &self.models
    }

    pub fn set_models(&mut self, status: ModelStatus) {
        self.models = status;
    }

    /// Enters `Loading` for a new request.
    /// Returns `None` when `origin` already has a request in flight; a request
    /// from another origin is superseded.
    pub fn begin(&mut self, origin: Origin) -> Option<RequestId> {
        if let Phase::Loading {
            origin: current, ..
        } = self.phase
        {
            if current == origin {
                debug!("Ignoring duplicate {:?} submission", origin);
                return None;
            }
        }

        let request = self.next_request;
        self.next_request += 1;
        self.phase = Phase::Loading {
            request,
            origin,
            notice: None,
        };
        Some(request)
    }

    /// Applies a finished analysis. Results of superseded requests are dropped.
    pub fn finish(&mut self, request: RequestId, result: Result<Analysis>) -> bool {
        let origin = match self.phase {
            Phase::Loading {
                request: current,
                origin,
                ..
            } if current == request => origin,
            _ => {
                debug!("Dropping stale result for request {}", request);
                return false;
            }
        };

        self.phase = match result {
            Ok(Analysis::Face(analysis)) => Phase::Ready(analysis),
            Ok(Analysis::NoFaceFound) => Phase::Failed {
                kind: ErrorKind::NoFaceDetected,
                message: no_face_message(origin).to_string(),
                retained: None,
            },
            Err(error) => Phase::Failed {
                kind: ErrorKind::AnalysisFailure,
                message: FaceScanError::AnalysisFailed(error.to_string()).user_message(),
                retained: None,
            },
        };
        true
    }

    /// Surfaces an input error (camera access, capture, file read).
    /// Any result on screen stays and a request in flight keeps running.
    pub fn report(&mut self, error: &FaceScanError) {
        if let Phase::Loading { notice, .. } = &mut self.phase {
            *notice = Some(error.user_message());
            return;
        }
        let retained = self.current_analysis().cloned();
        self.phase = Phase::Failed {
            kind: error.kind(),
            message: error.user_message(),
            retained,
        };
    }

    /// Clears a pending message, keeping any result or request in flight
    pub fn dismiss(&mut self) {
        self.phase = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Failed {
                retained: Some(analysis),
                ..
            } => Phase::Ready(analysis),
            Phase::Failed { retained: None, .. } => Phase::Idle,
            Phase::Loading {
                request, origin, ..
            } => Phase::Loading {
                request,
                origin,
                notice: None,
            },
            other => other,
        };
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, Phase::Loading { .. })
    }

    pub fn is_loading_from(&self, origin: Origin) -> bool {
        matches!(self.phase, Phase::Loading { origin: o, .. } if o == origin)
    }

    pub fn current_analysis(&self) -> Option<&FaceAnalysis> {
        match &self.phase {
            Phase::Ready(analysis) => Some(analysis),
            Phase::Failed { retained, .. } => retained.as_ref(),
            _ => None,
        }
    }

    pub fn expression_label(&self) -> &str {
        self.current_analysis().map(|a| a.label).unwrap_or("")
    }

    pub fn landmarks(&self) -> &[Landmark] {
        self.current_analysis()
            .map(|a| a.landmarks.as_slice())
            .unwrap_or(&[])
    }

    pub fn score(&self) -> f32 {
        self.current_analysis().map(|a| a.score).unwrap_or(0.0)
    }

    pub fn mental_ability(&self) -> MentalAbility {
        MentalAbility::from_score(self.score())
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.phase {
            Phase::Failed { message, .. } => Some(message),
            Phase::Loading { notice, .. } => notice.as_deref(),
            _ => None,
        }
    }
}

fn no_face_message(origin: Origin) -> &'static str {
    match origin {
        Origin::Upload => "No face detected. Please upload another image.",
        Origin::Camera => "No face detected. Please try again.",
    }
}
