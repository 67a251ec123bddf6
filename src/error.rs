// Error types for the Face Scan application

use thiserror::Error;

/// Main error type for the Face Scan application
#[derive(Debug, Error)]
pub enum FaceScanError {
    #[error("Camera access denied")]
    CameraAccessDenied,

    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("Camera is not initialized")]
    CameraNotInitialized,

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Models are not loaded")]
    ModelsNotLoaded,

    #[error("Image loading failed: {0}")]
    ImageLoad(String),

    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),

    #[error("Frame processing failed: {0}")]
    FrameProcessing(String),

    #[error("Face detection failed: {0}")]
    FaceDetection(String),

    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(String),

    #[error("OpenCV error: {0}")]
    OpenCV(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Analysis worker stopped")]
    WorkerStopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding error: {0}")]
    ImageDecode(#[from] image::ImageError),
}

/// Result type alias for Face Scan operations
pub type Result<T> = std::result::Result<T, FaceScanError>;

/// Coarse classification used to decide what the user sees
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    CameraPermissionDenied,
    CameraUnavailable,
    CameraNotInitialized,
    NoFaceDetected,
    AnalysisFailure,
}

impl FaceScanError {
    /// Classifies the error for the UI boundary
    pub fn kind(&self) -> ErrorKind {
        match self {
            FaceScanError::CameraAccessDenied => ErrorKind::CameraPermissionDenied,
            FaceScanError::CameraUnavailable(_) => ErrorKind::CameraUnavailable,
            FaceScanError::CameraNotInitialized => ErrorKind::CameraNotInitialized,
            _ => ErrorKind::AnalysisFailure,
        }
    }

    /// Message shown to the user
    pub fn user_message(&self) -> String {
        match self {
            FaceScanError::CameraAccessDenied | FaceScanError::CameraUnavailable(_) => {
                "Error accessing camera. Please try again.".to_string()
            }
            FaceScanError::CameraNotInitialized => {
                "Camera is not initialized. Start the camera first.".to_string()
            }
            _ => "Error analyzing image. Please try again.".to_string(),
        }
    }
}

// Conversion from nokhwa errors
impl From<nokhwa::NokhwaError> for FaceScanError {
    fn from(err: nokhwa::NokhwaError) -> Self {
        let message = match &err {
            nokhwa::NokhwaError::StructureError { structure, error } => {
                format!("{structure}: {error}")
            }
            nokhwa::NokhwaError::OpenDeviceError(device, error) => {
                format!("Device {device}: {error}")
            }
            nokhwa::NokhwaError::GetPropertyError { property, error } => {
                format!("Property {property}: {error}")
            }
            _ => err.to_string(),
        };
        camera_open_error(message)
    }
}

/// Maps a backend failure message onto the camera error kinds
pub(crate) fn camera_open_error(message: String) -> FaceScanError {
    let lowered = message.to_lowercase();
    if lowered.contains("permission")
        || lowered.contains("denied")
        || lowered.contains("not authorized")
    {
        FaceScanError::CameraAccessDenied
    } else {
        FaceScanError::CameraUnavailable(message)
    }
}

// Conversion from OpenCV errors
impl From<opencv::Error> for FaceScanError {
    fn from(err: opencv::Error) -> Self {
        FaceScanError::OpenCV(err.to_string())
    }
}

// Conversion from ONNX Runtime errors
impl From<ort::Error> for FaceScanError {
    fn from(err: ort::Error) -> Self {
        FaceScanError::OnnxRuntime(err.to_string())
    }
}

impl From<config::ConfigError> for FaceScanError {
    fn from(err: config::ConfigError) -> Self {
        FaceScanError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for FaceScanError {
    fn from(err: serde_json::Error) -> Self {
        FaceScanError::Config(err.to_string())
    }
}
