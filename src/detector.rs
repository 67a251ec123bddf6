// Face detection, landmark and expression inference

use crate::config::{DetectorConfig, ModelConfig};
use crate::error::{FaceScanError, Result};
use crate::input::decode_payload;
use crate::models::{
    DetectionResult, Expression, ExpressionDistribution, FaceBox, Frame, ImagePayload, Landmark,
};
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::imgproc;
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// The pretrained model stack, used as a black box by the analysis controller
pub trait FaceAnalysisBackend {
    /// Loads model weights. Called again only after a failed load.
    fn load(&mut self) -> Result<()>;

    /// Decodes a payload into a model-ready frame
    fn decode(&self, payload: &ImagePayload) -> Result<Frame>;

    /// Detects every face with its expressions and landmarks
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionResult>>;
}

const LANDMARK_INPUT_SIZE: usize = 112;
const EXPRESSION_INPUT_SIZE: usize = 260;
/// Fraction of the face box added on each side before landmark inference
const LANDMARK_CROP_MARGIN: f32 = 0.1;

/// Face detector using OpenCV Haar Cascade
pub struct FaceDetector {
    classifier: CascadeClassifier,
    config: DetectorConfig,
}

impl FaceDetector {
    /// Creates a new FaceDetector by loading the Haar Cascade classifier
    pub fn new(cascade_path: &Path, config: DetectorConfig) -> Result<Self> {
        let path = cascade_path.to_string_lossy();
        let classifier = CascadeClassifier::new(&path).map_err(|e| {
            error!("Failed to load Haar Cascade: {}", e);
            FaceScanError::ModelLoad(format!("Haar Cascade load failed: {e}"))
        })?;

        if classifier.empty()? {
            return Err(FaceScanError::ModelLoad(format!(
                "Haar Cascade classifier at {path} is empty"
            )));
        }

        Ok(Self { classifier, config })
    }

    /// Detects faces in an RGB image, returning boxes in its pixel space.
    /// The image is downscaled to `max_input_side` first to bound the cost.
    pub fn detect_faces(&mut self, rgb: &Mat) -> Result<Vec<FaceBox>> {
        let mut gray = Mat::default();
        imgproc::cvt_color(
            rgb,
            &mut gray,
            imgproc::COLOR_RGB2GRAY,
            0,
            opencv::core::AlgorithmHint::ALGO_HINT_DEFAULT,
        )
        .map_err(|e| {
            FaceScanError::FaceDetection(format!("Failed to convert to grayscale: {e}"))
        })?;

        let size = gray.size()?;
        let scale = detection_scale(size.width, size.height, self.config.max_input_side);
        let gray = if scale < 1.0 {
            let mut small = Mat::default();
            imgproc::resize(
                &gray,
                &mut small,
                Size::new(0, 0),
                scale,
                scale,
                imgproc::INTER_AREA,
            )
            .map_err(|e| FaceScanError::FaceDetection(format!("Failed to downscale: {e}")))?;
            small
        } else {
            gray
        };

        let mut faces = Vector::<Rect>::new();
        self.classifier
            .detect_multi_scale(
                &gray,
                &mut faces,
                self.config.scale_factor,
                self.config.min_neighbors,
                0,
                Size::new(self.config.min_face_size, self.config.min_face_size),
                Size::new(0, 0),
            )
            .map_err(|e| FaceScanError::FaceDetection(format!("Face detection failed: {e}")))?;

        let boxes = faces
            .iter()
            .map(|r| upscale_box(r, scale))
            .collect::<Vec<_>>();
        debug!("Detected {} face(s) at scale {:.3}", boxes.len(), scale);
        Ok(boxes)
    }
}

/// Factor that brings the longest side down to `max_side` (never upscales)
fn detection_scale(width: i32, height: i32, max_side: u32) -> f64 {
    let longest = width.max(height);
    if max_side == 0 || longest <= max_side as i32 {
        1.0
    } else {
        max_side as f64 / longest as f64
    }
}

fn upscale_box(rect: Rect, scale: f64) -> FaceBox {
    FaceBox {
        x: (rect.x as f64 / scale).round() as i32,
        y: (rect.y as f64 / scale).round() as i32,
        width: (rect.width as f64 / scale).round() as i32,
        height: (rect.height as f64 / scale).round() as i32,
    }
}

/// Grows a face box by `margin` of its size per side, clamped to the image
fn expand_box(face: FaceBox, margin: f32, width: i32, height: i32) -> FaceBox {
    let dx = (face.width as f32 * margin).round() as i32;
    let dy = (face.height as f32 * margin).round() as i32;
    let x0 = (face.x - dx).max(0);
    let y0 = (face.y - dy).max(0);
    let x1 = (face.x + face.width + dx).min(width);
    let y1 = (face.y + face.height + dy).min(height);
    FaceBox {
        x: x0,
        y: y0,
        width: (x1 - x0).max(0),
        height: (y1 - y0).max(0),
    }
}

/// Crops a region, resizes it to `side`x`side` and returns normalized CHW floats
fn face_tensor(rgb: &Mat, face: FaceBox, side: usize) -> Result<Vec<f32>> {
    let rect = Rect::new(face.x, face.y, face.width, face.height);
    let roi = Mat::roi(rgb, rect)
        .and_then(|r| r.try_clone())
        .map_err(|e| FaceScanError::FrameProcessing(format!("Failed to crop face region: {e}")))?;

    let mut resized = Mat::default();
    imgproc::resize(
        &roi,
        &mut resized,
        Size::new(side as i32, side as i32),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )
    .map_err(|e| FaceScanError::FrameProcessing(format!("Failed to resize face: {e}")))?;

    let data = resized.data_bytes().map_err(|e| {
        FaceScanError::FrameProcessing(format!("Failed to get resized data: {e}"))
    })?;

    let normalized: Vec<f32> = data.iter().map(|&pixel| pixel as f32 / 255.0).collect();
    Ok(hwc_to_chw(&normalized, side, side, 3))
}

fn hwc_to_chw(hwc: &[f32], height: usize, width: usize, channels: usize) -> Vec<f32> {
    let mut chw = vec![0.0f32; channels * height * width];
    for h in 0..height {
        for w in 0..width {
            for c in 0..channels {
                let hwc_idx = (h * width + w) * channels + c;
                let chw_idx = c * (height * width) + h * width + w;
                chw[chw_idx] = hwc[hwc_idx];
            }
        }
    }
    chw
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();
    logits
        .iter()
        .map(|&x| (x - max_logit).exp() / exp_sum)
        .collect()
}

fn load_session(model_path: &Path) -> Result<Session> {
    Session::builder()
        .map_err(|e| FaceScanError::ModelLoad(format!("Failed to create session builder: {e}")))?
        .commit_from_file(model_path)
        .map_err(|e| {
            error!("Failed to load ONNX model {:?}: {}", model_path, e);
            FaceScanError::ModelLoad(format!("ONNX model load failed: {e}"))
        })
}

/// Runs a single-input model on a `[1, 3, side, side]` tensor, returning the first output
fn run_session(session: &mut Session, chw: Vec<f32>, side: usize) -> Result<Vec<f32>> {
    let input_array = ndarray::Array4::from_shape_vec((1, 3, side, side), chw).map_err(|e| {
        FaceScanError::OnnxRuntime(format!("Failed to create input array: {e}"))
    })?;

    let input_tensor = Value::from_array(input_array).map_err(|e| {
        FaceScanError::OnnxRuntime(format!("Failed to create input tensor: {e}"))
    })?;

    let outputs = session.run(ort::inputs![input_tensor]).map_err(|e| {
        error!("ONNX inference failed: {}", e);
        FaceScanError::OnnxRuntime(format!("Inference failed: {e}"))
    })?;

    let (_, output_value) = outputs
        .iter()
        .next()
        .ok_or_else(|| FaceScanError::OnnxRuntime("No output from model".to_string()))?;

    let (_, data) = output_value.try_extract_tensor::<f32>().map_err(|e| {
        FaceScanError::OnnxRuntime(format!("Failed to extract output tensor: {e}"))
    })?;

    Ok(data.to_vec())
}

/// 68-point landmark regressor using ONNX Runtime
pub struct LandmarkPredictor {
    session: Session,
}

impl LandmarkPredictor {
    pub fn new(model_path: &Path) -> Result<Self> {
        Ok(Self {
            session: load_session(model_path)?,
        })
    }

    /// Predicts landmarks for a face crop, mapped back to image pixel space
    pub fn predict(&mut self, rgb: &Mat, crop: FaceBox) -> Result<Vec<Landmark>> {
        let input = face_tensor(rgb, crop, LANDMARK_INPUT_SIZE)?;
        let coords = run_session(&mut self.session, input, LANDMARK_INPUT_SIZE)?;
        landmarks_from_output(&coords, crop)
    }
}

/// Maps interleaved crop-normalized `(x, y)` pairs into image space
fn landmarks_from_output(coords: &[f32], crop: FaceBox) -> Result<Vec<Landmark>> {
    if coords.is_empty() || coords.len() % 2 != 0 {
        return Err(FaceScanError::OnnxRuntime(format!(
            "Landmark output has {} values, expected (x, y) pairs",
            coords.len()
        )));
    }

    Ok(coords
        .chunks_exact(2)
        .map(|p| {
            Landmark::new(
                crop.x as f32 + p[0] * crop.width as f32,
                crop.y as f32 + p[1] * crop.height as f32,
            )
        })
        .collect())
}

/// Expression classifier using ONNX Runtime
pub struct ExpressionClassifier {
    session: Session,
    classes: Vec<Option<Expression>>,
}

impl ExpressionClassifier {
    /// Loads the model; `classes` names each output index
    pub fn new(model_path: &Path, classes: &[String]) -> Result<Self> {
        let session = load_session(model_path)?;
        let classes = classes
            .iter()
            .map(|name| match name.parse::<Expression>() {
                Ok(expression) => Some(expression),
                Err(e) => {
                    warn!("Ignoring expression model class: {}", e);
                    None
                }
            })
            .collect();
        Ok(Self { session, classes })
    }

    /// Classifies a face crop into an expression distribution
    pub fn classify(&mut self, rgb: &Mat, face: FaceBox) -> Result<ExpressionDistribution> {
        let input = face_tensor(rgb, face, EXPRESSION_INPUT_SIZE)?;
        let logits = run_session(&mut self.session, input, EXPRESSION_INPUT_SIZE)?;
        distribution_from_logits(&logits, &self.classes)
    }
}

fn distribution_from_logits(
    logits: &[f32],
    classes: &[Option<Expression>],
) -> Result<ExpressionDistribution> {
    if logits.len() != classes.len() {
        return Err(FaceScanError::OnnxRuntime(format!(
            "Expression model returned {} classes, configured {}",
            logits.len(),
            classes.len()
        )));
    }

    let probabilities = softmax(logits);
    Ok(ExpressionDistribution::from_pairs(
        classes
            .iter()
            .zip(probabilities)
            .filter_map(|(class, p)| class.map(|expression| (expression, p))),
    ))
}

struct LoadedModels {
    faces: FaceDetector,
    landmarks: LandmarkPredictor,
    expressions: ExpressionClassifier,
}

/// Haar cascade + ONNX landmark and expression models
pub struct OnnxFaceBackend {
    models_config: ModelConfig,
    detector_config: DetectorConfig,
    models: Option<LoadedModels>,
}

impl OnnxFaceBackend {
    pub fn new(models_config: ModelConfig, detector_config: DetectorConfig) -> Self {
        Self {
            models_config,
            detector_config,
            models: None,
        }
    }
}

impl FaceAnalysisBackend for OnnxFaceBackend {
    fn load(&mut self) -> Result<()> {
        if self.models.is_some() {
            return Ok(());
        }

        let config = &self.models_config;
        info!("Loading models from {:?}", config.dir);
        let faces = FaceDetector::new(&config.face_cascade_path(), self.detector_config.clone())?;
        let landmarks = LandmarkPredictor::new(&config.landmark_model_path())?;
        let expressions =
            ExpressionClassifier::new(&config.expression_model_path(), &config.expression_classes)?;

        self.models = Some(LoadedModels {
            faces,
            landmarks,
            expressions,
        });
        info!("Models loaded");
        Ok(())
    }

    fn decode(&self, payload: &ImagePayload) -> Result<Frame> {
        decode_payload(payload)
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionResult>> {
        let models = self.models.as_mut().ok_or(FaceScanError::ModelsNotLoaded)?;

        let mat = Mat::from_slice(&frame.data).map_err(|e| {
            FaceScanError::FaceDetection(format!("Failed to create Mat: {e}"))
        })?;
        let rgb = mat
            .reshape(3, frame.height as i32)
            .and_then(|m| m.try_clone())
            .map_err(|e| FaceScanError::FaceDetection(format!("Failed to reshape Mat: {e}")))?;

        let (width, height) = (frame.width as i32, frame.height as i32);
        let mut results = Vec::new();
        for face in models.faces.detect_faces(&rgb)? {
            // clamp to the image
            let face = expand_box(face, 0.0, width, height);
            if face.width == 0 || face.height == 0 {
                continue;
            }

            let expressions = models.expressions.classify(&rgb, face)?;
            let crop = expand_box(face, LANDMARK_CROP_MARGIN, width, height);
            let landmarks = models.landmarks.predict(&rgb, crop)?;

            results.push(DetectionResult {
                face,
                expressions,
                landmarks,
            });
        }

        Ok(results)
    }
}
