// Application configuration, stored as JSON next to the executable's working directory

use crate::error::{FaceScanError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_FILE: &str = "face_scan.json";
const ENV_PREFIX: &str = "FACE_SCAN";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    pub models: ModelConfig,
    pub detector: DetectorConfig,
    pub camera: CameraConfig,
    pub ui: UiConfig,
    pub log_file: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ModelConfig {
    /// Directory the model assets are served from
    pub dir: PathBuf,
    pub face_cascade: String,
    pub landmark_model: String,
    pub expression_model: String,
    /// Expression class name for each output index of the expression model
    pub expression_classes: Vec<String>,
}

impl ModelConfig {
    pub fn face_cascade_path(&self) -> PathBuf {
        self.dir.join(&self.face_cascade)
    }

    pub fn landmark_model_path(&self) -> PathBuf {
        self.dir.join(&self.landmark_model)
    }

    pub fn expression_model_path(&self) -> PathBuf {
        self.dir.join(&self.expression_model)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct DetectorConfig {
    pub scale_factor: f64,
    pub min_neighbors: i32,
    pub min_face_size: i32,
    /// Images are downscaled so their longest side is at most this before detection
    pub max_input_side: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct CameraConfig {
    pub index: u32,
    pub fallback_indices: Vec<u32>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct UiConfig {
    pub width: f32,
    pub height: f32,
    pub max_preview_side: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            models: ModelConfig {
                dir: PathBuf::from("assets/models"),
                face_cascade: "haarcascade_frontalface_default.xml".to_string(),
                landmark_model: "landmarks_68.onnx".to_string(),
                expression_model: "emotion.onnx".to_string(),
                // HSEmotion output order
                expression_classes: [
                    "angry", "disgust", "fear", "happy", "sad", "surprise", "neutral", "contempt",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            },
            detector: DetectorConfig {
                scale_factor: 1.1,
                min_neighbors: 5,
                min_face_size: 40,
                max_input_side: 640,
            },
            camera: CameraConfig {
                index: 0,
                fallback_indices: vec![1],
                width: 640,
                height: 480,
                fps: 30,
            },
            ui: UiConfig {
                width: 1024.0,
                height: 860.0,
                max_preview_side: 400.0,
            },
            log_file: PathBuf::from("face_scan.log"),
        }
    }
}

impl Config {
    /// Loads the configuration from the working directory, creating it with
    /// defaults when it does not exist yet
    pub fn get() -> Result<Config> {
        let path = std::env::current_dir()?.join(CONFIG_FILE);
        Self::load(&path)
    }

    /// Loads the configuration at `path`. `FACE_SCAN_*` environment variables
    /// override file values (e.g. `FACE_SCAN_CAMERA__INDEX=1`).
    pub fn load(path: &Path) -> Result<Config> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("No configuration at {:?}, writing defaults", path);
                let config = Self::default();
                config.save(path)?;
                contents_of(&config)?
            }
            Err(err) => return Err(FaceScanError::Io(err)),
        };

        let config = config::Config::builder()
            .add_source(config::File::from_str(&contents, config::FileFormat::Json))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<Config>()
            .map_err(|e| {
                warn!("Invalid configuration in {:?}: {}", path, e);
                FaceScanError::Config(format!("{}: {e}", path.display()))
            })?;

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, contents_of(self)?)?;
        Ok(())
    }
}

fn contents_of(config: &Config) -> Result<String> {
    Ok(serde_json::to_string_pretty(config)?)
}
