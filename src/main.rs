use face_scan::camera::CameraManager;
use face_scan::config::Config;
use face_scan::controller::AnalysisWorker;
use face_scan::detector::OnnxFaceBackend;
use face_scan::error::{self, Result};
use face_scan::session::ScanSession;
use face_scan::ui::FaceScanApp;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the logging system (file only, no console output)
fn init_logging(log_file: &Path) -> Result<()> {
    let log_file = std::fs::File::create(log_file).map_err(error::FaceScanError::Io)?;

    let file_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(file_layer)
        .init();

    Ok(())
}

fn main() -> Result<()> {
    let config = Config::get()?;
    init_logging(&config.log_file)?;
    info!("Starting with models from {:?}", config.models.dir);

    // Model weights load once on the worker thread, before the first request
    let backend = OnnxFaceBackend::new(config.models.clone(), config.detector.clone());
    let worker = AnalysisWorker::spawn(backend);

    let cameras = CameraManager::from_config(&config.camera);
    let session = ScanSession::new(worker, cameras);

    let ui_config = config.ui.clone();
    let result = eframe::run_native(
        "Face Scan",
        eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([ui_config.width, ui_config.height])
                .with_title("Face Scanning and Analysis"),
            ..Default::default()
        },
        Box::new(move |_cc| Ok(Box::new(FaceScanApp::new(session, ui_config)))),
    );

    if let Err(e) = result {
        error!("Application error: {}", e);
    }

    Ok(())
}
