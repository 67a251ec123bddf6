// UI module for the face scan application

use crate::config::UiConfig;
use crate::input::{decode_payload, has_image_extension, IMAGE_EXTENSIONS};
use crate::models::{Frame, Landmark};
use crate::session::ScanSession;
use crate::state::{ModelStatus, Origin};
use std::path::{Path, PathBuf};
use tracing::warn;

const LANDMARK_RADIUS: f32 = 2.0;
const UPLOAD_COLOR: egui::Color32 = egui::Color32::from_rgb(0, 128, 0);
const CAMERA_COLOR: egui::Color32 = egui::Color32::from_rgb(0, 0, 255);

/// Main application UI
pub struct FaceScanApp {
    session: ScanSession,
    config: UiConfig,
    image_texture: Option<egui::TextureHandle>,
    image_version: u64,
    camera_texture: Option<egui::TextureHandle>,
}

impl FaceScanApp {
    /// Creates a new FaceScanApp
    pub fn new(session: ScanSession, config: UiConfig) -> Self {
        Self {
            session,
            config,
            image_texture: None,
            image_version: 0,
            camera_texture: None,
        }
    }

    /// Re-uploads the displayed image when the session replaced it
    fn update_image_texture(&mut self, ctx: &egui::Context) {
        if self.image_version == self.session.image_version() {
            return;
        }
        self.image_version = self.session.image_version();
        self.image_texture = self.session.image().and_then(|payload| {
            match decode_payload(payload) {
                Ok(frame) => Some(ctx.load_texture(
                    "image",
                    color_image(&frame),
                    egui::TextureOptions::LINEAR,
                )),
                Err(e) => {
                    warn!("Cannot preview image: {}", e);
                    None
                }
            }
        });
    }

    /// Updates the live camera texture from the latest frame
    fn update_camera_texture(&mut self, ctx: &egui::Context) {
        if !self.session.camera_enabled() {
            self.camera_texture = None;
            return;
        }
        if let Some(frame) = self.session.preview_frame() {
            self.camera_texture =
                Some(ctx.load_texture("camera", color_image(&frame), egui::TextureOptions::LINEAR));
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped: Vec<_> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|f| f.path.clone())
                .collect()
        });
        match first_image(&dropped) {
            Some(path) => self.session.upload(path),
            None if !dropped.is_empty() => {
                warn!("Ignoring {} dropped file(s) without an image extension", dropped.len())
            }
            None => {}
        }
    }

    fn render_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let state = self.session.state();
            let upload_busy = state.is_loading_from(Origin::Upload);
            let camera_busy = state.is_loading_from(Origin::Camera);

            let upload =
                egui::Button::new(egui::RichText::new("Upload Image").color(egui::Color32::WHITE))
                    .fill(UPLOAD_COLOR);
            if ui.add_enabled(!upload_busy, upload).clicked() {
                if let Some(path) = rfd::FileDialog::new()
                    .add_filter("Images", IMAGE_EXTENSIONS)
                    .pick_file()
                {
                    self.session.upload(&path);
                }
            }

            if self.session.camera_enabled() {
                let capture = egui::Button::new(
                    egui::RichText::new("Capture and Analyze").color(egui::Color32::WHITE),
                )
                .fill(UPLOAD_COLOR);
                if ui.add_enabled(!camera_busy, capture).clicked() {
                    self.session.capture_and_analyze();
                }
            }

            let camera = egui::Button::new(
                egui::RichText::new("Capture from Camera").color(egui::Color32::WHITE),
            )
            .fill(CAMERA_COLOR);
            if ui.add_enabled(!camera_busy, camera).clicked() {
                self.session.start_camera();
            }
        });
    }

    fn render_status(&self, ui: &mut egui::Ui) {
        let state = self.session.state();
        match state.models() {
            ModelStatus::Loading => {
                ui.label("Loading models...");
            }
            ModelStatus::Failed(message) => {
                ui.colored_label(egui::Color32::RED, format!("Models unavailable: {message}"));
            }
            ModelStatus::Ready => {}
        }

        if state.is_loading() || *state.models() == ModelStatus::Loading {
            ui.add_space(20.0);
            ui.spinner();
        }

        if let Some(message) = state.error_message() {
            ui.add_space(20.0);
            ui.colored_label(egui::Color32::RED, message);
        }
    }

    fn render_result(&self, ui: &mut egui::Ui) {
        let max_side = self.config.max_preview_side;

        if let Some(texture) = &self.image_texture {
            ui.label("Uploaded Image:");
            let size = fit_within(texture.size_vec2(), max_side);
            let response = ui.add(egui::Image::new(texture).fit_to_exact_size(size));

            let state = self.session.state();
            if let Some(analysis) = state.current_analysis() {
                let painter = ui.painter_at(response.rect);
                let points =
                    overlay_points(&analysis.landmarks, analysis.image_size, response.rect);
                for point in points {
                    painter.circle_filled(point, LANDMARK_RADIUS, egui::Color32::RED);
                }
            }

            ui.add_space(20.0);
            ui.heading(format!("Expression: {}", state.expression_label()));
            ui.add_space(20.0);
            ui.heading(format!("Mental Ability: {}", state.mental_ability()));
        } else if let Some(texture) = &self.camera_texture {
            let size = fit_within(texture.size_vec2(), max_side);
            ui.add(egui::Image::new(texture).fit_to_exact_size(size));
        } else {
            ui.label("Upload an image, drop one here, or start the camera");
        }
    }
}

impl eframe::App for FaceScanApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.session.poll();
        self.handle_dropped_files(ctx);
        self.update_image_texture(ctx);
        self.update_camera_texture(ctx);

        let state = self.session.state();
        if self.session.camera_enabled()
            || state.is_loading()
            || *state.models() == ModelStatus::Loading
        {
            ctx.request_repaint();
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading("Face Scanning and Analysis");
                ui.add_space(10.0);
                self.render_controls(ui);
                self.render_status(ui);
                self.render_result(ui);
            });
        });
    }
}

fn color_image(frame: &Frame) -> egui::ColorImage {
    egui::ColorImage::from_rgb([frame.width as usize, frame.height as usize], &frame.data)
}

/// First dropped path that names an image file
pub fn first_image(paths: &[PathBuf]) -> Option<&Path> {
    paths
        .iter()
        .map(PathBuf::as_path)
        .find(|path| has_image_extension(path))
}

/// Scales `size` down so neither side exceeds `max_side`
pub fn fit_within(size: egui::Vec2, max_side: f32) -> egui::Vec2 {
    let scale = (max_side / size.x).min(max_side / size.y).min(1.0);
    size * scale
}

/// Maps landmarks from image pixel space into the displayed image rect
pub fn overlay_points(
    landmarks: &[Landmark],
    image_size: (u32, u32),
    rect: egui::Rect,
) -> Vec<egui::Pos2> {
    let (width, height) = image_size;
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let sx = rect.width() / width as f32;
    let sy = rect.height() / height as f32;
    landmarks
        .iter()
        .map(|p| egui::pos2(rect.min.x + p.x * sx, rect.min.y + p.y * sy))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn large_images_fit_the_preview() {
        let size = fit_within(egui::vec2(800.0, 400.0), 400.0);
        assert_relative_eq!(size.x, 400.0);
        assert_relative_eq!(size.y, 200.0);

        let small = fit_within(egui::vec2(120.0, 80.0), 400.0);
        assert_eq!(small, egui::vec2(120.0, 80.0));
    }

    #[test]
    fn landmarks_follow_the_displayed_rect() {
        let rect = egui::Rect::from_min_size(egui::pos2(10.0, 20.0), egui::vec2(400.0, 200.0));
        let points = overlay_points(
            &[Landmark::new(0.0, 0.0), Landmark::new(400.0, 200.0), Landmark::new(800.0, 400.0)],
            (800, 400),
            rect,
        );
        assert_eq!(
            points,
            vec![egui::pos2(10.0, 20.0), egui::pos2(210.0, 120.0), egui::pos2(410.0, 220.0)]
        );
    }

    #[test]
    fn dropped_files_need_an_image_extension() {
        let dropped = vec![
            PathBuf::from("notes.txt"),
            PathBuf::from("face.PNG"),
            PathBuf::from("other.jpg"),
        ];
        assert_eq!(first_image(&dropped), Some(Path::new("face.PNG")));
        assert_eq!(first_image(&[PathBuf::from("archive.zip")]), None);
        assert_eq!(first_image(&[]), None);
    }

    #[test]
    fn empty_image_has_no_overlay() {
        let rect = egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(10.0, 10.0));
        assert!(overlay_points(&[Landmark::new(1.0, 1.0)], (0, 0), rect).is_empty());
    }
}
