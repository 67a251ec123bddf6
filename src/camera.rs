// Camera module for webcam acquisition and frame capture

use crate::config::CameraConfig;
use crate::error::{FaceScanError, Result};
use crate::input::encode_frame;
use crate::models::{Frame, ImagePayload, ImageSource};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use tracing::{error, info, warn};

/// A capture device whose stream can be started, read and stopped
pub trait VideoDevice {
    fn open_stream(&mut self) -> Result<()>;
    fn is_streaming(&self) -> bool;
    fn frame(&mut self) -> Result<Frame>;
    fn stop_stream(&mut self) -> Result<()>;
}

/// Opens capture devices by index
pub trait DeviceOpener {
    type Device: VideoDevice;

    fn open(&self, index: u32) -> Result<Self::Device>;
}

/// Webcam backed by nokhwa
pub struct NokhwaDevice {
    camera: Camera,
}

impl VideoDevice for NokhwaDevice {
    fn open_stream(&mut self) -> Result<()> {
        self.camera.open_stream()?;
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.camera.is_stream_open()
    }

    fn frame(&mut self) -> Result<Frame> {
        let frame_data = self.camera.frame().map_err(|e| {
            FaceScanError::FrameProcessing(format!("Failed to capture frame: {e}"))
        })?;

        let buffer = frame_data.decode_image::<RgbFormat>().map_err(|e| {
            FaceScanError::FrameProcessing(format!("Failed to decode frame: {e}"))
        })?;

        let (width, height) = (buffer.width(), buffer.height());
        Ok(Frame::new(buffer.into_raw(), width, height))
    }

    fn stop_stream(&mut self) -> Result<()> {
        self.camera.stop_stream()?;
        Ok(())
    }
}

/// Opens nokhwa cameras with the configured format
pub struct NokhwaOpener {
    requested_format: RequestedFormat<'static>,
}

impl NokhwaOpener {
    pub fn new(config: &CameraConfig) -> Self {
        let requested_format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            nokhwa::utils::CameraFormat::new(
                nokhwa::utils::Resolution::new(config.width, config.height),
                nokhwa::utils::FrameFormat::YUYV,
                config.fps,
            ),
        ));
        Self { requested_format }
    }
}

impl DeviceOpener for NokhwaOpener {
    type Device = NokhwaDevice;

    fn open(&self, index: u32) -> Result<NokhwaDevice> {
        let camera = Camera::new(CameraIndex::Index(index), self.requested_format)?;
        Ok(NokhwaDevice { camera })
    }
}

/// Hands out camera streams, trying the configured indices in order
pub struct CameraManager<O = NokhwaOpener> {
    opener: O,
    indices: Vec<u32>,
}

impl CameraManager<NokhwaOpener> {
    pub fn from_config(config: &CameraConfig) -> Self {
        let mut indices = vec![config.index];
        indices.extend(config.fallback_indices.iter().filter(|&&i| i != config.index));
        Self::new(NokhwaOpener::new(config), indices)
    }
}

impl<O: DeviceOpener> CameraManager<O> {
    pub fn new(opener: O, indices: Vec<u32>) -> Self {
        Self { opener, indices }
    }

    /// Opens the first working camera and starts its stream.
    /// A permission failure stops the search immediately.
    pub fn acquire(&self) -> Result<CameraStream<O::Device>> {
        let mut last_error = FaceScanError::CameraUnavailable("No camera index configured".into());

        for &index in &self.indices {
            match self.try_open(index) {
                Ok(device) => {
                    info!("Camera {} streaming", index);
                    return Ok(CameraStream {
                        device: Some(device),
                    });
                }
                Err(FaceScanError::CameraAccessDenied) => {
                    error!("Camera {} access denied", index);
                    return Err(FaceScanError::CameraAccessDenied);
                }
                Err(e) => {
                    warn!("Could not open camera {}: {}", index, e);
                    last_error = e;
                }
            }
        }

        error!("Failed to initialize camera after trying {:?}", self.indices);
        Err(last_error)
    }

    fn try_open(&self, index: u32) -> Result<O::Device> {
        let mut device = self.opener.open(index)?;
        device.open_stream()?;
        Ok(device)
    }
}

/// An open camera stream. Dropping it stops the stream.
pub struct CameraStream<D: VideoDevice> {
    device: Option<D>,
}

impl<D: VideoDevice> CameraStream<D> {
    /// Whether frames can currently be read
    pub fn is_live(&self) -> bool {
        self.device.as_ref().is_some_and(|d| d.is_streaming())
    }

    fn live_device(&mut self) -> Result<&mut D> {
        match self.device.as_mut() {
            Some(device) if device.is_streaming() => Ok(device),
            _ => Err(FaceScanError::CameraNotInitialized),
        }
    }

    /// Latest frame for the live preview
    pub fn preview_frame(&mut self) -> Result<Frame> {
        self.live_device()?.frame()
    }

    /// Captures the current frame as an encoded image
    pub fn capture_frame(&mut self) -> Result<ImagePayload> {
        let frame = self.live_device()?.frame()?;
        let bytes = encode_frame(&frame)?;
        Ok(ImagePayload::new(bytes, ImageSource::Camera))
    }

    /// Stops the stream; later captures fail with `CameraNotInitialized`
    pub fn release(&mut self) {
        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.stop_stream() {
                error!("Error stopping camera stream: {}", e);
            }
            info!("Camera stream released");
        }
    }
}

impl<D: VideoDevice> Drop for CameraStream<D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct DeviceLog {
        streaming: bool,
        stops: u32,
    }

    struct FakeDevice {
        log: Rc<RefCell<DeviceLog>>,
        stalled: bool,
    }

    impl VideoDevice for FakeDevice {
        fn open_stream(&mut self) -> Result<()> {
            self.log.borrow_mut().streaming = !self.stalled;
            Ok(())
        }

        fn is_streaming(&self) -> bool {
            self.log.borrow().streaming
        }

        fn frame(&mut self) -> Result<Frame> {
            Ok(Frame::new(vec![10; 4 * 4 * 3], 4, 4))
        }

        fn stop_stream(&mut self) -> Result<()> {
            let mut log = self.log.borrow_mut();
            log.streaming = false;
            log.stops += 1;
            Ok(())
        }
    }

    #[derive(Clone, Copy)]
    enum Failure {
        Denied,
        Missing,
        /// Opens, but the stream never starts
        Stalled,
    }

    struct FakeOpener {
        log: Rc<RefCell<DeviceLog>>,
        failures: Vec<(u32, Failure)>,
    }

    impl DeviceOpener for FakeOpener {
        type Device = FakeDevice;

        fn open(&self, index: u32) -> Result<FakeDevice> {
            let failure = self.failures.iter().find(|(i, _)| *i == index).map(|(_, f)| *f);
            match failure {
                Some(Failure::Denied) => return Err(FaceScanError::CameraAccessDenied),
                Some(Failure::Missing) => {
                    return Err(FaceScanError::CameraUnavailable(format!("no device {index}")))
                }
                Some(Failure::Stalled) | None => {}
            }
            Ok(FakeDevice {
                log: self.log.clone(),
                stalled: matches!(failure, Some(Failure::Stalled)),
            })
        }
    }

    fn manager(
        failures: Vec<(u32, Failure)>,
    ) -> (CameraManager<FakeOpener>, Rc<RefCell<DeviceLog>>) {
        let log = Rc::new(RefCell::new(DeviceLog::default()));
        let opener = FakeOpener {
            log: log.clone(),
            failures,
        };
        (CameraManager::new(opener, vec![0, 1]), log)
    }

    #[test]
    fn capture_encodes_png_from_camera() {
        let (manager, _) = manager(vec![]);
        let mut stream = manager.acquire().unwrap();
        let payload = stream.capture_frame().unwrap();
        assert_eq!(payload.source(), &ImageSource::Camera);
        assert_eq!(image::guess_format(payload.bytes()).unwrap(), image::ImageFormat::Png);
    }

    #[test]
    fn release_stops_the_stream() {
        let (manager, log) = manager(vec![]);
        let mut stream = manager.acquire().unwrap();
        assert!(stream.is_live());

        stream.release();
        assert!(!log.borrow().streaming);
        assert!(!stream.is_live());

        // Releasing twice stops once
        stream.release();
        drop(stream);
        assert_eq!(log.borrow().stops, 1);
    }

    #[test]
    fn drop_stops_the_stream() {
        let (manager, log) = manager(vec![]);
        let stream = manager.acquire().unwrap();
        drop(stream);
        assert!(!log.borrow().streaming);
    }

    #[test]
    fn capture_after_release_is_not_initialized() {
        let (manager, _) = manager(vec![]);
        let mut stream = manager.acquire().unwrap();
        stream.release();
        assert!(matches!(
            stream.capture_frame(),
            Err(FaceScanError::CameraNotInitialized)
        ));
    }

    #[test]
    fn capture_before_streaming_is_not_initialized() {
        let (manager, log) = manager(vec![(0, Failure::Stalled)]);
        let mut stream = manager.acquire().unwrap();
        assert!(!log.borrow().streaming);
        assert!(!stream.is_live());

        assert!(matches!(
            stream.capture_frame(),
            Err(FaceScanError::CameraNotInitialized)
        ));
        assert!(matches!(
            stream.preview_frame(),
            Err(FaceScanError::CameraNotInitialized)
        ));
    }

    #[test]
    fn falls_back_to_next_index() {
        let (manager, log) = manager(vec![(0, Failure::Missing)]);
        let stream = manager.acquire().unwrap();
        assert!(stream.is_live());
        assert!(log.borrow().streaming);
    }

    #[test]
    fn permission_denied_is_reported() {
        let (manager, _) = manager(vec![(0, Failure::Denied)]);
        assert!(matches!(
            manager.acquire(),
            Err(FaceScanError::CameraAccessDenied)
        ));
    }

    #[test]
    fn no_device_is_unavailable() {
        let (manager, _) = manager(vec![(0, Failure::Missing), (1, Failure::Missing)]);
        assert!(matches!(
            manager.acquire(),
            Err(FaceScanError::CameraUnavailable(_))
        ));
    }
}
