use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::{Duration, Instant};

use image::RgbImage;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};

use crate::error::AcquisitionError;
use crate::settings::CameraSettings;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "eyecare::camera";

use crate::{log_debug, log_info, log_warn};

/// How long a freshly opened device gets to deliver its first frame.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(10);
const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(30);

/// A live capture device. Dropping or stopping it releases the hardware.
pub trait VideoStream: Send + 'static {
    /// Latest decoded frame, `None` until the device has produced one.
    fn current_frame(&self) -> Option<Arc<RgbImage>>;

    fn stop(&mut self);
}

pub trait CameraSource: Send + Sync + 'static {
    type Stream: VideoStream;

    fn acquire(&self) -> impl Future<Output = Result<Self::Stream, AcquisitionError>> + Send;
}

/// Webcam opened through OpenCV's `videoio` backend.
#[derive(Debug, Clone)]
pub struct OpenCvCamera {
    settings: CameraSettings,
}

impl OpenCvCamera {
    pub fn new(settings: CameraSettings) -> Self {
        Self { settings }
    }

    fn open_blocking(&self) -> Result<(VideoCapture, RgbImage), AcquisitionError> {
        let index = self.settings.device_index;

        let mut capture = VideoCapture::new(index, videoio::CAP_ANY)
            .map_err(|err| classify_device_error(index, &err.message))?;
        let opened = capture
            .is_opened()
            .map_err(|err| classify_device_error(index, &err.message))?;
        if !opened {
            return Err(AcquisitionError::Unavailable(format!(
                "camera {index} could not be opened"
            )));
        }

        let requested = [
            (videoio::CAP_PROP_FRAME_WIDTH, f64::from(self.settings.capture_width)),
            (videoio::CAP_PROP_FRAME_HEIGHT, f64::from(self.settings.capture_height)),
            (videoio::CAP_PROP_FPS, f64::from(self.settings.capture_fps)),
        ];
        for (property, value) in requested {
            if !capture.set(property, value).unwrap_or(false) {
                log_debug!("camera {index} ignored property {property} = {value}");
            }
        }

        let deadline = Instant::now() + FIRST_FRAME_TIMEOUT;
        let mut frame = Mat::default();
        loop {
            match read_rgb(&mut capture, &mut frame) {
                Ok(Some(first)) => {
                    log_info!(
                        "camera {} streaming at {}x{}",
                        index,
                        first.width(),
                        first.height()
                    );
                    return Ok((capture, first));
                }
                Ok(None) => {}
                Err(err) => log_debug!("camera {index} read failed while warming up: {err}"),
            }

            if Instant::now() >= deadline {
                let _ = capture.release();
                return Err(AcquisitionError::Unavailable(format!(
                    "no frame from camera {index} within {}s",
                    FIRST_FRAME_TIMEOUT.as_secs()
                )));
            }
            thread::sleep(EMPTY_READ_BACKOFF);
        }
    }
}

impl CameraSource for OpenCvCamera {
    type Stream = OpenCvStream;

    async fn acquire(&self) -> Result<OpenCvStream, AcquisitionError> {
        let camera = self.clone();
        let (capture, first) = tokio::task::spawn_blocking(move || camera.open_blocking())
            .await
            .map_err(|err| AcquisitionError::Unavailable(format!("camera worker join failed: {err}")))??;

        OpenCvStream::spawn(capture, first, self.settings.device_index)
    }
}

fn classify_device_error(index: i32, detail: &str) -> AcquisitionError {
    let lowered = detail.to_ascii_lowercase();
    if lowered.contains("permission") || lowered.contains("not authorized") {
        AcquisitionError::Denied(format!("camera {index}: {detail}"))
    } else {
        AcquisitionError::Unavailable(format!("camera {index}: {detail}"))
    }
}

/// `Ok(None)` when the device handed back no picture this time.
fn read_rgb(capture: &mut VideoCapture, frame: &mut Mat) -> opencv::Result<Option<RgbImage>> {
    if !capture.read(frame)? || frame.empty() {
        return Ok(None);
    }
    bgr_to_rgb(frame)
}

/// OpenCV delivers BGR; the sampler works on `RgbImage`.
fn bgr_to_rgb(frame: &Mat) -> opencv::Result<Option<RgbImage>> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

    let (width, height) = (rgb.cols(), rgb.rows());
    if width <= 0 || height <= 0 {
        return Ok(None);
    }
    let bytes = rgb.data_bytes()?.to_vec();
    Ok(RgbImage::from_raw(width as u32, height as u32, bytes))
}

/// Open device plus the grabber thread that keeps `latest` fresh. The thread
/// owns the `VideoCapture` and releases it when told to stop.
pub struct OpenCvStream {
    latest: Arc<Mutex<Option<Arc<RgbImage>>>>,
    live: Arc<AtomicBool>,
    grabber: Option<thread::JoinHandle<()>>,
}

impl OpenCvStream {
    fn spawn(
        mut capture: VideoCapture,
        first: RgbImage,
        index: i32,
    ) -> Result<Self, AcquisitionError> {
        let latest = Arc::new(Mutex::new(Some(Arc::new(first))));
        let live = Arc::new(AtomicBool::new(true));

        let thread_latest = latest.clone();
        let thread_live = live.clone();
        let grabber = thread::Builder::new()
            .name("camera-grabber".to_string())
            .spawn(move || {
                let mut frame = Mat::default();
                let mut frames: u64 = 1;

                while thread_live.load(Ordering::SeqCst) {
                    match read_rgb(&mut capture, &mut frame) {
                        Ok(Some(image)) => {
                            if let Ok(mut guard) = thread_latest.lock() {
                                *guard = Some(Arc::new(image));
                            }
                            frames += 1;
                        }
                        Ok(None) => thread::sleep(EMPTY_READ_BACKOFF),
                        Err(err) => {
                            log_warn!("camera {index} read failed: {err}");
                            break;
                        }
                    }
                }

                thread_live.store(false, Ordering::SeqCst);
                if let Err(err) = capture.release() {
                    log_debug!("camera {index} release failed: {err}");
                }
                log_info!("camera {index} released after {frames} frames");
            })
            .map_err(|err| AcquisitionError::Unavailable(format!("camera grabber: {err}")))?;

        Ok(Self {
            latest,
            live,
            grabber: Some(grabber),
        })
    }

    pub fn is_live(&self) -> bool {
        self.grabber.is_some() && self.live.load(Ordering::SeqCst)
    }
}

impl VideoStream for OpenCvStream {
    /// Stale frames are not served once the device has stopped.
    fn current_frame(&self) -> Option<Arc<RgbImage>> {
        if !self.is_live() {
            return None;
        }
        self.latest.lock().ok().and_then(|guard| guard.clone())
    }

    fn stop(&mut self) {
        self.live.store(false, Ordering::SeqCst);
        // Bounded by one frame read.
        if let Some(grabber) = self.grabber.take() {
            if grabber.join().is_err() {
                log_warn!("camera grabber panicked");
            }
        }
        if let Ok(mut guard) = self.latest.lock() {
            *guard = None;
        }
    }
}

impl Drop for OpenCvStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use opencv::core::{Scalar, CV_8UC3};

    use super::*;

    #[test]
    fn device_errors_are_classified() {
        assert!(matches!(
            classify_device_error(0, "Permission denied"),
            AcquisitionError::Denied(_)
        ));
        assert!(matches!(
            classify_device_error(0, "camera access has not authorized"),
            AcquisitionError::Denied(_)
        ));
        assert!(matches!(
            classify_device_error(3, "can't open camera by index"),
            AcquisitionError::Unavailable(_)
        ));
    }

    #[test]
    fn bgr_frames_become_rgb_images() {
        // Pure blue in OpenCV's channel order.
        let frame =
            Mat::new_rows_cols_with_default(2, 3, CV_8UC3, Scalar::new(255.0, 0.0, 0.0, 0.0))
                .unwrap();
        let image = bgr_to_rgb(&frame).unwrap().unwrap();

        assert_eq!(image.dimensions(), (3, 2));
        assert!(image.pixels().all(|p| p.0 == [0, 0, 255]));
    }

    #[test]
    fn empty_mat_is_rejected_by_conversion() {
        let frame = Mat::default();
        assert!(frame.empty());
        assert!(bgr_to_rgb(&frame).is_err());
    }
}
