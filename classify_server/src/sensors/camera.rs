//! V4L2 webcam backed by `rscam`.
//!
use anyhow::{anyhow, bail, Context, Result};
use image::ImageFormat;
use rscam::{Camera, Config};

use super::{Webcam, WebcamOptions};
use crate::canvas::{fit_to_viewport, Canvas};

const FORMAT: &[u8] = b"MJPG";

/// Webcam reading MJPG frames from a video device.
pub struct V4lWebcam {
    device: String,
    options: WebcamOptions,
    canvas: Canvas,
    camera: Option<Camera>,
    resolution: (u32, u32),
    interval: (u32, u32),
    playing: bool,
}

impl V4lWebcam {
    pub fn new(device: &str, options: &WebcamOptions) -> Self {
        Self {
            device: device.to_owned(),
            options: *options,
            canvas: Canvas::new(options.width, options.height),
            camera: None,
            resolution: (0, 0),
            interval: (0, 0),
            playing: false,
        }
    }
}

impl Webcam for V4lWebcam {
    fn setup(&mut self) -> Result<()> {
        let cam = Camera::new(&self.device)
            .with_context(|| format!("failed to open camera {}", &self.device))?;
        log_supported_formats(&cam);

        self.resolution = get_max_resolution(&cam, FORMAT)?;
        self.interval = get_max_frame_rate(&cam, FORMAT, self.resolution)?;
        log::info!(
            "Using camera {} at {:?} with interval {:?}",
            &self.device,
            self.resolution,
            self.interval
        );

        self.camera = Some(cam);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let cam = self
            .camera
            .as_mut()
            .ok_or_else(|| anyhow!("webcam is not set up"))?;

        cam.start(&Config {
            interval: self.interval,
            resolution: self.resolution,
            format: FORMAT,
            ..Default::default()
        })?;
        self.playing = true;

        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        let cam = match (self.camera.as_ref(), self.playing) {
            (Some(cam), true) => cam,
            _ => bail!("webcam is not playing"),
        };

        let frame = cam.capture()?;
        let image = image::load_from_memory_with_format(&frame[..], ImageFormat::Jpeg)?.to_rgb8();
        self.canvas.draw(fit_to_viewport(
            &image,
            self.options.width,
            self.options.height,
            self.options.flip,
        ));

        Ok(())
    }

    fn canvas(&self) -> &Canvas {
        &self.canvas
    }
}

/// Get the maximum supported resolution for the given format.
fn get_max_resolution(cam: &Camera, format: &[u8]) -> Result<(u32, u32)> {
    let resolution_info = cam.resolutions(format)?;
    log::debug!("Found resolutions: {:?}", &resolution_info);
    match resolution_info {
        rscam::ResolutionInfo::Discretes(resolutions) => resolutions
            .into_iter()
            // Highest number of pixels
            .max_by_key(|(width, height)| u64::from(*width) * u64::from(*height)),
        rscam::ResolutionInfo::Stepwise { max, .. } => Some(max),
    }
    .ok_or_else(|| anyhow!("no resolution found"))
}

/// Get the shortest frame interval for the given format and resolution.
fn get_max_frame_rate(cam: &Camera, format: &[u8], resolution: (u32, u32)) -> Result<(u32, u32)> {
    let interval_info = cam.intervals(format, resolution)?;
    log::debug!("Found frame intervals: {:?}", &interval_info);
    match interval_info {
        // An interval (n, d) lasts n/d seconds
        rscam::IntervalInfo::Discretes(intervals) => intervals
            .into_iter()
            .filter(|(n, _)| *n > 0)
            .max_by(|a, b| (a.1 as f64 / a.0 as f64).total_cmp(&(b.1 as f64 / b.0 as f64))),
        rscam::IntervalInfo::Stepwise { min, .. } => Some(min),
    }
    .ok_or_else(|| anyhow!("no frame rate found"))
}

fn log_supported_formats(cam: &Camera) {
    let formats: Vec<_> = cam.formats().filter_map(|fmt| fmt.ok()).collect();
    log::debug!(
        "Supported formats: {:?}, using format {:?}",
        formats,
        String::from_utf8_lossy(FORMAT)
    );
}
