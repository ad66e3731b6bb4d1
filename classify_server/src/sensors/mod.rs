//! Sensors module.
//!
//! A webcam captures frames from some source and draws them, fitted to its viewport, onto its
//! [`Canvas`].
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use image::RgbImage;

use crate::canvas::{fit_to_viewport, Canvas};

#[cfg(feature = "camera")]
mod camera;
#[cfg(feature = "camera")]
pub use camera::V4lWebcam;

/// Viewport of a webcam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebcamOptions {
    pub width: u32,
    pub height: u32,
    /// Mirror frames horizontally.
    pub flip: bool,
}

impl Default for WebcamOptions {
    fn default() -> Self {
        Self {
            width: 200,
            height: 200,
            flip: true,
        }
    }
}

/// Live video source drawing into a canvas.
pub trait Webcam: Send {
    /// Acquire the device.
    fn setup(&mut self) -> Result<()>;

    /// Start capturing.
    fn play(&mut self) -> Result<()>;

    /// Pull the latest frame onto the canvas.
    fn update(&mut self) -> Result<()>;

    fn canvas(&self) -> &Canvas;
}

/// Constructs webcams for a viewport.
pub trait WebcamProvider: Send + Sync {
    fn create(&self, options: &WebcamOptions) -> Result<Box<dyn Webcam>>;
}

/// Provides webcams reading from a V4L2 device or, for any other source, a still image file.
#[derive(Debug, Clone)]
pub struct SourceWebcams {
    source: String,
}

impl SourceWebcams {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

fn is_video_device(source: &str) -> bool {
    source.starts_with("/dev/video") || source.starts_with("v4l2://")
}

impl WebcamProvider for SourceWebcams {
    fn create(&self, options: &WebcamOptions) -> Result<Box<dyn Webcam>> {
        if options.width == 0 || options.height == 0 {
            bail!(
                "invalid viewport {}x{}, width and height must be positive",
                options.width,
                options.height
            );
        }

        if is_video_device(&self.source) {
            let device = self.source.trim_start_matches("v4l2://");
            return video_device_webcam(device, options);
        }

        log::info!("Using still image {} as webcam", &self.source);
        Ok(Box::new(StillWebcam::new(&self.source, options)))
    }
}

#[cfg(feature = "camera")]
fn video_device_webcam(device: &str, options: &WebcamOptions) -> Result<Box<dyn Webcam>> {
    Ok(Box::new(V4lWebcam::new(device, options)))
}

#[cfg(not(feature = "camera"))]
fn video_device_webcam(device: &str, _options: &WebcamOptions) -> Result<Box<dyn Webcam>> {
    bail!("cannot open {device}: built without camera support (enable the `camera` feature)")
}

/// Webcam showing the same image file on every frame.
pub struct StillWebcam {
    path: PathBuf,
    options: WebcamOptions,
    canvas: Canvas,
    frame: Option<RgbImage>,
    playing: bool,
}

impl StillWebcam {
    pub fn new(path: impl Into<PathBuf>, options: &WebcamOptions) -> Self {
        Self {
            path: path.into(),
            options: *options,
            canvas: Canvas::new(options.width, options.height),
            frame: None,
            playing: false,
        }
    }
}

impl Webcam for StillWebcam {
    fn setup(&mut self) -> Result<()> {
        let image = image::open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?
            .to_rgb8();
        log::debug!(
            "Loaded still frame of {}x{}",
            image.width(),
            image.height()
        );

        self.frame = Some(fit_to_viewport(
            &image,
            self.options.width,
            self.options.height,
            self.options.flip,
        ));

        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        if self.frame.is_none() {
            bail!("webcam is not set up");
        }
        self.playing = true;

        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        match (&self.frame, self.playing) {
            (Some(frame), true) => {
                self.canvas.draw(frame.clone());
                Ok(())
            }
            _ => bail!("webcam is not playing"),
        }
    }

    fn canvas(&self) -> &Canvas {
        &self.canvas
    }
}
