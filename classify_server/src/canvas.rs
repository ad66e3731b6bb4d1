//! Drawing surface shared between a webcam and the page showing it.
//!
use std::sync::Arc;

use image::{imageops, RgbImage};
use tokio::sync::watch;

/// Fixed-size canvas holding the latest frame drawn by a webcam.
///
/// Clones refer to the same surface. Readers take cheap snapshots or subscribe to redraws.
#[derive(Clone)]
pub struct Canvas {
    width: u32,
    height: u32,
    frame_tx: Arc<watch::Sender<Arc<RgbImage>>>,
}

impl Canvas {
    /// Create a blank canvas.
    pub fn new(width: u32, height: u32) -> Self {
        let (frame_tx, _) = watch::channel(Arc::new(RgbImage::new(width, height)));
        Self {
            width,
            height,
            frame_tx: Arc::new(frame_tx),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Replace the canvas content. The frame must already have the canvas size.
    pub fn draw(&self, frame: RgbImage) {
        debug_assert_eq!(frame.dimensions(), (self.width, self.height));
        self.frame_tx.send_replace(Arc::new(frame));
    }

    /// Current content of the canvas.
    pub fn snapshot(&self) -> Arc<RgbImage> {
        Arc::clone(&self.frame_tx.borrow())
    }

    /// Receiver notified on every redraw.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RgbImage>> {
        self.frame_tx.subscribe()
    }

    /// Whether both handles refer to the same surface.
    pub fn is_same_surface(&self, other: &Canvas) -> bool {
        Arc::ptr_eq(&self.frame_tx, &other.frame_tx)
    }
}

/// Fit a captured frame into a viewport.
///
/// Takes the largest centred region with the viewport's aspect ratio, resizes it to the viewport
/// and mirrors it horizontally if `flip` is set.
pub fn fit_to_viewport(frame: &RgbImage, width: u32, height: u32, flip: bool) -> RgbImage {
    if width == 0 || height == 0 {
        return RgbImage::new(width, height);
    }

    let (src_width, src_height) = frame.dimensions();
    let (crop_width, crop_height) =
        if u64::from(src_width) * u64::from(height) > u64::from(src_height) * u64::from(width) {
            // Wider than the viewport, cut left and right
            let crop_width = u64::from(src_height) * u64::from(width) / u64::from(height);
            (crop_width as u32, src_height)
        } else {
            let crop_height = u64::from(src_width) * u64::from(height) / u64::from(width);
            (src_width, crop_height as u32)
        };

    if crop_width == 0 || crop_height == 0 {
        return RgbImage::new(width, height);
    }

    let x = (src_width - crop_width) / 2;
    let y = (src_height - crop_height) / 2;
    let cropped = imageops::crop_imm(frame, x, y, crop_width, crop_height).to_image();

    let mut fitted = imageops::resize(&cropped, width, height, imageops::FilterType::Triangle);
    if flip {
        imageops::flip_horizontal_in_place(&mut fitted);
    }

    fitted
}
