//! In-process model of the page the demo renders into.
//!
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, MutexGuard, PoisonError,
};

use anyhow::{bail, Result};
use common::{prediction::Prediction, protocol::PageState};

use crate::canvas::Canvas;

/// Page with a webcam container, a label container and alerts.
#[derive(Default)]
pub struct Page {
    webcam_container: Mutex<Vec<Canvas>>,
    label_container: Mutex<Vec<String>>,
    alerts: Mutex<Vec<String>>,
    running: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a webcam surface into the webcam container.
    pub fn append_canvas(&self, canvas: Canvas) {
        lock(&self.webcam_container).push(canvas);
    }

    /// First surface in the webcam container.
    pub fn canvas(&self) -> Option<Canvas> {
        lock(&self.webcam_container).first().cloned()
    }

    pub fn canvas_count(&self) -> usize {
        lock(&self.webcam_container).len()
    }

    /// Append `count` empty slots to the label container.
    pub fn create_slots(&self, count: usize) {
        let mut slots = lock(&self.label_container);
        slots.extend(std::iter::repeat_with(String::new).take(count));
    }

    /// Write prediction `i` into slot `i`.
    ///
    /// Fails without touching any slot if the number of predictions differs from the number of
    /// slots.
    pub fn render(&self, predictions: &[Prediction]) -> Result<()> {
        let mut slots = lock(&self.label_container);
        if slots.len() != predictions.len() {
            bail!(
                "got {} predictions for {} label slots",
                predictions.len(),
                slots.len()
            );
        }

        for (slot, prediction) in slots.iter_mut().zip(predictions) {
            *slot = prediction.to_string();
        }

        Ok(())
    }

    pub fn slots(&self) -> Vec<String> {
        lock(&self.label_container).clone()
    }

    /// Show a blocking notification to the user.
    pub fn alert(&self, message: impl Into<String>) {
        lock(&self.alerts).push(message.into());
    }

    pub fn alerts(&self) -> Vec<String> {
        lock(&self.alerts).clone()
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Empty both containers. Alerts are kept.
    pub fn clear(&self) {
        lock(&self.webcam_container).clear();
        lock(&self.label_container).clear();
    }

    pub fn state(&self) -> PageState {
        PageState {
            running: self.is_running(),
            slots: self.slots(),
            alerts: self.alerts(),
        }
    }
}
