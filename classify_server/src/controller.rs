//! Session orchestration: model and webcam acquisition, then the prediction loop.
//!
use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::DemoConfig,
    meter::METER,
    nn::{ImageModel, ModelLoader},
    page::Page,
    sensors::{Webcam, WebcamProvider},
};

/// Failure that ends a Start attempt.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("failed to load model: {0:#}")]
    ModelLoad(anyhow::Error),
    #[error("failed to set up webcam: {0:#}")]
    Webcam(anyhow::Error),
    #[error("demo is shutting down")]
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { class_count: usize },
    AlreadyRunning { class_count: usize },
}

struct Session {
    class_count: usize,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Session {
    fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| handle.is_finished())
    }
}

/// Runs at most one classification session on a page.
pub struct DemoController {
    config: DemoConfig,
    loader: Arc<dyn ModelLoader>,
    webcams: Arc<dyn WebcamProvider>,
    page: Arc<Page>,
    session: Mutex<Option<Session>>,
    shutdown: CancellationToken,
}

impl DemoController {
    pub fn new(
        config: DemoConfig,
        loader: Arc<dyn ModelLoader>,
        webcams: Arc<dyn WebcamProvider>,
    ) -> Self {
        Self {
            config,
            loader,
            webcams,
            page: Arc::new(Page::new()),
            session: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    /// Token cancelling every session of this controller.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Handle the Start action.
    ///
    /// A no-op while a session is running. A stopped or finished session is torn down first.
    /// Failures are logged, alerted on the page and returned; the loop is then not started.
    /// Refused once the shutdown token is cancelled.
    pub async fn start(&self) -> Result<StartOutcome, InitError> {
        let mut session = self.session.lock().await;

        if self.shutdown.is_cancelled() {
            log::warn!("Ignoring Start during shutdown");
            return Err(InitError::ShuttingDown);
        }

        if let Some(running) = session.as_ref().filter(|s| !s.is_finished()) {
            log::info!("Session already running, ignoring Start");
            return Ok(StartOutcome::AlreadyRunning {
                class_count: running.class_count,
            });
        }

        if let Some(finished) = session.take() {
            log::info!("Tearing down finished session");
            finished.cancel.cancel();
        }
        // A stopped session leaves its canvas and slots behind
        self.page.clear();

        match self.init().await {
            Ok(new_session) => {
                let class_count = new_session.class_count;
                *session = Some(new_session);
                Ok(StartOutcome::Started { class_count })
            }
            Err(err) => {
                log::error!("Error loading model or setting up webcam: {err}");
                self.page.alert(format!("Error: {err}"));
                Err(err)
            }
        }
    }

    async fn init(&self) -> Result<Session, InitError> {
        let model_url = self.config.model_url().map_err(InitError::ModelLoad)?;
        let metadata_url = self.config.metadata_url().map_err(InitError::ModelLoad)?;

        log::info!("Loading model...");
        let model = self
            .loader
            .load(&model_url, &metadata_url)
            .await
            .map_err(InitError::ModelLoad)?;
        let class_count = model.total_classes();

        log::info!("Setting up webcam...");
        let mut webcam = self
            .webcams
            .create(&self.config.webcam)
            .map_err(InitError::Webcam)?;
        let webcam = tokio::task::spawn_blocking(move || {
            webcam.setup()?;
            webcam.play()?;
            Ok::<_, anyhow::Error>(webcam)
        })
        .await
        .map_err(|err| InitError::Webcam(err.into()))?
        .map_err(InitError::Webcam)?;
        log::info!("Webcam initialized successfully.");

        self.page.append_canvas(webcam.canvas().clone());
        self.page.create_slots(class_count);
        self.page.set_running(true);

        let cancel = self.shutdown.child_token();
        let frame_loop = FrameLoop {
            model,
            webcam,
            page: Arc::clone(&self.page),
            frame_period: self.config.frame_period(),
            max_frames: self.config.max_frames,
        };
        let handle = tokio::spawn(frame_loop.run(cancel.clone()));

        Ok(Session {
            class_count,
            cancel,
            handle: Some(handle),
        })
    }

    /// Cancel the running session and wait for its loop to end.
    pub async fn stop(&self) {
        let mut session = self.session.lock().await;
        if let Some(mut running) = session.take() {
            running.cancel.cancel();
            if let Some(handle) = running.handle.take() {
                if let Err(err) = handle.await {
                    log::error!("Frame loop ended abnormally: {err}");
                }
            }
            log::info!("Session stopped");
        }
    }

    /// Wait until the loop of the current session ends on its own.
    ///
    /// Blocks further Start actions meanwhile, so only use it on bounded sessions.
    pub async fn wait_until_finished(&self) {
        let mut session = self.session.lock().await;
        if let Some(handle) = session.as_mut().and_then(|s| s.handle.take()) {
            if let Err(err) = handle.await {
                log::error!("Frame loop ended abnormally: {err}");
            }
        }
    }
}

/// State owned by the prediction loop of one session.
struct FrameLoop {
    model: Arc<dyn ImageModel>,
    webcam: Box<dyn Webcam>,
    page: Arc<Page>,
    frame_period: Duration,
    max_frames: Option<u64>,
}

impl FrameLoop {
    async fn run(mut self, cancel: CancellationToken) {
        let page = Arc::clone(&self.page);
        let mut frame_clock = interval(self.frame_period);
        frame_clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut frame_index = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::info!("Frame loop cancelled after {frame_index} frames");
                    break;
                }
                _ = frame_clock.tick() => {}
            }

            frame_index += 1;
            METER.tick_frame();

            // Webcam capture and inference block, keep them off the runtime threads
            let step = tokio::task::spawn_blocking(move || {
                let outcome = self.step();
                (self, outcome)
            })
            .await;

            self = match step {
                Ok((this, Ok(()))) => {
                    METER.tick_predicted();
                    this
                }
                Ok((this, Err(err))) => {
                    METER.tick_failed();
                    log::error!("Error during prediction: {err:#}");
                    this
                }
                Err(err) => {
                    log::error!("Frame {frame_index} panicked: {err}");
                    break;
                }
            };

            if self.max_frames.map_or(false, |max| frame_index >= max) {
                log::info!("Reached {frame_index} frames, leaving frame loop");
                break;
            }
        }

        page.set_running(false);
    }

    /// One iteration: refresh the frame, then predict and render.
    fn step(&mut self) -> Result<()> {
        self.webcam
            .update()
            .context("failed to refresh webcam frame")?;
        self.predict_and_render()
    }

    /// Slots are only written if the whole prediction succeeded.
    fn predict_and_render(&self) -> Result<()> {
        let frame = self.webcam.canvas().snapshot();
        let predictions = self.model.predict(&frame)?;
        self.page.render(&predictions)
    }
}
