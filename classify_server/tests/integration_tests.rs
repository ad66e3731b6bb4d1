use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use classify_server::{
    canvas::Canvas,
    config::DemoConfig,
    controller::{DemoController, InitError, StartOutcome},
    nn::{predictions_from_scores, ImageModel, ModelLoader},
    sensors::{Webcam, WebcamOptions, WebcamProvider},
    utils::ResourceLocation,
};
use common::prediction::Prediction;
use futures::future::BoxFuture;
use image::RgbImage;

/// Model replaying scripted scores; `None` makes that call fail. The last entry repeats.
struct FakeModel {
    labels: Vec<String>,
    script: Vec<Option<Vec<f32>>>,
    calls: AtomicUsize,
}

impl FakeModel {
    fn new(script: Vec<Option<Vec<f32>>>) -> Arc<Self> {
        Arc::new(Self {
            labels: vec!["Class 1".into(), "Class 2".into(), "Class 3".into()],
            script,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageModel for FakeModel {
    fn predict(&self, _frame: &RgbImage) -> Result<Vec<Prediction>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script[call.min(self.script.len() - 1)] {
            Some(scores) => predictions_from_scores(&self.labels, scores),
            None => bail!("inference failed"),
        }
    }

    fn class_labels(&self) -> &[String] {
        &self.labels
    }
}

struct FakeLoader {
    model: Arc<FakeModel>,
    failures_left: AtomicUsize,
}

impl FakeLoader {
    fn new(model: Arc<FakeModel>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            model,
            failures_left: AtomicUsize::new(failures),
        })
    }
}

impl ModelLoader for FakeLoader {
    fn load<'a>(
        &'a self,
        _model_url: &'a ResourceLocation,
        _metadata_url: &'a ResourceLocation,
    ) -> BoxFuture<'a, Result<Arc<dyn ImageModel>>> {
        Box::pin(async move {
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(anyhow!("network failure fetching model"));
            }
            Ok(Arc::clone(&self.model) as Arc<dyn ImageModel>)
        })
    }
}

struct FakeWebcam {
    canvas: Canvas,
    fail_setup: bool,
    playing: bool,
}

impl Webcam for FakeWebcam {
    fn setup(&mut self) -> Result<()> {
        if self.fail_setup {
            bail!("permission denied");
        }
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.playing = true;
        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        if !self.playing {
            bail!("webcam is not playing");
        }
        self.canvas
            .draw(RgbImage::new(self.canvas.width(), self.canvas.height()));
        Ok(())
    }

    fn canvas(&self) -> &Canvas {
        &self.canvas
    }
}

struct FakeWebcams {
    fail_setup: bool,
    created: AtomicUsize,
}

impl FakeWebcams {
    fn new(fail_setup: bool) -> Arc<Self> {
        Arc::new(Self {
            fail_setup,
            created: AtomicUsize::new(0),
        })
    }

    fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl WebcamProvider for FakeWebcams {
    fn create(&self, options: &WebcamOptions) -> Result<Box<dyn Webcam>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeWebcam {
            canvas: Canvas::new(options.width, options.height),
            fail_setup: self.fail_setup,
            playing: false,
        }))
    }
}

fn config(max_frames: Option<u64>) -> DemoConfig {
    DemoConfig {
        frame_rate: 1000,
        max_frames,
        ..Default::default()
    }
}

fn scores_a() -> Option<Vec<f32>> {
    Some(vec![0.1, 0.2, 0.7])
}

fn scores_b() -> Option<Vec<f32>> {
    Some(vec![0.999, 0.0, 0.001])
}

const LINES_A: [&str; 3] = ["Class 1: 0.10", "Class 2: 0.20", "Class 3: 0.70"];
const LINES_B: [&str; 3] = ["Class 1: 1.00", "Class 2: 0.00", "Class 3: 0.00"];

#[tokio::test]
async fn test_start_renders_every_class() {
    let model = FakeModel::new(vec![scores_a()]);
    let webcams = FakeWebcams::new(false);
    let controller = DemoController::new(
        config(Some(3)),
        FakeLoader::new(model.clone(), 0),
        webcams.clone(),
    );

    let outcome = controller.start().await.expect("start");
    assert_eq!(outcome, StartOutcome::Started { class_count: 3 });
    controller.wait_until_finished().await;

    let page = controller.page();
    assert_eq!(page.canvas_count(), 1);
    assert_eq!(page.slots(), LINES_A);
    assert!(page.alerts().is_empty());
    assert!(!page.is_running());
    assert_eq!(model.calls(), 3);
    assert_eq!(webcams.created(), 1);
}

#[tokio::test]
async fn test_model_failure_skips_webcam() {
    let model = FakeModel::new(vec![scores_a()]);
    let webcams = FakeWebcams::new(false);
    let controller = DemoController::new(
        config(None),
        FakeLoader::new(model.clone(), 1),
        webcams.clone(),
    );

    let err = controller.start().await.expect_err("model load fails");
    assert!(matches!(err, InitError::ModelLoad(_)));

    let page = controller.page();
    assert_eq!(webcams.created(), 0);
    assert_eq!(page.alerts().len(), 1);
    assert!(page.alerts()[0].starts_with("Error: failed to load model"));
    assert_eq!(page.canvas_count(), 0);
    assert!(page.slots().is_empty());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_webcam_failure_skips_loop() {
    let model = FakeModel::new(vec![scores_a()]);
    let controller = DemoController::new(
        config(None),
        FakeLoader::new(model.clone(), 0),
        FakeWebcams::new(true),
    );

    let err = controller.start().await.expect_err("webcam setup fails");
    assert!(matches!(err, InitError::Webcam(_)));

    let page = controller.page();
    assert_eq!(page.alerts(), ["Error: failed to set up webcam: permission denied"]);
    assert_eq!(page.canvas_count(), 0);
    assert!(page.slots().is_empty());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_failed_frame_keeps_previous_text() {
    let model = FakeModel::new(vec![scores_a(), None]);
    let controller = DemoController::new(
        config(Some(2)),
        FakeLoader::new(model.clone(), 0),
        FakeWebcams::new(false),
    );

    controller.start().await.expect("start");
    controller.wait_until_finished().await;

    assert_eq!(model.calls(), 2);
    assert_eq!(controller.page().slots(), LINES_A);
    assert!(controller.page().alerts().is_empty());
}

#[tokio::test]
async fn test_loop_continues_after_failed_frame() {
    let model = FakeModel::new(vec![scores_a(), None, scores_b()]);
    let controller = DemoController::new(
        config(Some(3)),
        FakeLoader::new(model.clone(), 0),
        FakeWebcams::new(false),
    );

    controller.start().await.expect("start");
    controller.wait_until_finished().await;

    assert_eq!(model.calls(), 3);
    assert_eq!(controller.page().slots(), LINES_B);
}

#[tokio::test]
async fn test_second_start_is_noop() {
    let webcams = FakeWebcams::new(false);
    let controller = DemoController::new(
        config(None),
        FakeLoader::new(FakeModel::new(vec![scores_a()]), 0),
        webcams.clone(),
    );

    assert_eq!(
        controller.start().await.expect("start"),
        StartOutcome::Started { class_count: 3 }
    );
    assert_eq!(
        controller.start().await.expect("start"),
        StartOutcome::AlreadyRunning { class_count: 3 }
    );

    assert_eq!(webcams.created(), 1);
    assert_eq!(controller.page().canvas_count(), 1);
    assert_eq!(controller.page().slots().len(), 3);

    controller.stop().await;
    assert!(!controller.page().is_running());
}

#[tokio::test]
async fn test_concurrent_starts_acquire_one_webcam() {
    let webcams = FakeWebcams::new(false);
    let controller = DemoController::new(
        config(None),
        FakeLoader::new(FakeModel::new(vec![scores_a()]), 0),
        webcams.clone(),
    );

    let (first, second) = tokio::join!(controller.start(), controller.start());
    let mut outcomes = vec![first.expect("start"), second.expect("start")];
    outcomes.sort_by_key(|outcome| matches!(outcome, StartOutcome::AlreadyRunning { .. }));
    assert_eq!(
        outcomes,
        [
            StartOutcome::Started { class_count: 3 },
            StartOutcome::AlreadyRunning { class_count: 3 }
        ]
    );
    assert_eq!(webcams.created(), 1);
    assert_eq!(controller.page().canvas_count(), 1);

    controller.stop().await;
}

#[tokio::test]
async fn test_start_again_after_failure() {
    let controller = DemoController::new(
        config(Some(1)),
        FakeLoader::new(FakeModel::new(vec![scores_a()]), 1),
        FakeWebcams::new(false),
    );

    assert!(controller.start().await.is_err());
    assert_eq!(
        controller.start().await.expect("start"),
        StartOutcome::Started { class_count: 3 }
    );
    controller.wait_until_finished().await;

    let page = controller.page();
    assert_eq!(page.alerts().len(), 1);
    assert_eq!(page.canvas_count(), 1);
    assert_eq!(page.slots(), LINES_A);
}

#[tokio::test]
async fn test_start_after_finished_session_replaces_it() {
    let webcams = FakeWebcams::new(false);
    let controller = DemoController::new(
        config(Some(1)),
        FakeLoader::new(FakeModel::new(vec![scores_a()]), 0),
        webcams.clone(),
    );

    controller.start().await.expect("start");
    controller.wait_until_finished().await;
    assert_eq!(
        controller.start().await.expect("start"),
        StartOutcome::Started { class_count: 3 }
    );
    controller.wait_until_finished().await;

    assert_eq!(webcams.created(), 2);
    assert_eq!(controller.page().canvas_count(), 1);
    assert_eq!(controller.page().slots(), LINES_A);
}

#[tokio::test]
async fn test_stop_halts_loop() {
    let model = FakeModel::new(vec![scores_a()]);
    let controller = DemoController::new(
        config(None),
        FakeLoader::new(model.clone(), 0),
        FakeWebcams::new(false),
    );

    controller.start().await.expect("start");
    assert!(controller.page().is_running());
    tokio::time::sleep(Duration::from_millis(20)).await;

    controller.stop().await;
    let calls = model.calls();
    assert!(calls > 0);
    assert!(!controller.page().is_running());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(model.calls(), calls);
}

#[tokio::test]
async fn test_shutdown_token_cancels_loop() {
    let controller = DemoController::new(
        config(None),
        FakeLoader::new(FakeModel::new(vec![scores_a()]), 0),
        FakeWebcams::new(false),
    );

    controller.start().await.expect("start");
    controller.shutdown_token().cancel();
    controller.wait_until_finished().await;

    assert!(!controller.page().is_running());
}

#[tokio::test]
async fn test_start_after_stop_replaces_session() {
    let webcams = FakeWebcams::new(false);
    let controller = DemoController::new(
        config(None),
        FakeLoader::new(FakeModel::new(vec![scores_a()]), 0),
        webcams.clone(),
    );

    controller.start().await.expect("start");
    controller.stop().await;
    assert_eq!(
        controller.start().await.expect("start"),
        StartOutcome::Started { class_count: 3 }
    );
    tokio::time::sleep(Duration::from_millis(30)).await;

    let page = controller.page();
    assert_eq!(webcams.created(), 2);
    assert_eq!(page.canvas_count(), 1);
    assert_eq!(page.slots(), LINES_A);
    assert!(page.is_running());

    controller.stop().await;
}

#[tokio::test]
async fn test_start_refused_after_shutdown() {
    let webcams = FakeWebcams::new(false);
    let controller = DemoController::new(
        config(None),
        FakeLoader::new(FakeModel::new(vec![scores_a()]), 0),
        webcams.clone(),
    );

    controller.start().await.expect("start");
    controller.shutdown_token().cancel();
    controller.wait_until_finished().await;

    let err = controller.start().await.expect_err("shutting down");
    assert!(matches!(err, InitError::ShuttingDown));
    assert_eq!(webcams.created(), 1);
    assert_eq!(controller.page().canvas_count(), 1);
    assert!(!controller.page().is_running());
}
