//! Image classification models.
//!
use std::{io::Cursor, sync::Arc};

use anyhow::{bail, Context, Result};
use common::prediction::Prediction;
use futures::future::BoxFuture;
use image::RgbImage;
use reqwest::Client;
use serde::Deserialize;
use tract_onnx::prelude::*;

use crate::{canvas::fit_to_viewport, utils::ResourceLocation};

type NnModel = TypedRunnableModel<TypedModel>;

/// Classifier producing one probability per class.
pub trait ImageModel: Send + Sync {
    /// Probabilities for every class, in class order.
    fn predict(&self, frame: &RgbImage) -> Result<Vec<Prediction>>;

    fn total_classes(&self) -> usize {
        self.class_labels().len()
    }

    fn class_labels(&self) -> &[String];
}

/// Loads a model from its topology and metadata descriptors.
pub trait ModelLoader: Send + Sync {
    fn load<'a>(
        &'a self,
        model_url: &'a ResourceLocation,
        metadata_url: &'a ResourceLocation,
    ) -> BoxFuture<'a, Result<Arc<dyn ImageModel>>>;
}

fn default_image_size() -> u32 {
    224
}

/// Content of `metadata.json` exported alongside a teachable-machine model.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub tfjs_version: Option<String>,
    #[serde(default)]
    pub tm_version: Option<String>,
    #[serde(default)]
    pub package_version: Option<String>,
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub time_stamp: Option<String>,
    #[serde(default)]
    pub user_metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub model_name: Option<String>,
    pub labels: Vec<String>,
    #[serde(default = "default_image_size")]
    pub image_size: u32,
}

impl Metadata {
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let metadata: Metadata =
            serde_json::from_slice(data).context("malformed model metadata")?;
        if metadata.labels.is_empty() {
            bail!("model metadata lists no labels");
        }
        if metadata.image_size == 0 {
            bail!("model metadata has an image size of zero");
        }

        Ok(metadata)
    }
}

/// Memory layout of the input tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TensorLayout {
    /// `[1, height, width, 3]`, as exported from Keras
    #[default]
    Nhwc,
    /// `[1, 3, height, width]`
    Nchw,
}

/// Teachable-machine image model running on tract.
pub struct TmModel {
    model: NnModel,
    metadata: Metadata,
    layout: TensorLayout,
}

impl TmModel {
    /// Build the model from the bytes of an ONNX graph.
    pub fn from_onnx(topology: &[u8], metadata: Metadata, layout: TensorLayout) -> Result<Self> {
        let size = metadata.image_size as usize;
        let shape = match layout {
            TensorLayout::Nhwc => tvec!(1, size, size, 3),
            TensorLayout::Nchw => tvec!(1, 3, size, size),
        };
        let input_fact = InferenceFact::dt_shape(f32::datum_type(), shape);

        let optimized = tract_onnx::onnx()
            .model_for_read(&mut Cursor::new(topology))?
            .with_input_fact(0, input_fact)?
            .into_optimized()?;

        let output_fact = optimized.output_fact(0)?;
        if let Some(shape) = output_fact.shape.as_concrete() {
            let num_scores: usize = shape.iter().product();
            if num_scores != metadata.labels.len() {
                bail!(
                    "model has {} outputs but metadata lists {} labels",
                    num_scores,
                    metadata.labels.len()
                );
            }
        }

        let model = optimized.into_runnable()?;
        Ok(Self {
            model,
            metadata,
            layout,
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

impl ImageModel for TmModel {
    fn predict(&self, frame: &RgbImage) -> Result<Vec<Prediction>> {
        let input = to_input_tensor(frame, self.metadata.image_size, self.layout);
        let raw_nn_out = self.model.run(tvec!(input.into()))?;

        let scores: Vec<f32> = raw_nn_out
            .first()
            .context("model produced no output")?
            .to_array_view::<f32>()?
            .iter()
            .copied()
            .collect();

        predictions_from_scores(&self.metadata.labels, &scores)
    }

    fn class_labels(&self) -> &[String] {
        &self.metadata.labels
    }
}

/// Crop the frame to a centred square of `size` pixels and scale channels to `[-1, 1]`.
pub fn to_input_tensor(frame: &RgbImage, size: u32, layout: TensorLayout) -> Tensor {
    let square = fit_to_viewport(frame, size, size, false);
    let size = size as usize;
    let normalize = |value: u8| f32::from(value) / 127.5 - 1.0;

    match layout {
        TensorLayout::Nhwc => {
            tract_ndarray::Array4::from_shape_fn((1, size, size, 3), |(_, y, x, c)| {
                normalize(square[(x as _, y as _)][c])
            })
            .into()
        }
        TensorLayout::Nchw => {
            tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
                normalize(square[(x as _, y as _)][c])
            })
            .into()
        }
    }
}

/// Pair each score with its label, keeping class order.
pub fn predictions_from_scores(labels: &[String], scores: &[f32]) -> Result<Vec<Prediction>> {
    if labels.len() != scores.len() {
        bail!(
            "model returned {} scores for {} classes",
            scores.len(),
            labels.len()
        );
    }

    Ok(labels
        .iter()
        .zip(scores)
        .map(|(label, score)| Prediction::new(label.as_str(), *score))
        .collect())
}

/// Loads [`TmModel`]s from local files or over HTTP.
pub struct TmModelLoader {
    client: Client,
    layout: TensorLayout,
}

impl TmModelLoader {
    pub fn new(layout: TensorLayout) -> Self {
        Self {
            client: Client::new(),
            layout,
        }
    }

    pub async fn load_tm_model(
        &self,
        model_url: &ResourceLocation,
        metadata_url: &ResourceLocation,
    ) -> Result<TmModel> {
        log::info!("Fetching model metadata from {metadata_url}");
        let metadata = Metadata::from_slice(&metadata_url.fetch(&self.client).await?)?;
        log::debug!("Model metadata: {:?}", &metadata);

        log::info!("Fetching model topology from {model_url}");
        let topology = model_url.fetch(&self.client).await?;
        log::debug!(
            "Model file size: {:.2} MB",
            topology.len() as f64 / (1024.0 * 1024.0)
        );

        let layout = self.layout;
        let model =
            tokio::task::spawn_blocking(move || TmModel::from_onnx(&topology, metadata, layout))
                .await??;
        log::info!("Loaded model with classes {:?}", model.class_labels());

        Ok(model)
    }
}

impl ModelLoader for TmModelLoader {
    fn load<'a>(
        &'a self,
        model_url: &'a ResourceLocation,
        metadata_url: &'a ResourceLocation,
    ) -> BoxFuture<'a, Result<Arc<dyn ImageModel>>> {
        Box::pin(async move {
            let model = self.load_tm_model(model_url, metadata_url).await?;
            Ok(Arc::new(model) as Arc<dyn ImageModel>)
        })
    }
}
