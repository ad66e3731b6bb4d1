//! Classify a single image file and print one line per class.
//!
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use classify_server::{
    nn::{ImageModel, TensorLayout, TmModelLoader},
    utils::ResourceLocation,
};
use env_logger::TimestampPrecision;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Image to classify
    image: PathBuf,

    /// Directory or URL holding the model files
    #[clap(long, default_value = "./model/")]
    model_base: ResourceLocation,

    /// Name of the ONNX model file inside the model directory
    #[clap(long, default_value = "model.onnx")]
    model_file: String,

    /// Name of the metadata file inside the model directory
    #[clap(long, default_value = "metadata.json")]
    metadata_file: String,

    /// Layout of the model input tensor
    #[clap(long, value_enum, default_value_t = TensorLayout::Nhwc)]
    layout: TensorLayout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let model = TmModelLoader::new(args.layout)
        .load_tm_model(
            &args.model_base.join(&args.model_file)?,
            &args.model_base.join(&args.metadata_file)?,
        )
        .await?;

    let image = image::open(&args.image)
        .with_context(|| format!("failed to open {}", args.image.display()))?
        .to_rgb8();

    let now = std::time::Instant::now();
    let predictions = model.predict(&image)?;
    log::info!("Prediction took {:.2?}", now.elapsed());

    for prediction in predictions {
        println!("{prediction}");
    }

    Ok(())
}
