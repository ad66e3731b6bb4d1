//! Classify server binary.
//!
use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use clap::Parser;
use classify_server::{
    config::DemoConfig,
    controller::DemoController,
    endpoints::router,
    meter::spawn_meter_logger,
    nn::{TensorLayout, TmModelLoader},
    sensors::{SourceWebcams, WebcamOptions},
    utils::ResourceLocation,
};
use env_logger::TimestampPrecision;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address to serve the demo page on
    #[clap(long, default_value = "127.0.0.1:3000")]
    server_address: String,

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

    /// Video device (/dev/videoN) or image file to use as webcam
    #[clap(long, default_value = "/dev/video0")]
    source: String,

    /// Width of the webcam viewport
    #[clap(long, default_value_t = 200, value_parser = clap::value_parser!(u32).range(1..=4096))]
    width: u32,

    /// Height of the webcam viewport
    #[clap(long, default_value_t = 200, value_parser = clap::value_parser!(u32).range(1..=4096))]
    height: u32,

    /// Do not mirror the webcam image
    #[clap(long)]
    no_flip: bool,

    /// Frames per second of the prediction loop
    #[clap(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..=1000))]
    fps: u32,

    /// Stop the prediction loop after this many frames
    #[clap(long)]
    max_frames: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let config = DemoConfig {
        model_base: args.model_base,
        model_file: args.model_file,
        metadata_file: args.metadata_file,
        webcam: WebcamOptions {
            width: args.width,
            height: args.height,
            flip: !args.no_flip,
        },
        frame_rate: args.fps,
        max_frames: args.max_frames,
    };
    log::info!("Configuration: {:?}", &config);

    let controller = Arc::new(DemoController::new(
        config,
        Arc::new(TmModelLoader::new(args.layout)),
        Arc::new(SourceWebcams::new(args.source)),
    ));

    let shutdown = controller.shutdown_token();
    spawn_meter_logger(shutdown.clone());

    // Serve HTTP server until Ctrl-C
    let addr: SocketAddr = args.server_address.parse()?;
    log::info!("Serving demo on http://{addr}/");
    axum::Server::bind(&addr)
        .serve(router(Arc::clone(&controller)).into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {err}");
            }
            log::warn!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    controller.stop().await;

    Ok(())
}
