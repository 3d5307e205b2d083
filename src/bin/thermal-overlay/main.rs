mod args;

use anyhow::{Context, Result};
use thermal_overlay::{logger, source::PipeSource, OverlayLoop, OverlayPipeline};
use tracing::info;

use args::Args;

fn main() -> Result<()> {
    logger::init();
    let config = Args::from_cmd_line()?.config;

    let reference = config.reference.resolve()?;
    let pipeline = OverlayPipeline::new(&config.pipeline_settings(), reference)?;
    let source = PipeSource::new(&config.sensor.path, pipeline.layout().frame_len());
    info!(
        sensor = %config.sensor.path.display(),
        frame_len = pipeline.layout().frame_len(),
        target = ?config.overlay.target,
        "starting overlay"
    );

    let mut session = OverlayLoop::new(
        pipeline,
        config.loop_settings(),
        config.overlay.settings,
        Box::new(source),
        config.overlay.target.build(),
    );

    let stop = session.stop_handle();
    ctrlc::set_handler(move || {
        info!("shutdown signal received");
        stop.stop();
    })
    .context("installing signal handler")?;

    let summary = session.run()?;
    eprintln!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
