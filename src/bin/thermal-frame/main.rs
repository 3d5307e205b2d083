mod args;

use std::fs;

use anyhow::{Context, Result};
use itertools::iproduct;
use thermal_overlay::{
    logger, temperature::raw_to_celsius, temperature::FrameTemperatures, OverlayPipeline,
    RawFrame,
};

use args::Args;

fn main() -> Result<()> {
    logger::init();
    let args = Args::from_cmd_line()?;

    let frame = RawFrame::new(
        fs::read(&args.frame).with_context(|| format!("reading {}", args.frame.display()))?,
    );
    let reference = args.config.reference.resolve()?;
    let pipeline = OverlayPipeline::new(&args.config.pipeline_settings(), reference)?;
    let stages = pipeline.process_stages(&frame)?;

    let temps = FrameTemperatures::from_grid(&stages.grid);
    eprintln!("{}", serde_json::to_string(&temps)?);

    let (ht, wid) = stages.grid.dim();
    println!("row,col,raw,celsius,normalized");
    for (row, col) in iproduct!(0..ht, 0..wid) {
        let raw = stages.grid[(row, col)];
        println!(
            "{},{},{},{:.2},{:.4}",
            row,
            col,
            raw,
            raw_to_celsius(raw),
            stages.normalized[(row, col)]
        );
    }

    if let Some(png) = &args.png {
        let image = stages
            .buffer
            .into_rgb_image()
            .context("overlay buffer does not match its dimensions")?;
        image
            .save(png)
            .with_context(|| format!("writing {}", png.display()))?;
        eprintln!("overlay: {} ({})", png.display(), reference);
    }

    Ok(())
}
