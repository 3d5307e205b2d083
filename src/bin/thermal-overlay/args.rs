use anyhow::Result;
use clap::value_t_or_exit;
use std::path::PathBuf;
use thermal_overlay::{
    args_parser, cli::load_config, opt, session::FramePolicy, surface::SurfaceTarget,
    SessionConfig,
};

pub struct Args {
    pub config: SessionConfig,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("thermal-overlay")
            .about("Overlay live thermal sensor frames on a camera preview.")
            .arg(
                opt!("config")
                    .short("c")
                    .help("JSON session config (default: reference rig setup)"),
            )
            .arg(opt!("sensor").short("s").help("Pipe the sensor daemon writes frames to"))
            .arg(opt!("tick ms").help("Milliseconds between overlay updates"))
            .arg(
                opt!("reference")
                    .short("r")
                    .help("Still image fixing the reference frame resolution"),
            )
            .arg(
                opt!("output")
                    .short("o")
                    .help("Write raw RGB overlay buffers to this path"),
            )
            .arg(
                opt!("png")
                    .conflicts_with("output")
                    .help("Write each overlay as a PNG snapshot to this path"),
            )
            .arg(
                opt!("skip bad frames")
                    .takes_value(false)
                    .help("Skip frames of the wrong size instead of stopping"),
            )
            .get_matches();

        let mut config = load_config(
            matches
                .is_present("config")
                .then(|| value_t_or_exit!(matches, "config", PathBuf))
                .as_deref(),
        )?;

        if matches.is_present("sensor") {
            config.sensor.path = value_t_or_exit!(matches, "sensor", PathBuf);
        }
        if matches.is_present("tick ms") {
            config.tick_ms = value_t_or_exit!(matches, "tick ms", u64);
        }
        if matches.is_present("reference") {
            config.reference.image = Some(value_t_or_exit!(matches, "reference", PathBuf));
        }
        if matches.is_present("output") {
            config.overlay.target = SurfaceTarget::RawFile {
                path: value_t_or_exit!(matches, "output", PathBuf),
            };
        }
        if matches.is_present("png") {
            config.overlay.target = SurfaceTarget::Png {
                path: value_t_or_exit!(matches, "png", PathBuf),
            };
        }
        if matches.is_present("skip bad frames") {
            config.frame_policy = FramePolicy::SkipFrame;
        }

        Ok(Args { config })
    }
}
