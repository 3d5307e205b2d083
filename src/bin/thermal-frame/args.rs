use anyhow::Result;
use clap::value_t_or_exit;
use std::path::PathBuf;
use thermal_overlay::{arg, args_parser, cli::load_config, opt, SessionConfig};

pub struct Args {
    pub frame: PathBuf,
    pub config: SessionConfig,
    pub png: Option<PathBuf>,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("thermal-frame")
            .about("Decode one captured sensor frame and print its samples as CSV.")
            .arg(
                opt!("config")
                    .short("c")
                    .help("JSON session config (default: reference rig setup)"),
            )
            .arg(
                opt!("png")
                    .short("p")
                    .help("Also render the registered overlay to this PNG"),
            )
            .arg(arg!("frame").required(true).help("Raw frame file"))
            .get_matches();

        let frame = value_t_or_exit!(matches, "frame", PathBuf);
        let config = load_config(
            matches
                .is_present("config")
                .then(|| value_t_or_exit!(matches, "config", PathBuf))
                .as_deref(),
        )?;
        let png = matches
            .is_present("png")
            .then(|| value_t_or_exit!(matches, "png", PathBuf));

        Ok(Args { frame, config, png })
    }
}
