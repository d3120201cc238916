use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use facecrop::config::{self, Config, ErrorPolicy};
use facecrop::driver::{BatchDriver, StopReason};
use facecrop::storage::CropWriter;
use facecrop::{corpus, RandomSampler, YunetDetector};
use log::info;
use rand::{rngs::StdRng, SeedableRng};

#[derive(Parser)]
#[command(name = "facecrop")]
#[command(
    version,
    about = "Build a face-crop training dataset from a directory of images"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces and write randomized crops
    Run(RunArgs),
    /// Print the effective configuration as TOML
    Config {
        /// Config file to read (defaults to the built-in location)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the effective configuration back to the config file instead of printing it
        #[arg(short, long)]
        write: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory holding the source images
    #[arg(short = 'r', long)]
    root_dir: PathBuf,

    /// Directory the crops are written to (created if missing)
    #[arg(short = 's', long)]
    save_dir: PathBuf,

    /// Config file to start from
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Detector search scale step
    #[arg(long)]
    scale_factor: Option<f64>,

    /// Overlapping candidates a detection needs; lower finds more faces and more false positives
    #[arg(long)]
    min_neighbors: Option<u32>,

    /// Minimum padding factor relative to the face width
    #[arg(long)]
    resize_min: Option<f64>,

    /// Maximum padding factor relative to the face width
    #[arg(long)]
    resize_max: Option<f64>,

    /// Maximum fractional x/y offset
    #[arg(long)]
    offset_max: Option<f64>,

    /// Detector model file name inside the model directory
    #[arg(long)]
    model: Option<String>,

    /// Treat --model as a path instead of a name in the model directory
    #[arg(long)]
    custom_model: bool,

    /// Log progress every N images
    #[arg(short = 'f', long)]
    sampling_frequency: Option<u64>,

    /// Stop once more than this many crops were written
    #[arg(short = 'm', long)]
    max_crops: Option<u64>,

    /// Crops whose width or height is not above this are dropped
    #[arg(long)]
    min_crop_size: Option<u32>,

    /// Seed for the crop randomization
    #[arg(long)]
    seed: Option<u64>,

    /// Also write annotated copies of every image with detections here
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// What to do with files that fail to decode
    #[arg(long, value_enum)]
    on_decode_error: Option<ErrorPolicy>,
}

impl RunArgs {
    /// Command-line values win over the config file.
    fn apply_to(&self, cfg: &mut Config) {
        if let Some(v) = self.scale_factor {
            cfg.detector.scale_factor = v;
        }
        if let Some(v) = self.min_neighbors {
            cfg.detector.min_neighbors = v;
        }
        if let Some(v) = self.resize_min {
            cfg.synthesis.resize_min = v;
        }
        if let Some(v) = self.resize_max {
            cfg.synthesis.resize_max = v;
        }
        if let Some(v) = self.offset_max {
            cfg.synthesis.offset_max = v;
        }
        if let Some(v) = self.min_crop_size {
            cfg.synthesis.min_crop_size = v;
        }
        if let Some(v) = &self.model {
            cfg.model = v.clone();
        }
        if self.custom_model {
            cfg.custom_model = true;
        }
        if let Some(v) = self.sampling_frequency {
            cfg.sampling_frequency = v;
        }
        if let Some(v) = self.max_crops {
            cfg.max_total_crops = v;
        }
        if let Some(v) = self.on_decode_error {
            cfg.on_decode_error = v;
        }
    }
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(&args),
        Commands::Config { config, write } => {
            if write {
                let path = write_config(config.as_deref())?;
                info!("Wrote configuration to {}", path.display());
                Ok(())
            } else {
                print_config(config.as_deref())
            }
        }
    }
}

fn effective_config(path: Option<&Path>) -> Result<Config> {
    let cfg = config::load_config(path)?;
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn run(args: &RunArgs) -> Result<()> {
    let mut cfg = config::load_config(args.config.as_deref())?;
    args.apply_to(&mut cfg);
    cfg.validate().context("invalid configuration")?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|err| anyhow::anyhow!("ctrlc handler: {err}"))?;

    info!("Loading detector and listing {}", args.root_dir.display());

    let detector = YunetDetector::from_file(&cfg.model_path(), cfg.detector)
        .context("Failed to initialize face detector")?;
    let images = corpus::list_images(&args.root_dir)?;
    let mut writer = CropWriter::create(&args.save_dir, args.debug_dir.as_deref())?;

    info!("Total images to be processed: {}", images.len());

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut driver = BatchDriver::new(detector, RandomSampler::new(rng), &cfg)
        .with_interrupt(Arc::clone(&interrupted));

    let summary = driver.run(&images, &mut writer)?;

    match summary.stop {
        StopReason::Interrupted => {}
        StopReason::CapReached | StopReason::Exhausted => info!(
            "Done. Images processed: {}/{}, crops created: {}",
            summary.state.images_processed, summary.total_images, summary.state.crops_accepted
        ),
    }

    Ok(())
}

fn print_config(path: Option<&Path>) -> Result<()> {
    let cfg = effective_config(path)?;
    print!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}

/// Fills in every default so the file lists all available settings.
fn write_config(path: Option<&Path>) -> Result<PathBuf> {
    let cfg = effective_config(path)?;
    config::save_config(&cfg, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> RunArgs {
        match Cli::try_parse_from(args).unwrap().command {
            Commands::Run(run) => run,
            Commands::Config { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn flags_override_config() {
        let args = parse(&[
            "facecrop",
            "run",
            "-r",
            "faces",
            "-s",
            "out",
            "--resize-min",
            "0.5",
            "--min-crop-size",
            "64",
            "-m",
            "10",
            "--model",
            "/tmp/yunet.onnx",
            "--custom-model",
            "--on-decode-error",
            "abort",
        ]);
        let mut cfg = Config::default();
        args.apply_to(&mut cfg);

        assert_eq!(cfg.synthesis.resize_min, 0.5);
        assert_eq!(cfg.synthesis.resize_max, 1.5);
        assert_eq!(cfg.synthesis.min_crop_size, 64);
        assert_eq!(cfg.max_total_crops, 10);
        assert_eq!(cfg.on_decode_error, ErrorPolicy::Abort);
        assert_eq!(cfg.model_path(), PathBuf::from("/tmp/yunet.onnx"));
    }

    #[test]
    fn absent_flags_keep_config() {
        let args = parse(&["facecrop", "run", "--root-dir", "a", "--save-dir", "b"]);
        let mut cfg = Config::default();
        cfg.detector.min_neighbors = 7;
        args.apply_to(&mut cfg);
        assert_eq!(cfg.detector.min_neighbors, 7);
        assert_eq!(cfg, {
            let mut expected = Config::default();
            expected.detector.min_neighbors = 7;
            expected
        });
    }

    #[test]
    fn config_write_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facecrop.toml");
        std::fs::write(&path, "max_total_crops = 7\n").unwrap();

        let cli = Cli::try_parse_from([
            "facecrop",
            "config",
            "--write",
            "-c",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let Commands::Config { config, write } = cli.command else {
            panic!("expected config");
        };
        assert!(write);

        let written = write_config(config.as_deref()).unwrap();
        assert_eq!(written, path);
        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("[synthesis]"));
        assert!(saved.contains("min_crop_size = 128"));

        let expected = Config {
            max_total_crops: 7,
            ..Default::default()
        };
        assert_eq!(config::load_config(Some(path.as_path())).unwrap(), expected);
    }

    #[test]
    fn config_write_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facecrop.toml");
        std::fs::write(&path, "sampling_frequency = 0\n").unwrap();

        assert!(write_config(Some(path.as_path())).is_err());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "sampling_frequency = 0\n"
        );
    }

    #[test]
    fn root_and_save_dirs_are_required() {
        assert!(Cli::try_parse_from(["facecrop", "run", "-r", "faces"]).is_err());
    }
}
