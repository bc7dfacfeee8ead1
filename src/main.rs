use anyhow::Context;
use billetes::config::{AppConfig, ConfigOverrides};
use billetes::predictor::BanknotePredictor;
use billetes::{codec, server};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Colombian banknote detector
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the REST and WebSocket API
    Serve {
        #[command(flatten)]
        model: ModelArgs,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },
    /// Open the camera window
    Live {
        #[command(flatten)]
        model: ModelArgs,

        /// Camera index; asked interactively when omitted
        #[arg(long)]
        camera: Option<u32>,
    },
    /// Predict a single image file and print the result as JSON
    Predict {
        #[command(flatten)]
        model: ModelArgs,

        #[arg(long)]
        image: PathBuf,

        /// Where to write the annotated image
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Write the default configuration
    Config {
        #[arg(long, default_value = "billetes.toml")]
        output: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
struct ModelArgs {
    /// Path to the YOLO model exported to ONNX
    #[arg(long, env = "BILLETES_MODEL")]
    model: Option<PathBuf>,

    /// Confidence threshold (0.0-1.0)
    #[arg(long)]
    confidence: Option<f32>,

    /// Execution device: auto, cpu, cuda, coreml
    #[arg(long)]
    device: Option<String>,
}

impl ModelArgs {
    fn overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            model_path: self.model,
            confidence_threshold: self.confidence,
            device: self.device,
            ..Default::default()
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&PathBuf>, overrides: ConfigOverrides) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load(path.map(|p| p.as_path()))
        .with_context(|| format!("loading configuration {:?}", path))?;
    config.apply_overrides(overrides);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Serve { model, host, port } => {
            let overrides = ConfigOverrides {
                host,
                port,
                ..model.overrides()
            };
            let config = load_config(cli.config.as_ref(), overrides)?;
            server::serve(&config).await
        }
        Command::Live { model, camera } => {
            let overrides = ConfigOverrides {
                camera,
                ..model.overrides()
            };
            let config = load_config(cli.config.as_ref(), overrides)?;
            tokio::task::spawn_blocking(move || run_live(&config)).await?
        }
        Command::Predict {
            model,
            image,
            output,
        } => {
            let config = load_config(cli.config.as_ref(), model.overrides())?;
            tokio::task::spawn_blocking(move || run_predict(&config, &image, output.as_deref()))
                .await?
        }
        Command::Config { output } => {
            AppConfig::default()
                .to_toml_file(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            info!("Default configuration written to {}", output.display());
            Ok(())
        }
    }
}

fn run_predict(
    config: &AppConfig,
    image_path: &std::path::Path,
    output: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let predictor =
        BanknotePredictor::from_config(config, config.inference.confidence_threshold)?;

    let bytes = std::fs::read(image_path)
        .with_context(|| format!("reading {}", image_path.display()))?;
    let image = codec::decode_image(&bytes)?;
    let prediction = predictor.predict(&image)?;

    println!("{}", serde_json::to_string_pretty(&prediction)?);

    if let Some(output) = output {
        prediction
            .annotated_image
            .save(output)
            .with_context(|| format!("writing {}", output.display()))?;
        info!("Annotated image written to {}", output.display());
    }
    Ok(())
}

#[cfg(feature = "live")]
fn run_live(config: &AppConfig) -> anyhow::Result<()> {
    use billetes::live::{resolve_camera, LiveProcessor};

    let camera = resolve_camera(config.live.camera);
    let predictor = BanknotePredictor::from_config(config, config.live.confidence_threshold)?;
    LiveProcessor::new(predictor, &config.live, camera).run()?;
    Ok(())
}

#[cfg(not(feature = "live"))]
fn run_live(_config: &AppConfig) -> anyhow::Result<()> {
    anyhow::bail!("camera window not available: rebuild with `--features live`")
}
