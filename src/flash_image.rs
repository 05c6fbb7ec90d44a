use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use genmedia::output::IMAGE_OUTPUT_DIR;
use genmedia::{ClientConfig, FlashImageClient, JobEvent, OutputSpec, run_image_job};

const DEFAULT_PROMPT: &str = "A park in the spring next to a lake, the sun sets across the lake, golden hour, red wildflowers.";
const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
const FILE_PREFIX: &str = "gemini_flash_image_test";

#[derive(Parser, Debug)]
#[command(name = "flash_image")]
#[command(version)]
#[command(about = "Generate images with Gemini 2.5 Flash Image and save them to disk")]
struct Args {
    /// Text prompt (a built-in scene is used when omitted)
    #[arg(short, long)]
    prompt: Option<String>,

    /// Output directory
    #[arg(short, long, default_value = IMAGE_OUTPUT_DIR)]
    output: PathBuf,

    /// Gemini model name
    #[arg(short = 'm', long, default_value = DEFAULT_MODEL)]
    model: String,

    /// API timeout in seconds
    #[arg(short, long, default_value = "120")]
    timeout: u64,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (no progress output)
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    let prompt = args.prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string());
    let output = OutputSpec::new(&args.output, FILE_PREFIX);
    let quiet = args.quiet;
    let timeout = args.timeout;
    let model = args.model;

    if !quiet {
        println!("Initializing Gemini Flash Image client ({})...", model);
        println!("Prompt: {}", prompt);
    }

    let pb = if !quiet {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message("Generating image...");
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let paths = run_image_job(
        || ClientConfig::from_env().map(|c| c.with_timeout_secs(timeout)),
        |config| FlashImageClient::new(config).map(|c| c.with_model(&model)),
        &prompt,
        &output,
        |event| match event {
            JobEvent::Generated { artifacts } => {
                if let Some(pb) = &pb {
                    pb.finish_with_message(format!("{} image(s) generated", artifacts));
                }
            }
            JobEvent::Saved(path) if !quiet => println!("  Saved: {}", path.display()),
            _ => {}
        },
    )
    .await
    .context("Image generation failed")?;

    if !quiet {
        println!(
            "\nDone! {} file(s) in {}/",
            paths.len(),
            output.dir.display()
        );
    }

    Ok(())
}
