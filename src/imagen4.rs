use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use genmedia::imagen_api::{AspectRatio, ImagenModel};
use genmedia::output::IMAGE_OUTPUT_DIR;
use genmedia::{ClientConfig, ImagenClient, ImagenConfig, JobEvent, OutputSpec, run_image_job};

const DEFAULT_PROMPT: &str = "A park in the spring next to a lake, the sun sets across the lake, golden hour, red wildflowers.";
const FILE_PREFIX: &str = "imagen4_test";

#[derive(Parser, Debug)]
#[command(name = "imagen4")]
#[command(version)]
#[command(about = "Generate images with Imagen 4 and save them to disk")]
struct Args {
    /// Text prompt (a built-in scene is used when omitted)
    #[arg(short, long)]
    prompt: Option<String>,

    /// Output directory
    #[arg(short, long, default_value = IMAGE_OUTPUT_DIR)]
    output: PathBuf,

    /// Imagen variant: standard (default), ultra, fast
    #[arg(short = 'm', long, default_value = "standard")]
    model: String,

    /// Number of images to generate (1-4)
    #[arg(short = 'n', long, default_value = "4")]
    count: u32,

    /// Aspect ratio: 1:1, 16:9, 9:16, 4:3, 3:4
    #[arg(short = 'a', long, default_value = "1:1")]
    aspect: String,

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
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

fn build_gen_config(count: u32, aspect: &str) -> Result<ImagenConfig> {
    let aspect = AspectRatio::from_str(aspect).map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(ImagenConfig::new()
        .with_number_of_images(count)
        .with_aspect_ratio(aspect))
}

fn spinner(quiet: bool, message: &str) -> Option<ProgressBar> {
    if quiet {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    let model = ImagenModel::from_str(&args.model).map_err(|e| anyhow::anyhow!("{}", e))?;
    let gen_config = build_gen_config(args.count, &args.aspect)?;
    let prompt = args.prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string());
    let output = OutputSpec::new(&args.output, FILE_PREFIX);
    let quiet = args.quiet;
    let timeout = args.timeout;

    if !quiet {
        println!("Initializing Imagen 4 client ({})...", model);
        println!("Prompt: {}", prompt);
    }

    let pb = spinner(quiet, "Generating images with Imagen 4...");

    let paths = run_image_job(
        || ClientConfig::from_env().map(|c| c.with_timeout_secs(timeout)),
        |config| ImagenClient::with_model(config, model).map(|c| c.with_generation_config(gen_config)),
        &prompt,
        &output,
        |event| match event {
            JobEvent::Generated { artifacts } => {
                if let Some(pb) = &pb {
                    pb.finish_with_message(format!("{} image(s) generated", artifacts));
                }
                if !quiet {
                    println!("Saving images to {}/", output.dir.display());
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_gen_config() {
        let config = build_gen_config(2, "16:9").unwrap();
        assert_eq!(config.number_of_images, 2);
        assert_eq!(config.aspect_ratio, AspectRatio::Wide);
        assert!(build_gen_config(4, "2:1").is_err());
    }

    #[test]
    fn test_defaults_match_plain_invocation() {
        let args = Args::parse_from(["imagen4"]);
        assert!(args.prompt.is_none());
        assert_eq!(args.output, PathBuf::from("output_images"));
        assert_eq!(args.count, 4);
        assert_eq!(args.aspect, "1:1");
        assert_eq!(args.model, "standard");
    }
}
