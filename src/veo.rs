use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug};
use tracing_subscriber::FmtSubscriber;

use genmedia::output::VIDEO_OUTPUT_DIR;
use genmedia::veo_api::VideoAspectRatio;
use genmedia::{
    ClientConfig, JobEvent, OutputSpec, PollPolicy, VeoClient, VideoJob, VideoRequest,
    run_video_job,
};

const DEFAULT_PROMPT: &str = "A serene park in spring next to a lake during golden hour. \
The sun sets across the water, casting warm light on red wildflowers swaying in the breeze. \
Camera pans slowly across the peaceful scene.";
const FILE_PREFIX: &str = "veo3_test";

#[derive(Parser, Debug)]
#[command(name = "veo")]
#[command(version)]
#[command(about = "Generate a video with Veo 3.1 and save it to disk")]
struct Args {
    /// Text prompt (a built-in scene is used when omitted)
    #[arg(short, long)]
    prompt: Option<String>,

    /// Output directory
    #[arg(short, long, default_value = VIDEO_OUTPUT_DIR)]
    output: PathBuf,

    /// Aspect ratio: 16:9 or 9:16 (service default when omitted)
    #[arg(short = 'a', long)]
    aspect: Option<String>,

    /// Things the video should not contain
    #[arg(long)]
    negative_prompt: Option<String>,

    /// Seconds to wait before the first status check
    #[arg(long, default_value = "10")]
    poll_interval: u64,

    /// Keep the interval constant instead of backing off
    #[arg(long)]
    fixed_interval: bool,

    /// Give up waiting after this many seconds
    #[arg(long, default_value = "600")]
    max_wait: u64,

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

fn build_request(args: &Args) -> Result<VideoRequest> {
    let prompt = args
        .prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_PROMPT.to_string());
    let mut request = VideoRequest::new(prompt);

    if let Some(aspect) = &args.aspect {
        let ratio = VideoAspectRatio::from_str(aspect).map_err(|e| anyhow::anyhow!("{}", e))?;
        request = request.with_aspect_ratio(ratio);
    }
    if let Some(negative) = &args.negative_prompt {
        request = request.with_negative_prompt(negative.clone());
    }

    Ok(request)
}

fn build_policy(args: &Args) -> Result<PollPolicy> {
    if args.poll_interval == 0 {
        anyhow::bail!("--poll-interval must be at least 1 second");
    }
    let interval = Duration::from_secs(args.poll_interval);
    let policy = if args.fixed_interval {
        PollPolicy::fixed(interval)
    } else {
        PollPolicy {
            initial_interval: interval,
            ..PollPolicy::default()
        }
    };
    Ok(policy.with_deadline(Duration::from_secs(args.max_wait)))
}

/// Cancel the job on the first Ctrl-C, exit on the second.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Ctrl-C received, cancelling");
            trigger.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    let job = VideoJob {
        request: build_request(&args)?,
        policy: build_policy(&args)?,
        output: OutputSpec::new(&args.output, FILE_PREFIX),
        cancel: cancel_on_ctrl_c(),
    };
    let quiet = args.quiet;
    let timeout = args.timeout;

    if !quiet {
        println!("Initializing Veo 3.1 client...");
        println!("Prompt: {}", job.request.prompt);
        println!("Generating video. This may take 11 seconds to 6 minutes depending on server load...");
    }

    let pb = if !quiet {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message("Submitting job...");
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let paths = run_video_job(
        || ClientConfig::from_env().map(|c| c.with_timeout_secs(timeout)),
        VeoClient::new,
        &job,
        |event| match event {
            JobEvent::Submitted { operation } => {
                debug!("Submitted operation {}", operation);
                if let Some(pb) = &pb {
                    pb.set_message("Waiting for video generation to complete...");
                }
            }
            JobEvent::Waiting(progress) => {
                if let Some(pb) = &pb {
                    pb.set_message(format!(
                        "Still processing... ({}s elapsed, next check in {}s)",
                        progress.elapsed.as_secs(),
                        progress.next_delay.as_secs()
                    ));
                }
            }
            JobEvent::Generated { artifacts } => {
                if let Some(pb) = &pb {
                    pb.finish_with_message(format!(
                        "Generation complete, downloading {} video(s)...",
                        artifacts
                    ));
                }
            }
            JobEvent::Saved(path) if !quiet => println!("  Saved: {}", path.display()),
            _ => {}
        },
    )
    .await
    .context("Video generation failed")?;

    if !quiet {
        println!(
            "\nDone! {} file(s) in {}/",
            paths.len(),
            job.output.dir.display()
        );
        println!("Note: Veo 3.1 generates videos with natively generated audio!");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use genmedia::Backoff;

    #[test]
    fn test_defaults_match_plain_invocation() {
        let args = Args::parse_from(["veo"]);
        assert_eq!(args.output, PathBuf::from("output_videos"));
        assert_eq!(args.poll_interval, 10);

        let request = build_request(&args).unwrap();
        assert_eq!(request.prompt, DEFAULT_PROMPT);
        assert!(request.aspect_ratio.is_none());
    }

    #[test]
    fn test_build_policy() {
        let args = Args::parse_from(["veo", "--fixed-interval", "--max-wait", "120"]);
        let policy = build_policy(&args).unwrap();
        assert_eq!(policy.backoff, Backoff::Fixed);
        assert_eq!(policy.initial_interval, Duration::from_secs(10));
        assert_eq!(policy.deadline, Some(Duration::from_secs(120)));

        let args = Args::parse_from(["veo", "--poll-interval", "5"]);
        let policy = build_policy(&args).unwrap();
        assert!(matches!(policy.backoff, Backoff::Exponential { .. }));
        assert_eq!(policy.initial_interval, Duration::from_secs(5));

        let args = Args::parse_from(["veo", "--poll-interval", "0"]);
        assert!(build_policy(&args).is_err());
    }

    #[test]
    fn test_build_request_options() {
        let args = Args::parse_from([
            "veo",
            "-p",
            "A fox",
            "-a",
            "9:16",
            "--negative-prompt",
            "rain",
        ]);
        let request = build_request(&args).unwrap();
        assert_eq!(request.prompt, "A fox");
        assert_eq!(request.aspect_ratio, Some(VideoAspectRatio::Portrait));
        assert_eq!(request.negative_prompt.as_deref(), Some("rain"));

        let args = Args::parse_from(["veo", "-a", "1:1"]);
        assert!(build_request(&args).is_err());
    }
}
