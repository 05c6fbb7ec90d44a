pub mod artifact;
pub mod config;
pub mod error;
pub mod gemini_api;
pub mod imagen_api;
pub mod job;
pub mod operation;
pub mod output;
pub mod poller;
pub mod veo_api;

pub use artifact::Artifact;
pub use config::ClientConfig;
pub use error::{GenMediaError, Result};
pub use gemini_api::FlashImageClient;
pub use imagen_api::{ImagenClient, ImagenConfig};
pub use job::{ImageBackend, JobEvent, VideoBackend, VideoJob, run_image_job, run_video_job};
pub use operation::{JobState, Operation, OperationSource, OperationStatus};
pub use output::OutputSpec;
pub use poller::{Backoff, PollPolicy, PollProgress, poll_until_complete};
pub use veo_api::{VeoClient, VideoRequest, VideoResponse};
