//! End-to-end runs: configure, generate, persist.
//!
//! Configuration is always resolved before a backend is built, so a missing
//! key fails the run without any network activity.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::artifact::Artifact;
use crate::config::ClientConfig;
use crate::error::{GenMediaError, Result};
use crate::gemini_api::FlashImageClient;
use crate::imagen_api::ImagenClient;
use crate::operation::{Operation, OperationSource};
use crate::output::{OutputSpec, save_artifacts};
use crate::poller::{PollPolicy, PollProgress, poll_until_complete};
use crate::veo_api::{VeoClient, VideoRequest, VideoResponse};

/// Synchronous image generation.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Vec<Artifact>>;
}

#[async_trait]
impl ImageBackend for ImagenClient {
    async fn generate(&self, prompt: &str) -> Result<Vec<Artifact>> {
        self.generate_images(prompt, self.generation_config()).await
    }
}

#[async_trait]
impl ImageBackend for FlashImageClient {
    async fn generate(&self, prompt: &str) -> Result<Vec<Artifact>> {
        self.generate_images(prompt).await
    }
}

/// Submit, refresh and download for long-running video jobs.
#[async_trait]
pub trait VideoBackend: OperationSource<Response = VideoResponse> {
    async fn submit(&self, request: &VideoRequest) -> Result<Operation<VideoResponse>>;
    async fn download(&self, uri: &str) -> Result<Artifact>;
}

#[async_trait]
impl VideoBackend for VeoClient {
    async fn submit(&self, request: &VideoRequest) -> Result<Operation<VideoResponse>> {
        VeoClient::submit(self, request).await
    }

    async fn download(&self, uri: &str) -> Result<Artifact> {
        VeoClient::download(self, uri).await
    }
}

/// Progress of a run, in the order it happens.
#[derive(Debug)]
pub enum JobEvent<'a> {
    Submitted { operation: &'a str },
    Waiting(&'a PollProgress<'a>),
    Generated { artifacts: usize },
    Saved(&'a Path),
    NoArtifacts,
}

#[derive(Debug, Clone)]
pub struct VideoJob {
    pub request: VideoRequest,
    pub policy: PollPolicy,
    pub output: OutputSpec,
    pub cancel: CancellationToken,
}

/// Generate images for `prompt` and write them under `output`.
pub async fn run_image_job<C, M, B, E>(
    load_config: C,
    make_backend: M,
    prompt: &str,
    output: &OutputSpec,
    mut on_event: E,
) -> Result<Vec<PathBuf>>
where
    C: FnOnce() -> Result<ClientConfig>,
    M: FnOnce(ClientConfig) -> Result<B>,
    B: ImageBackend,
    E: FnMut(JobEvent<'_>),
{
    let config = load_config()?;
    let backend = make_backend(config)?;

    let artifacts = backend.generate(prompt).await?;
    on_event(JobEvent::Generated {
        artifacts: artifacts.len(),
    });

    persist(output, &artifacts, &mut on_event).await
}

/// Submit a video job, wait for it, download and write every video.
///
/// Every video is downloaded before anything is written, so a failure at any
/// step leaves the output directory untouched. `job.cancel` aborts submission,
/// polling and downloads alike.
pub async fn run_video_job<C, M, B, E>(
    load_config: C,
    make_backend: M,
    job: &VideoJob,
    mut on_event: E,
) -> Result<Vec<PathBuf>>
where
    C: FnOnce() -> Result<ClientConfig>,
    M: FnOnce(ClientConfig) -> Result<B>,
    B: VideoBackend,
    E: FnMut(JobEvent<'_>),
{
    let config = load_config()?;
    let backend = make_backend(config)?;

    let operation = unless_cancelled(&job.cancel, backend.submit(&job.request)).await?;
    on_event(JobEvent::Submitted {
        operation: &operation.name,
    });

    let operation = poll_until_complete(&backend, operation, &job.policy, &job.cancel, |p| {
        on_event(JobEvent::Waiting(p))
    })
    .await?;

    let uris = operation.into_result()?.video_references();
    on_event(JobEvent::Generated {
        artifacts: uris.len(),
    });

    let mut videos = Vec::with_capacity(uris.len());
    for uri in &uris {
        videos.push(unless_cancelled(&job.cancel, backend.download(uri)).await?);
    }

    persist(&job.output, &videos, &mut on_event).await
}

async fn unless_cancelled<T>(
    cancel: &CancellationToken,
    request: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GenMediaError::Cancelled),
        result = request => result,
    }
}

async fn persist<E>(
    output: &OutputSpec,
    artifacts: &[Artifact],
    on_event: &mut E,
) -> Result<Vec<PathBuf>>
where
    E: FnMut(JobEvent<'_>),
{
    let paths = save_artifacts(output, artifacts).await?;
    if paths.is_empty() {
        on_event(JobEvent::NoArtifacts);
    }
    for path in &paths {
        on_event(JobEvent::Saved(path));
    }
    info!("Saved {} file(s) to {:?}", paths.len(), output.dir);
    Ok(paths)
}
