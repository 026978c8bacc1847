mod config;
mod render;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use primitive_client::{ClientConfig, JobTracker, PrimitiveApi};
use primitive_core::artifacts::rendered_output;
use primitive_core::job::{JobHandle, JobStatus};
use primitive_core::params::{
    Background, JobParameters, ShapeMode, BACKGROUND_AVERAGE, DEFAULT_ALPHA, DEFAULT_OUTPUT_SIZE,
    DEFAULT_RESAMPLE_SIZE, DEFAULT_SHAPE_COUNT,
};
use primitive_core::reconciler::JobSnapshot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::WatchConfig;
use crate::render::{outcome_label, SnapshotRenderer};

/// Submit an image to a primitive service and follow the job until it
/// settles.
#[derive(Debug, Parser)]
#[command(name = "primitive-watch", version)]
struct Args {
    /// Image to upload (.png, .jpg or .jpeg).
    image: PathBuf,

    /// Number of shapes.
    #[arg(short = 'n', long = "shapes", default_value_t = DEFAULT_SHAPE_COUNT)]
    shapes: u32,

    /// Shape mode: 0=combo 1=triangle 2=rect 3=ellipse 4=circle
    /// 5=rotatedrect 6=beziers 7=rotatedellipse 8=polygon.
    #[arg(short = 'm', long = "mode", default_value_t = ShapeMode::default().as_u8())]
    mode: u8,

    /// Output image size in pixels.
    #[arg(short = 's', long = "size", default_value_t = DEFAULT_OUTPUT_SIZE)]
    size: u32,

    /// Resize the input to this size before fitting.
    #[arg(short = 'r', long = "resample", default_value_t = DEFAULT_RESAMPLE_SIZE)]
    resample: u32,

    /// Shape alpha; 0 lets the algorithm choose.
    #[arg(short = 'a', long = "alpha", default_value_t = DEFAULT_ALPHA)]
    alpha: u8,

    /// Starting background colour, or `avg` for the image average.
    #[arg(long = "bg", default_value = BACKGROUND_AVERAGE)]
    background: String,

    /// Extra shapes per iteration with reduced search.
    #[arg(long = "rep", default_value_t = 0)]
    repeat: u32,

    /// Save a frame every N shapes.
    #[arg(long = "nth")]
    nth: Option<u32>,

    /// Worker count; 0 uses every core.
    #[arg(short = 'j', long = "workers", default_value_t = 0)]
    workers: u32,

    /// Service log verbosity (0-2).
    #[arg(short = 'v', long = "verbosity", default_value_t = 0)]
    verbosity: u8,

    /// Service URL. Overrides `PRIMITIVE_API_URL`.
    #[arg(long)]
    api_url: Option<String>,

    /// Poll interval in milliseconds. Overrides `PRIMITIVE_POLL_INTERVAL_MS`.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Where to write the rendered output. Overrides `PRIMITIVE_OUTPUT_DIR`.
    #[arg(short = 'o', long)]
    output_dir: Option<PathBuf>,

    /// Do not download the rendered output.
    #[arg(long)]
    no_download: bool,
}

impl Args {
    fn job_parameters(&self) -> anyhow::Result<JobParameters> {
        let params = JobParameters {
            shape_count: self.shapes,
            shape_mode: ShapeMode::try_from(self.mode)?,
            output_size: self.size,
            resample_size: self.resample,
            alpha: self.alpha,
            background: Background::parse(&self.background),
            repeat_count: self.repeat,
            frame_interval: self.nth,
            worker_count: self.workers,
            verbosity: self.verbosity,
        };
        params.validate()?;
        Ok(params)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "primitive_cli=info,primitive_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let env = WatchConfig::from_env()?;

    let api_url = args.api_url.clone().unwrap_or(env.api_url);
    let poll_interval = args
        .poll_interval_ms
        .map(Duration::from_millis)
        .unwrap_or(env.poll_interval);
    let output_dir = args.output_dir.clone().unwrap_or(env.output_dir);

    let config = ClientConfig::new(&api_url)
        .with_context(|| format!("Invalid service URL '{api_url}'"))?
        .with_poll_interval(poll_interval);
    let http = reqwest::Client::builder()
        .timeout(env.http_timeout)
        .build()
        .context("Failed to build HTTP client")?;
    let api = PrimitiveApi::with_client(http, &config);

    let params = args.job_parameters()?;
    let filename = args
        .image
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("'{}' has no usable file name", args.image.display()))?
        .to_string();
    let bytes = tokio::fs::read(&args.image)
        .await
        .with_context(|| format!("Failed to read '{}'", args.image.display()))?;

    tracing::info!(api_url = %config.api_url, file = %filename, bytes = bytes.len(), "Submitting job");

    let mut tracker = JobTracker::with_api(api, &config);
    let mut renderer = SnapshotRenderer::new();
    let mut rx = tracker.subscribe();

    let submitted = tracker.submit(bytes, &filename, &params).await;
    print_lines(&mut renderer, &tracker.current_state());
    let job = submitted.context("Job submission failed")?;

    let Some(settled) = follow(&tracker, &mut rx, &mut renderer, poll_interval).await else {
        tracing::info!(job_id = %job.id, "Interrupted, detaching from job");
        tracker.reset().await;
        return Ok(());
    };

    let status = settled.job.as_ref().map_or(job.status, |j| j.status);
    tracker.stop_polling().await;
    let files = match tracker.api().list_outputs(&job.id).await {
        Ok(files) => files,
        Err(e) => {
            tracing::warn!(job_id = %job.id, error = %e, "Final output listing failed");
            settled.artifacts.clone()
        }
    };
    tracker.reset().await;

    println!("job {} {}", job.id, outcome_label(status));

    if status == JobStatus::Succeeded && !args.no_download {
        match rendered_output(&files) {
            Some(artifact) => {
                let path = download(tracker.api(), &job, artifact.name(), &output_dir).await?;
                println!("saved {}", path.display());
            }
            None => tracing::warn!(job_id = %job.id, "Job succeeded without a rendered output"),
        }
    }

    if status != JobStatus::Succeeded {
        anyhow::bail!("Job {} ended with status {status}", job.id);
    }
    Ok(())
}

/// While the progress stream is attached, the job record is also checked
/// every this many status ticks in case a `done` frame was missed.
const ATTACHED_CHECK_EVERY: u64 = 15;

const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Whether to fetch the job record on status tick `tick`. Once the stream
/// has ended nothing else can announce the final status, so every tick
/// checks.
fn should_check_status(tick: u64, stream_attached: bool) -> bool {
    !stream_attached || tick % ATTACHED_CHECK_EVERY == 0
}

/// Print snapshots until the job reaches a terminal status. Returns `None`
/// on Ctrl-C or if the tracker went away.
async fn follow(
    tracker: &JobTracker,
    rx: &mut tokio::sync::watch::Receiver<JobSnapshot>,
    renderer: &mut SnapshotRenderer,
    check_interval: Duration,
) -> Option<JobSnapshot> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    // `interval` rejects a zero period.
    let mut status_ticks = tokio::time::interval(check_interval.max(MIN_CHECK_INTERVAL));
    status_ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    status_ticks.tick().await;
    let mut tick: u64 = 0;

    loop {
        let snapshot = rx.borrow_and_update().clone();
        print_lines(renderer, &snapshot);
        if snapshot.is_terminal() {
            return Some(snapshot);
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return None;
                }
            }
            _ = status_ticks.tick() => {
                tick += 1;
                if should_check_status(tick, tracker.stream_attached()) {
                    // A published change wakes the loop through `rx`.
                    if let Err(e) = tracker.refresh_status().await {
                        tracing::debug!(error = %e, "Job status check failed");
                    }
                }
            }
            _ = &mut ctrl_c => return None,
        }
    }
}

fn print_lines(renderer: &mut SnapshotRenderer, snapshot: &JobSnapshot) {
    for line in renderer.render(snapshot) {
        println!("{line}");
    }
}

async fn download(
    api: &PrimitiveApi,
    job: &JobHandle,
    filename: &str,
    output_dir: &Path,
) -> anyhow::Result<PathBuf> {
    let bytes = api
        .download_output(&job.id, filename)
        .await
        .with_context(|| format!("Failed to download {filename}"))?;

    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create '{}'", output_dir.display()))?;
    let path = output_dir.join(format!("{}-{filename}", job.id));
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("Failed to write '{}'", path.display()))?;

    tracing::info!(job_id = %job.id, path = %path.display(), bytes = bytes.len(), "Rendered output saved");
    Ok(path)
}
