//! Face Capture CLI
//!
//! Runs a capture session against a camera and writes the captured still
//! to disk, optionally enrolling it as an employee's face photo.

use clap::{Args, Parser, Subcommand, ValueEnum};
use facecap::capture::{ConfigError, FacingMode, FileConfig, MockSource, StillFormat};
use facecap::metrics::{MetricsError, MetricsRegistry, MetricsSnapshot};
use facecap::roster::RosterError;
use facecap::session::{DriverError, SessionStats};
use facecap::{
    CaptureSession, CapturedImage, Employee, EmployeeRepository, InMemoryRoster, SessionConfig,
    SessionDriver, SessionHandle, SessionSnapshot, SessionStatus, VideoSource,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How often the CLI polls the session for progress.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Capture attempts allowed before giving up on a failing camera.
const CAPTURE_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Camera(String),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error("input task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("capture failed after {0} attempts")]
    CaptureFailed(u32),
    #[error("capture interrupted")]
    Interrupted,
}

#[derive(Debug, Parser)]
#[command(name = "facecap", version, about = "Capture a face photo from the camera")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print session metrics in Prometheus format on exit.
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture a single still and write it to the output directory.
    Capture(CaptureArgs),
    /// Capture a face photo and enroll it for a new employee.
    ///
    /// The roster is held in memory for this run only. The photo is written
    /// to the output directory and the enrolled record is logged.
    Enroll(EnrollArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Png,
    Jpeg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FacingArg {
    User,
    Environment,
}

#[derive(Debug, Args)]
struct CaptureArgs {
    /// Capture automatically after a countdown once a subject is detected.
    #[arg(long)]
    auto: bool,

    /// Countdown length in seconds for automatic capture.
    #[arg(long)]
    countdown: Option<u32>,

    /// Directory for captured stills.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Still format.
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Preferred camera.
    #[arg(long, value_enum)]
    facing: Option<FacingArg>,

    /// Ideal frame width.
    #[arg(long)]
    width: Option<u32>,

    /// Ideal frame height.
    #[arg(long)]
    height: Option<u32>,

    /// Use the platform camera with this index instead of the mock camera.
    #[cfg(feature = "camera")]
    #[arg(long)]
    device: Option<u32>,

    /// Make the mock camera refuse access.
    #[arg(long)]
    deny_permission: bool,

    /// Serve metrics on this port while capturing (0 disables).
    #[cfg(feature = "metrics")]
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[derive(Debug, Args)]
struct EnrollArgs {
    /// Employee id, also used as the photo file prefix.
    #[arg(long)]
    id: String,
    /// Full name.
    #[arg(long)]
    name: String,
    /// Work email.
    #[arg(long)]
    email: String,
    /// Job title.
    #[arg(long, default_value = "")]
    position: String,
    /// Department.
    #[arg(long, default_value = "")]
    department: String,

    #[command(flatten)]
    capture: CaptureArgs,
}

/// Resolved settings for one run.
struct RunSettings {
    session: SessionConfig,
    output_dir: PathBuf,
    metrics_port: u16,
}

impl RunSettings {
    fn resolve(file: FileConfig, args: &CaptureArgs) -> Result<Self, CliError> {
        let mut session = file.session;
        if args.auto {
            session.auto_capture = true;
        }
        if let Some(countdown) = args.countdown {
            session.countdown_secs = countdown;
        }
        if let Some(format) = args.format {
            session.format = match format {
                FormatArg::Png => StillFormat::Png,
                FormatArg::Jpeg => StillFormat::Jpeg,
            };
        }
        if let Some(facing) = args.facing {
            session.facing = match facing {
                FacingArg::User => FacingMode::User,
                FacingArg::Environment => FacingMode::Environment,
            };
        }
        if let Some(width) = args.width {
            session.width = width;
        }
        if let Some(height) = args.height {
            session.height = height;
        }
        #[cfg(feature = "camera")]
        if let Some(device) = args.device {
            session.device_id = device;
        }
        session.validate()?;

        #[cfg(feature = "metrics")]
        let metrics_port = args.metrics_port.unwrap_or(file.output.metrics_port);
        #[cfg(not(feature = "metrics"))]
        let metrics_port = file.output.metrics_port;

        Ok(Self {
            session,
            output_dir: args
                .output
                .clone()
                .unwrap_or(file.output.directory),
            metrics_port,
        })
    }
}

/// Pushes session snapshots to the metrics registry and, when serving,
/// to the HTTP exporter.
struct Reporter {
    registry: MetricsRegistry,
    #[cfg(feature = "metrics")]
    served: Option<std::sync::Arc<tokio::sync::RwLock<facecap::metrics::MetricsState>>>,
}

impl Reporter {
    fn new(metrics_port: u16) -> Result<Self, CliError> {
        let registry = MetricsRegistry::new()?;

        #[cfg(feature = "metrics")]
        {
            use facecap::metrics::{MetricsServer, MetricsServerConfig};

            let served = if metrics_port > 0 {
                let server = MetricsServer::new(
                    MetricsServerConfig::with_port(metrics_port),
                    MetricsRegistry::new()?,
                );
                let state = server.state();
                tokio::spawn(async move {
                    if let Err(e) = server.run().await {
                        warn!(error = %e, "Metrics server stopped");
                    }
                });
                Some(state)
            } else {
                None
            };
            Ok(Self { registry, served })
        }

        #[cfg(not(feature = "metrics"))]
        {
            if metrics_port > 0 {
                warn!(
                    port = metrics_port,
                    "Metrics port configured but the metrics feature is disabled"
                );
            }
            Ok(Self { registry })
        }
    }

    async fn record(&self, snapshot: &SessionSnapshot) {
        self.registry
            .update(&MetricsSnapshot::from_session(snapshot));
        #[cfg(feature = "metrics")]
        if let Some(state) = &self.served {
            state.write().await.update(snapshot);
        }
    }

    fn encode(&self) -> Result<String, CliError> {
        Ok(self.registry.encode()?)
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    info!("facecap v{}", facecap::VERSION);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(run(cli));
    // A pending stdin read must not keep the process alive
    runtime.shutdown_background();

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let file = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };

    match cli.command {
        Command::Capture(args) => {
            let settings = RunSettings::resolve(file, &args)?;
            let reporter = Reporter::new(settings.metrics_port)?;
            let image = capture(&args, &settings, &reporter).await?;
            let path = write_image(&image, &settings.output_dir, "capture")?;
            println!("{}", path.display());
            finish(&reporter, cli.print_metrics)
        }
        Command::Enroll(args) => {
            let settings = RunSettings::resolve(file, &args.capture)?;
            let reporter = Reporter::new(settings.metrics_port)?;
            let image = capture(&args.capture, &settings, &reporter).await?;
            let path = write_image(&image, &settings.output_dir, &args.id)?;

            let mut roster = InMemoryRoster::new();
            roster.add(
                Employee::new(args.id, args.name, args.email, args.position, args.department)
                    .with_face(image),
            )?;
            for employee in roster.list() {
                info!(
                    id = %employee.id,
                    name = %employee.name,
                    department = %employee.department,
                    photo = %path.display(),
                    "Employee enrolled"
                );
            }
            println!("{}", path.display());
            finish(&reporter, cli.print_metrics)
        }
    }
}

fn finish(reporter: &Reporter, print_metrics: bool) -> Result<(), CliError> {
    if print_metrics {
        print!("{}", reporter.encode()?);
    }
    Ok(())
}

async fn capture(
    args: &CaptureArgs,
    settings: &RunSettings,
    reporter: &Reporter,
) -> Result<CapturedImage, CliError> {
    #[cfg(feature = "camera")]
    if args.device.is_some() {
        return capture_with(
            facecap::capture::NativeSource::new(),
            settings.session.clone(),
            reporter,
        )
        .await;
    }

    let source = if args.deny_permission {
        MockSource::new().deny_permission()
    } else {
        MockSource::new()
    };
    capture_with(source, settings.session.clone(), reporter).await
}

async fn capture_with<S: VideoSource>(
    source: S,
    config: SessionConfig,
    reporter: &Reporter,
) -> Result<CapturedImage, CliError> {
    let auto = config.auto_capture.then_some(config.countdown_secs);
    let (image_tx, mut image_rx) = mpsc::unbounded_channel();
    let session = CaptureSession::new(source, config).on_capture(move |image| {
        // Receiver is gone only when the CLI is already shutting down
        let _ = image_tx.send(image);
    });
    let (driver, handle) = SessionDriver::new(session);

    let interrupt = handle.clone();
    ctrlc::set_handler(move || {
        info!("Interrupted, releasing camera");
        let _ = interrupt.blocking_shutdown();
    })?;

    let client = async {
        handle.start().await?;
        let result = wait_for_image(&handle, &mut image_rx, auto, reporter).await;
        if !handle.is_closed() {
            handle.shutdown().await?;
        }
        result
    };

    let (stats, result) = tokio::join!(driver.run(), client);
    log_stats(&stats);
    result
}

/// Counts capture failures reported by the session against a fixed budget.
#[derive(Debug)]
struct CaptureAttempts {
    seen_failures: u64,
    remaining: u32,
}

impl CaptureAttempts {
    fn new(attempts: u32) -> Self {
        Self {
            seen_failures: 0,
            remaining: attempts,
        }
    }

    /// Returns `Ok(true)` when a new failure was seen and another attempt
    /// may be made, `Ok(false)` when nothing new failed.
    fn observe(&mut self, failed_captures: u64) -> Result<bool, CliError> {
        if failed_captures <= self.seen_failures {
            return Ok(false);
        }
        self.seen_failures = failed_captures;
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            return Err(CliError::CaptureFailed(CAPTURE_ATTEMPTS));
        }
        Ok(true)
    }
}

/// Drives the session until an image arrives.
///
/// `auto` carries the countdown length when capture is automatic; a failed
/// automatic capture restarts the countdown, a failed manual one prompts
/// again.
async fn wait_for_image(
    handle: &SessionHandle,
    images: &mut mpsc::UnboundedReceiver<CapturedImage>,
    auto: Option<u32>,
    reporter: &Reporter,
) -> Result<CapturedImage, CliError> {
    let mut last_countdown = None;
    let mut attempts = CaptureAttempts::new(CAPTURE_ATTEMPTS);
    let mut prompted = false;
    let mut enter: Option<JoinHandle<std::io::Result<()>>> = None;

    loop {
        tokio::select! {
            image = images.recv() => return image.ok_or(CliError::Interrupted),
            pressed = wait_for_enter(&mut enter) => {
                pressed?;
                handle.capture().await?;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let snapshot = match handle.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(DriverError::Closed) => return Err(CliError::Interrupted),
        };
        reporter.record(&snapshot).await;

        if snapshot.status == SessionStatus::Error {
            return Err(CliError::Camera(
                snapshot.error_message.unwrap_or_default(),
            ));
        }

        if attempts.observe(snapshot.stats.failed_captures)? {
            warn!(
                failed = snapshot.stats.failed_captures,
                "Capture failed, retrying"
            );
            match auto {
                Some(seconds) => handle.begin_countdown(seconds).await?,
                None => prompted = false,
            }
        }

        if snapshot.countdown != last_countdown {
            if let Some(seconds) = snapshot.countdown {
                println!("{}...", seconds);
            }
            last_countdown = snapshot.countdown;
        }

        if auto.is_none() && !prompted && snapshot.can_capture() {
            prompted = true;
            println!("Subject detected. Press Enter to capture.");
            enter = Some(tokio::task::spawn_blocking(|| {
                let mut line = String::new();
                std::io::stdin().read_line(&mut line).map(|_| ())
            }));
        }
    }
}

async fn wait_for_enter(
    enter: &mut Option<JoinHandle<std::io::Result<()>>>,
) -> Result<(), CliError> {
    let result = match enter.as_mut() {
        Some(task) => task.await,
        None => std::future::pending().await,
    };
    *enter = None;
    Ok(result??)
}

fn write_image(image: &CapturedImage, dir: &Path, prefix: &str) -> Result<PathBuf, CliError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(image.file_name(prefix));
    std::fs::write(&path, image.bytes())?;
    info!(
        path = %path.display(),
        bytes = image.bytes().len(),
        mime = image.mime_type(),
        "Wrote captured still"
    );
    Ok(path)
}

fn log_stats(stats: &SessionStats) {
    info!(
        start_attempts = stats.start_attempts,
        device_errors = stats.device_errors,
        detections = stats.detections,
        captures = stats.captures,
        releases = stats.stream_releases,
        "Session summary"
    );
}
