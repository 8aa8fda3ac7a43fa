//! handscan CLI: batch 2D:4D measurement from a photo with a reference coin.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use handscan::source::{
    decode_model_output, BackendError, HandPose, HandPoseBackend, HttpTransport,
    LandmarkPredictor, LetterboxTransform, ManualClicks, ModelOutputLayout, ModelSource,
    PredictorOutput, ProxySource, RemoteSource,
};
use handscan::{
    AcquireError, AnnotationExport, ClickOutcome, CoinDetector, CoinOutcome, CoinType,
    EngineConfig, Fallback, Frame, GradientHough, LandmarkKey, LandmarkSet, MeasurementResult,
    Point, ScaleReference, Session,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "handscan")]
#[command(about = "Measure index/ring finger lengths and their 2D:4D ratio against a coin")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the coin, acquire landmarks and write a measurement report.
    Measure(CliMeasureArgs),

    /// Print the reference coin presets.
    Coins,

    /// Run coin detection only and print the result.
    DetectCoin(CliDetectCoinArgs),
}

#[derive(Debug, Clone, Args)]
struct CliConfigArgs {
    /// Engine configuration (JSON). Command-line flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reference coin preset (quarter, nickel, dime, penny).
    #[arg(long)]
    coin: Option<CoinType>,

    /// Custom coin diameter in millimetres (overrides --coin).
    #[arg(long)]
    coin_diameter_mm: Option<String>,

    /// Longest side of the working canvas in pixels.
    #[arg(long)]
    max_dim: Option<u32>,
}

#[derive(Debug, Clone, Args)]
struct CliDetectCoinArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    #[command(flatten)]
    config: CliConfigArgs,
}

#[derive(Debug, Clone, Args)]
#[command(group = clap::ArgGroup::new("landmarks").multiple(false))]
struct CliMeasureArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// Path to write the measurement report (JSON).
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    config: CliConfigArgs,

    /// Manual coin center "x,y" in image pixels (requires --coin-edge).
    #[arg(long, value_parser = parse_point, requires = "coin_edge")]
    coin_center: Option<Point>,

    /// Manual coin edge point "x,y" in image pixels.
    #[arg(long, value_parser = parse_point, requires = "coin_center")]
    coin_edge: Option<Point>,

    /// Four landmarks "x,y" in image pixels: index base, index tip, ring base, ring tip.
    #[arg(long, num_args = 4, value_parser = parse_point, group = "landmarks")]
    points: Option<Vec<Point>>,

    /// Annotation export to take this image's landmarks from.
    #[arg(long, group = "landmarks")]
    annotations: Option<PathBuf>,

    /// Remote keypoint model endpoint (URL or "project/version").
    #[arg(long, group = "landmarks")]
    cloud_endpoint: Option<String>,

    /// Recorded raw output of a local landmark model (JSON:
    /// {"input": [w, h], "letterbox": bool, "data": [f32, ...]}), decoded with
    /// the config's `model_output` layout.
    #[arg(long, group = "landmarks")]
    model_output: Option<PathBuf>,

    /// API key for the remote endpoint.
    #[arg(long, requires = "cloud_endpoint")]
    api_key: Option<String>,

    /// Recorded hand-pose skeleton (JSON: {"score", "landmarks": 21 [x, y]}).
    /// Used as the landmark source, or as the fallback with --fallback-proxy.
    #[arg(long)]
    hand_pose: Option<PathBuf>,

    /// Fall back to the hand-pose proxy when the remote or local model fails.
    #[arg(long, requires = "hand_pose")]
    fallback_proxy: bool,

    /// Knuckle-to-wrist fraction for proxy crease estimates, in [0, 0.3].
    #[arg(long)]
    proxy_fraction: Option<f64>,

    /// Disable crease refinement of proxy landmarks.
    #[arg(long)]
    no_refine: bool,
}

fn parse_point(s: &str) -> Result<Point, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"x,y\", got \"{s}\""))?;
    let x: f64 = x.trim().parse().map_err(|e| format!("bad x in \"{s}\": {e}"))?;
    let y: f64 = y.trim().parse().map_err(|e| format!("bad y in \"{s}\": {e}"))?;
    Ok(Point::new(x, y))
}

impl CliConfigArgs {
    fn to_engine_config(&self) -> CliResult<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path).map_err(|e| -> CliError {
                format!("Failed to load config {}: {}", path.display(), e).into()
            })?,
            None => EngineConfig::default(),
        };
        if let Some(coin) = self.coin {
            config.coin = coin;
        }
        if let Some(mm) = &self.coin_diameter_mm {
            config.coin = CoinType::Custom(handscan::parse_diameter_mm(mm)?);
        }
        if let Some(max_dim) = self.max_dim {
            config.canvas.max_dim = max_dim;
        }
        Ok(config)
    }
}

impl CliMeasureArgs {
    fn to_engine_config(&self) -> CliResult<EngineConfig> {
        let mut config = self.config.to_engine_config()?;
        if let Some(t) = self.proxy_fraction {
            config.proxy.crease_fraction = t;
        }
        if self.no_refine {
            config.proxy.refine = false;
        }
        if self.fallback_proxy {
            config.fallback.on_remote_failure = Fallback::GeometricProxy;
            config.fallback.on_model_unavailable = Fallback::GeometricProxy;
        }
        if let Some(endpoint) = &self.cloud_endpoint {
            config.remote.endpoint = endpoint.clone();
            config.remote.api_key = self.api_key.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// Hand-pose backend replaying a skeleton recorded by an external detector.
struct RecordedPose(HandPose);

impl HandPoseBackend for RecordedPose {
    async fn estimate<'a>(&'a self, _frame: &'a Frame) -> Result<Option<HandPose>, BackendError> {
        Ok(Some(self.0.clone()))
    }
}

/// Output tensor captured from a landmark model run outside this tool.
#[derive(Debug, serde::Deserialize)]
struct RecordedTensor {
    input: [u32; 2],
    #[serde(default = "default_letterbox")]
    letterbox: bool,
    data: Vec<f32>,
}

fn default_letterbox() -> bool {
    true
}

/// Landmark predictor replaying a recorded output tensor.
struct RecordedModel {
    tensor: RecordedTensor,
    layout: ModelOutputLayout,
}

impl LandmarkPredictor for RecordedModel {
    async fn predict<'a>(&'a self, frame: &'a Frame) -> Result<Option<PredictorOutput>, BackendError> {
        let [w, h] = self.tensor.input;
        let transform =
            LetterboxTransform::new((w, h), (frame.width(), frame.height()), self.tensor.letterbox);
        Ok(Some(decode_model_output(&self.tensor.data, &transform, &self.layout)?))
    }
}

fn load_tensor(path: &Path) -> CliResult<RecordedTensor> {
    let data = std::fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|e| -> CliError {
        format!("Failed to parse model output {}: {}", path.display(), e).into()
    })
}

fn load_hand_pose(path: &Path) -> CliResult<HandPose> {
    let data = std::fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|e| -> CliError {
        format!("Failed to parse hand pose {}: {}", path.display(), e).into()
    })
}

fn load_frame(path: &Path, max_dim: u32) -> CliResult<Frame> {
    tracing::info!("Loading image: {}", path.display());
    let img = image::open(path).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", path.display(), e).into()
    })?;
    let frame = Frame::from_dynamic(&img, max_dim);
    tracing::info!(
        "Image size: {}x{} (canvas {}x{})",
        img.width(),
        img.height(),
        frame.width(),
        frame.height()
    );
    Ok(frame)
}

#[derive(Debug, serde::Serialize)]
struct MeasureReport {
    image: String,
    canvas_size: [u32; 2],
    canvas_to_original: f64,
    coin: CoinType,
    coin_diameter_cm: f64,
    scale: Option<ScaleReference>,
    landmarks: Option<LandmarkSet>,
    /// Name of the source the fallback replaced, when one was used.
    fallback_from: Option<String>,
    measurement: Option<MeasurementResult>,
    status: Vec<String>,
}

#[tokio::main]
async fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Measure(args) => run_measure(&args).await,
        Commands::Coins => run_coins(),
        Commands::DetectCoin(args) => run_detect_coin(&args),
    }
}

// ── coins ─────────────────────────────────────────────────────────────

fn run_coins() -> CliResult<()> {
    println!("handscan reference coins");
    for coin in CoinType::PRESETS {
        println!("  {:<8} {:>6.2} mm", coin.name(), coin.diameter_mm());
    }
    println!("  custom   use --coin-diameter-mm <mm>");
    Ok(())
}

// ── detect-coin ───────────────────────────────────────────────────────

fn run_detect_coin(args: &CliDetectCoinArgs) -> CliResult<()> {
    let config = args.config.to_engine_config()?;
    config.validate()?;
    let frame = load_frame(&args.image, config.canvas.max_dim)?;
    let detector = CoinDetector::new(GradientHough::new(config.hough), config.detection);
    let outcome = detector.detect(&frame);
    match &outcome {
        CoinOutcome::Found { scale, .. } => {
            let k = frame.canvas_to_original();
            println!(
                "coin at ({:.1}, {:.1}) r={:.1}px  confidence {:.2}",
                scale.center.x * k,
                scale.center.y * k,
                scale.radius_px * k,
                scale.confidence
            );
        }
        CoinOutcome::NotFound => {}
    }
    println!("{}", outcome.status());
    Ok(())
}

// ── measure ───────────────────────────────────────────────────────────

async fn run_measure(args: &CliMeasureArgs) -> CliResult<()> {
    let config = args.to_engine_config()?;
    let frame = load_frame(&args.image, config.canvas.max_dim)?;
    let to_canvas = 1.0 / frame.canvas_to_original();
    let canvas_size = [frame.width(), frame.height()];
    let canvas_to_original = frame.canvas_to_original();

    let mut session = Session::new(config.coin, config.fallback)?;
    session.load_frame(frame);
    let mut status = Vec::new();

    // Scale reference.
    match (args.coin_center, args.coin_edge) {
        (Some(center), Some(edge)) => {
            session.begin_manual_coin()?;
            if session.click(center.scaled(to_canvas))? == ClickOutcome::CoinCenterSet {
                session.click(edge.scaled(to_canvas))?;
            }
        }
        _ => {
            let detector =
                CoinDetector::new(GradientHough::new(config.hough.clone()), config.detection.clone());
            session.detect_coin(&detector)?;
        }
    }
    status.push(session.status().to_string());

    // Landmarks.
    let proxy = match &args.hand_pose {
        Some(path) => Some(ProxySource::new(
            RecordedPose(load_hand_pose(path)?),
            config.proxy.clone(),
        )),
        None => None,
    };
    let mut fallback_from = None;
    let acquired: Option<Result<LandmarkSet, AcquireError>> = if let Some(points) = &args.points {
        let clicks: Vec<Point> = points.iter().map(|p| p.scaled(to_canvas)).collect();
        Some(session.acquire(&ManualClicks::new(clicks)).await)
    } else if let Some(path) = &args.annotations {
        let export = AnnotationExport::from_json_file(path)?;
        let name = args
            .image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let item = export
            .find(&name)
            .ok_or_else(|| -> CliError { format!("No annotation for {name}").into() })?;
        let set = item.to_landmark_set(canvas_to_original)?;
        let clicks = LandmarkKey::ORDER.map(|k| set.get(k));
        Some(session.acquire(&ManualClicks::new(clicks)).await)
    } else if let Some(path) = &args.model_output {
        let model = ModelSource::new(
            RecordedModel {
                tensor: load_tensor(path)?,
                layout: config.model_output.clone(),
            },
            config.model.clone(),
        );
        Some(
            session
                .acquire_with_fallback(&model, proxy.as_ref())
                .await
                .map(|got| {
                    fallback_from = got.fallback_from.map(|e| e.to_string());
                    got.landmarks
                }),
        )
    } else if args.cloud_endpoint.is_some() {
        let remote = RemoteSource::new(config.remote.clone(), HttpTransport::default())?;
        tracing::info!("Cloud endpoint: {}", remote.url());
        Some(
            session
                .acquire_with_fallback(&remote, proxy.as_ref())
                .await
                .map(|got| {
                    fallback_from = got.fallback_from.map(|e| e.to_string());
                    got.landmarks
                }),
        )
    } else {
        match &proxy {
            Some(proxy) => Some(session.acquire(proxy).await),
            None => None,
        }
    };
    match acquired {
        Some(Ok(set)) => tracing::info!("Landmarks from {:?} (confidence {:.2})", set.source, set.confidence),
        Some(Err(e)) => tracing::warn!("Landmark acquisition failed: {e}"),
        None => tracing::warn!("No landmark source given; report will have no measurement"),
    }
    status.push(session.status().to_string());

    let measurement = session.measurement();
    match &measurement {
        Some(m) => {
            tracing::info!(
                "2D {:.3} cm, 4D {:.3} cm, ratio {}, confidence {:.2}",
                m.length_2d_cm,
                m.length_4d_cm,
                m.ratio_display(),
                m.confidence
            );
            status.push(format!("Ratio {}.", m.ratio_display()));
        }
        None => status.push("No measurement yet.".to_string()),
    }

    let report = MeasureReport {
        image: args.image.display().to_string(),
        canvas_size,
        canvas_to_original,
        coin: session.coin(),
        coin_diameter_cm: session.diameter_cm(),
        scale: session.scale().copied(),
        landmarks: session.landmarks().copied(),
        fallback_from,
        measurement,
        status,
    };
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&args.out, &json)?;
    tracing::info!("Results written to {}", args.out.display());
    Ok(())
}
