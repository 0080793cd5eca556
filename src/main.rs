// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{error, info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use autotube::app_config::{self, Config};
use autotube::app_controller::{Controller, ProgressBarReporter, ShortRequest};
use autotube::file_utils::FileManager;
use autotube::media::{CancellationToken, ClipRequest};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Locate and verify ffmpeg/ffprobe
    Tools,

    /// Print the duration of a media file
    Probe {
        /// Media file to probe
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Extract a single clip
    Extract(ExtractArgs),

    /// Cut clips out of a video or every video in a directory
    Clip(ClipArgs),

    /// List scene changes of a video
    Scenes {
        /// Video to analyse
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Scene score threshold in (0, 1]
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Generate an SRT file from narration text
    Subtitles(SubtitlesArgs),

    /// Compose a narrated short with burned-in captions
    Short(ShortArgs),

    /// Generate shell completions for autotube
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    // @checks: Whether the command spawns ffmpeg/ffprobe
    fn needs_media_tools(&self) -> bool {
        match self {
            Commands::Subtitles(args) => args.audio.is_some(),
            Commands::Completions { .. } => false,
            _ => true,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
struct TransformArgs {
    /// Reframe to 1080x1920
    #[arg(long)]
    vertical: bool,

    /// Drop the audio stream
    #[arg(long)]
    remove_audio: bool,

    /// Flip horizontally
    #[arg(long)]
    mirror: bool,

    /// Boost contrast and saturation
    #[arg(long)]
    enhance: bool,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Source video
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file
    #[arg(short, long)]
    output: PathBuf,

    /// Start offset in seconds
    #[arg(short, long)]
    start: f64,

    /// Clip length in seconds
    #[arg(short = 'd', long)]
    length: f64,

    #[command(flatten)]
    transform: TransformArgs,
}

#[derive(Args, Debug)]
struct ClipArgs {
    /// Input video file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Output directory (defaults to the configured one)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Clips per video
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Shortest clip in seconds
    #[arg(long)]
    min_length: Option<u64>,

    /// Longest clip in seconds
    #[arg(long)]
    max_length: Option<u64>,

    /// Use random offsets instead of scene boundaries
    #[arg(long)]
    no_scenes: bool,

    /// Leave clips directly in the output directory
    #[arg(long)]
    no_organize: bool,

    #[command(flatten)]
    transform: TransformArgs,
}

#[derive(Args, Debug, Clone)]
struct NarrationArgs {
    /// Narration text
    #[arg(long, conflicts_with = "text_file")]
    text: Option<String>,

    /// File holding the narration text
    #[arg(long)]
    text_file: Option<PathBuf>,

    /// Speech marks file (JSON lines or array)
    #[arg(long)]
    marks: Option<PathBuf>,
}

impl NarrationArgs {
    fn narration(&self) -> Result<String> {
        match (&self.text, &self.text_file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read narration file: {}", path.display())),
            (None, None) => Err(anyhow!("Either --text or --text-file is required")),
        }
    }
}

#[derive(Args, Debug)]
struct SubtitlesArgs {
    #[command(flatten)]
    narration: NarrationArgs,

    /// Narration audio, probed for the total duration
    #[arg(long, conflicts_with = "duration", required_unless_present = "duration")]
    audio: Option<PathBuf>,

    /// Total duration in seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Output SRT file
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ShortArgs {
    /// Background video
    #[arg(short, long)]
    background: PathBuf,

    /// Narration audio
    #[arg(short, long)]
    audio: PathBuf,

    #[command(flatten)]
    narration: NarrationArgs,

    /// Output directory (defaults to the configured one)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

/// autotube - short-form video toolkit
///
/// Cuts clips out of long videos and composes narrated vertical shorts
/// with burned-in captions, using ffmpeg and ffprobe.
#[derive(Parser, Debug)]
#[command(name = "autotube")]
#[command(version)]
#[command(about = "Clip long videos and compose narrated shorts")]
#[command(long_about = "autotube drives ffmpeg/ffprobe to cut clips out of long videos and to build narrated shorts.

EXAMPLES:
    autotube tools                                     # Show which ffmpeg/ffprobe are used
    autotube clip movie.mkv                            # Cut clips along scene changes
    autotube clip -n 3 --vertical /videos/             # Three vertical clips per video
    autotube extract in.mp4 -o out.mp4 -s 30 -d 15     # One 15s clip at 0:30
    autotube scenes -t 0.4 in.mp4                      # List scene changes
    autotube short -b bg.mp4 -a voice.mp3 --text-file script.txt
    autotube completions bash > autotube.bash          # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(short, long, global = true, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI colour for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The logger accepts everything; the effective level is set through set_max_level
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "autotube", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli)?;
    log::set_max_level(config.log_level.to_level_filter());

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling...");
            signal_token.cancel();
        }
    });

    let mut controller = Controller::with_config(config);
    if cli.command.needs_media_tools() {
        controller.initialize().await;
        if !controller.is_initialized() {
            error!("ffmpeg/ffprobe could not be found or verified. Install them or set tools.bin_dir in the config.");
            return Err(anyhow!("Media tools are not available"));
        }
    }

    match cli.command {
        Commands::Tools => {
            let tools = controller.tools();
            println!("ffmpeg:  {}", tools.require_transcoder()?.display());
            println!("ffprobe: {}", tools.require_prober()?.display());
        }
        Commands::Probe { file } => {
            let duration = controller.probe_duration(&file, &cancel).await?;
            println!("{:.3}", duration.as_secs_f64());
        }
        Commands::Extract(args) => run_extract(&controller, args, &cancel).await?,
        Commands::Clip(args) => run_clip(controller, args, &cancel).await?,
        Commands::Scenes { input, threshold } => {
            let threshold = threshold.unwrap_or(controller.config().clipping.scene_threshold);
            let reporter = ProgressBarReporter::new();
            let scenes = controller.detect_scenes(&input, threshold, &reporter, &cancel).await;
            reporter.finish("Scene detection done");
            for scene in scenes? {
                match scene.score {
                    Some(score) => println!("{:.3}\t{:.4}", scene.timestamp_seconds, score),
                    None => println!("{:.3}", scene.timestamp_seconds),
                }
            }
        }
        Commands::Subtitles(args) => {
            let narration = args.narration.narration()?;
            let total = match (&args.audio, args.duration) {
                (Some(audio), _) => controller.probe_duration(audio, &cancel).await?,
                (None, Some(secs)) if secs.is_finite() && secs > 0.0 => Duration::from_secs_f64(secs),
                _ => return Err(anyhow!("A positive --duration or an --audio file is required")),
            };
            let cues = controller.generate_subtitles(
                &narration,
                total,
                args.narration.marks.as_deref(),
                &args.output,
            )?;
            info!("Success: {} cues written to {}", cues.len(), args.output.display());
        }
        Commands::Short(args) => {
            let output_dir = args
                .output_dir
                .clone()
                .unwrap_or_else(|| controller.config().output.resolve_output_dir());
            let request = ShortRequest {
                background_path: args.background.clone(),
                audio_path: args.audio.clone(),
                narration: args.narration.narration()?,
                speech_marks_path: args.narration.marks.clone(),
                output_dir,
            };
            let reporter = ProgressBarReporter::new();
            let result = controller.run_short(&request, &reporter, &cancel).await;
            reporter.finish("Short done");
            let output = result?;
            info!("Success: {}", output.display());
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

// Load the config file, apply the CLI log level and validate
fn load_config(cli: &CommandLineOptions) -> Result<Config> {
    let mut config = Config::load_or_create(&cli.config_path)?;
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone().into();
    }
    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

async fn run_extract(controller: &Controller, args: ExtractArgs, cancel: &CancellationToken) -> Result<()> {
    if !(args.start.is_finite() && args.start >= 0.0) {
        return Err(anyhow!("Start offset must be a non-negative number of seconds"));
    }
    if !(args.length.is_finite() && args.length > 0.0) {
        return Err(anyhow!("Clip length must be a positive number of seconds"));
    }

    let mut request = ClipRequest::new(
        &args.input,
        &args.output,
        Duration::from_secs_f64(args.start),
        Duration::from_secs_f64(args.length),
    );
    request.vertical_format = args.transform.vertical;
    request.remove_audio = args.transform.remove_audio;
    request.mirror = args.transform.mirror;
    request.enhance = args.transform.enhance;

    let reporter = ProgressBarReporter::new();
    let result = controller.extract_clip(&request, &reporter, cancel).await;
    reporter.finish("Extraction done");
    result?;
    info!("Success: {}", args.output.display());
    Ok(())
}

async fn run_clip(controller: Controller, args: ClipArgs, cancel: &CancellationToken) -> Result<()> {
    let mut config = controller.config().clone();
    let clipping = &mut config.clipping;
    if let Some(count) = args.count {
        clipping.clip_count = count;
    }
    if let Some(min) = args.min_length {
        clipping.min_clip_secs = min;
    }
    if let Some(max) = args.max_length {
        clipping.max_clip_secs = max;
    }
    clipping.use_scene_detection &= !args.no_scenes;
    clipping.vertical |= args.transform.vertical;
    clipping.remove_audio |= args.transform.remove_audio;
    clipping.mirror |= args.transform.mirror;
    clipping.enhance |= args.transform.enhance;
    config.output.organize_output &= !args.no_organize;
    config.validate().context("Invalid clipping options")?;

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output.resolve_output_dir());
    let inputs = FileManager::find_video_files(&args.input_path)?;
    if inputs.is_empty() {
        warn!("No video files found in {}", args.input_path.display());
        return Ok(());
    }
    info!("Found {} video(s), writing clips to {}", inputs.len(), output_dir.display());

    let controller = Controller::with_tools(config, controller.tools().clone());
    let reporter = ProgressBarReporter::new();
    let summary = controller
        .run_clipping(&inputs, Path::new(&output_dir), &reporter, cancel)
        .await;
    reporter.finish("Clipping done");
    let summary = summary?;

    if summary.cancelled {
        warn!("Clipping cancelled after {} clip(s)", summary.clips_generated);
    }
    println!(
        "Videos: {}, clips generated: {}, skipped: {}, errors: {}",
        summary.videos, summary.clips_generated, summary.skipped, summary.errors
    );
    if summary.errors > 0 && summary.clips_generated == 0 {
        return Err(anyhow!("No clips could be generated"));
    }
    Ok(())
}
