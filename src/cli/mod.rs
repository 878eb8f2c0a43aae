//! Command-line interface for the DICOM rendering tool.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use crate::batch::{BatchSummary, FileDiscovery, ThumbnailGenerator};
use crate::config::{CompressionLevel, PipelineConfig};
use crate::dicom::{transfer_syntax_name, DicomLoader};
use crate::error::RenderError;
use crate::histogram::{Histogram, HISTOGRAM_BINS};
use crate::pipeline::RenderPipeline;
use crate::progress::{ProgressEvent, ProgressHandler, ProgressPhase};
use crate::raster::PngEncoder;
use crate::window::{Preset, WindowLevel};

/// DICOM rendering tool
///
/// Windows DICOM slices to 8-bit grayscale, writes PNGs and thumbnails,
/// and summarises intensity distributions.
#[derive(Parser, Debug)]
#[command(name = "medimg-render")]
#[command(version)]
#[command(about = "Render DICOM slices to grayscale PNG, histograms and thumbnails")]
#[command(long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Pipeline configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a DICOM file to PNG
    Render {
        /// Input DICOM file path
        #[arg(short, long)]
        input: PathBuf,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,

        /// Window selection
        #[command(flatten)]
        window: WindowArgs,

        /// Downsample to a square of this size instead of full resolution
        #[arg(long)]
        thumbnail: Option<u32>,

        /// DEFLATE effort
        #[arg(long, value_enum)]
        compression: Option<CompressionArg>,
    },

    /// Print the intensity histogram of a DICOM file
    Histogram {
        /// Input DICOM file path
        #[arg(short, long)]
        input: PathBuf,

        /// Window selection
        #[command(flatten)]
        window: WindowArgs,

        /// Histogram of stored sample values instead of windowed output
        #[arg(long)]
        native: bool,

        /// Emit JSON instead of a text chart
        #[arg(long)]
        json: bool,
    },

    /// Render a thumbnail for every slice in a directory
    Thumbnails {
        /// Directory containing DICOM files
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for the PNG thumbnails
        #[arg(short, long)]
        output: PathBuf,

        /// Thumbnail edge length in pixels
        #[arg(short, long)]
        size: Option<u32>,

        /// Scan subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Also pick up files without an extension
        #[arg(long)]
        extensionless: bool,

        /// Number of worker threads
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Show information about a DICOM file
    Info {
        /// Input DICOM file path
        #[arg(short, long)]
        input: PathBuf,

        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// List the window presets
    Presets,
}

/// Window selection shared by rendering commands.
#[derive(Args, Debug, Clone, Default)]
pub struct WindowArgs {
    /// Named window preset
    #[arg(short, long, value_enum, conflicts_with_all = ["width", "center"])]
    pub preset: Option<PresetArg>,

    /// Window width
    #[arg(long, requires = "center")]
    pub width: Option<f64>,

    /// Window center (level)
    #[arg(long, requires = "width", allow_hyphen_values = true)]
    pub center: Option<f64>,
}

impl WindowArgs {
    /// Explicit window requested on the command line, if any.
    pub fn resolve(&self) -> Result<Option<WindowLevel>, RenderError> {
        if let Some(preset) = self.preset {
            return Ok(Some(Preset::from(preset).window_level()));
        }
        match (self.width, self.center) {
            (Some(width), Some(center)) => {
                let window = WindowLevel::new(width, center);
                window.validate()?;
                Ok(Some(window))
            }
            _ => Ok(None),
        }
    }
}

/// Window preset argument.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresetArg {
    /// CT abdomen (400/40)
    CtAbdomen,
    /// CT lung (1500/-600)
    CtLung,
    /// CT bone (2000/500)
    CtBone,
    /// CT brain (80/40)
    CtBrain,
    /// CT liver (150/30)
    CtLiver,
    /// CT mediastinum (350/50)
    CtMediastinum,
    /// MR default (800/400)
    MrDefault,
    /// MR T1 (600/300)
    MrT1,
    /// MR T2 (1000/500)
    MrT2,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::CtAbdomen => Preset::CtAbdomen,
            PresetArg::CtLung => Preset::CtLung,
            PresetArg::CtBone => Preset::CtBone,
            PresetArg::CtBrain => Preset::CtBrain,
            PresetArg::CtLiver => Preset::CtLiver,
            PresetArg::CtMediastinum => Preset::CtMediastinum,
            PresetArg::MrDefault => Preset::MrDefault,
            PresetArg::MrT1 => Preset::MrT1,
            PresetArg::MrT2 => Preset::MrT2,
        }
    }
}

/// Compression effort argument.
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum CompressionArg {
    /// Fastest, largest files
    Fast,
    /// zlib default
    Default,
    /// Smallest files
    Best,
}

impl From<CompressionArg> for CompressionLevel {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::Fast => CompressionLevel::Fast,
            CompressionArg::Default => CompressionLevel::Default,
            CompressionArg::Best => CompressionLevel::Best,
        }
    }
}

/// Run the CLI application.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
            .init();
    } else if !cli.quiet {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .init();
    }

    let config = match cli.config {
        Some(ref path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Render {
            input,
            output,
            window,
            thumbnail,
            compression,
        } => {
            let mut config = config;
            if let Some(level) = compression {
                config.compression = level.into();
            }
            run_render(&input, &output, &window, thumbnail, config, cli.quiet)
        }
        Commands::Histogram {
            input,
            window,
            native,
            json,
        } => run_histogram(&input, &window, native, json, config),
        Commands::Thumbnails {
            input,
            output,
            size,
            recursive,
            extensionless,
            jobs,
        } => {
            let mut config = config;
            if let Some(size) = size {
                config.thumbnail_size = size;
            }
            if let Some(jobs) = jobs {
                config.max_parallel = jobs;
            }
            config.validate()?;
            run_thumbnails(&input, &output, recursive, extensionless, config, cli.quiet)
        }
        Commands::Info { input, json } => run_info(&input, json),
        Commands::Presets => {
            print_presets();
            Ok(())
        }
    }
}

fn run_render(
    input: &Path,
    output: &Path,
    window: &WindowArgs,
    thumbnail: Option<u32>,
    config: PipelineConfig,
    quiet: bool,
) -> anyhow::Result<()> {
    let pipeline = RenderPipeline::new(config);
    let frame = pipeline.render_file(input, window.resolve()?)?;

    let png = match thumbnail {
        Some(size) => {
            let pixels = pipeline.thumbnail(&frame, size)?;
            PngEncoder::new(pipeline.config().compression).encode(&pixels, size, size)?
        }
        None => pipeline.encode(&frame)?,
    };
    fs::write(output, &png).with_context(|| format!("Failed to write {}", output.display()))?;

    if !quiet {
        println!("Rendered {} -> {}", input.display(), output.display());
        println!("  Dimensions: {}x{}", frame.width, frame.height);
        println!("  Window: {}", frame.window);
        println!("  PNG Size: {} bytes", png.len());
        println!("  Time: {} ms", frame.render_time_ms);
    }
    Ok(())
}

fn run_histogram(
    input: &Path,
    window: &WindowArgs,
    native: bool,
    json: bool,
    config: PipelineConfig,
) -> anyhow::Result<()> {
    let pipeline = RenderPipeline::new(config);
    let histogram = if native {
        let frame = DicomLoader::new().open(input)?;
        pipeline.sample_histogram(&frame.buffer)?
    } else {
        pipeline.render_file(input, window.resolve()?)?.histogram
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&histogram)?);
    } else {
        println!("Histogram: {}", input.display());
        print!("{}", format_histogram(&histogram, 16, 50));
    }
    Ok(())
}

fn run_thumbnails(
    input: &Path,
    output: &Path,
    recursive: bool,
    extensionless: bool,
    config: PipelineConfig,
    quiet: bool,
) -> anyhow::Result<()> {
    let files = FileDiscovery::new()
        .recursive(recursive)
        .include_extensionless(extensionless)
        .discover(input)?;
    if files.is_empty() {
        bail!("No DICOM files found in {}", input.display());
    }
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let progress = BarProgress::new(files.len(), quiet);
    progress.on_progress(&ProgressEvent::discovery(format!(
        "Found {} files in {}",
        files.len(),
        input.display()
    )));
    let loader = DicomLoader::new().fallback_window(config.default_window);
    let generator = ThumbnailGenerator::with_config(loader, progress, &config);
    let batch = generator.generate(&files)?;

    let encoder = PngEncoder::new(config.compression);
    let mut written = 0;
    for thumb in batch.thumbnails.iter().filter(|t| !t.is_placeholder()) {
        let stem = files[thumb.index]
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = output.join(format!("{:04}_{}.png", thumb.display_number(), stem));
        let png = encoder.encode(&thumb.pixels, thumb.width, thumb.height)?;
        fs::write(&path, png).with_context(|| format!("Failed to write {}", path.display()))?;
        written += 1;
    }

    if !quiet {
        print_summary(&batch.summary, written, output);
    }
    Ok(())
}

fn run_info(input: &Path, json: bool) -> anyhow::Result<()> {
    let frame = DicomLoader::new().open(input)?;
    let metadata = &frame.metadata;

    if json {
        println!("{}", serde_json::to_string_pretty(metadata)?);
        return Ok(());
    }

    println!("DICOM File Information");
    println!("======================");
    println!("File: {}", input.display());
    println!();

    println!("Image Properties:");
    println!("  Dimensions: {}x{}", metadata.width, metadata.height);
    println!("  Bits Stored: {}", metadata.bits_stored);
    println!("  Bits Allocated: {}", metadata.bits_allocated);
    println!("  Photometric: {}", metadata.photometric_interpretation);
    println!("  Frames: {}", metadata.number_of_frames);
    println!(
        "  Signed: {}",
        if metadata.pixel_representation == 1 { "Yes" } else { "No" }
    );
    println!(
        "  Rescale: slope {} intercept {}",
        metadata.rescale_slope, metadata.rescale_intercept
    );
    match metadata.window {
        Some(window) => println!("  Window: {}", window),
        None => println!("  Window: none (default {})", WindowLevel::DEFAULT),
    }
    println!();

    println!("Transfer Syntax:");
    println!("  UID: {}", metadata.transfer_syntax);
    println!("  Name: {}", transfer_syntax_name(&metadata.transfer_syntax));
    println!();

    if let Some(ref modality) = metadata.modality {
        println!("Modality: {}", modality);
    }
    if let Some(ref description) = metadata.series_description {
        println!("Series: {}", description);
    }
    if let Some(ref id) = metadata.patient_id {
        println!("Patient ID: {}", id);
    }
    Ok(())
}

fn print_presets() {
    println!("{:<16} {:<16} {:>8} {:>8}", "KEY", "NAME", "WIDTH", "CENTER");
    for preset in Preset::ALL {
        let window = preset.window_level();
        println!(
            "{:<16} {:<16} {:>8} {:>8}",
            preset.key(),
            preset.name(),
            window.width,
            window.center
        );
    }
}

fn print_summary(summary: &BatchSummary, written: usize, output: &Path) {
    println!("Thumbnails: {}", output.display());
    println!("  Files: {}", summary.total);
    println!("  Written: {}", written);
    println!("  Failed: {}", summary.failed);
    if summary.cancelled > 0 {
        println!("  Cancelled: {}", summary.cancelled);
    }
    println!("  Time: {:.2?}", summary.elapsed);
}

/// Text chart of a histogram, `rows` lines of bars at most `width` wide.
///
/// Bars are scaled to [`Histogram::display_max`] so a few dominant bins do
/// not flatten the rest.
pub fn format_histogram(histogram: &Histogram, rows: usize, width: usize) -> String {
    let mut out = format!(
        "  Samples: {}  Range: {}-{}  Peak: {} at {}\n",
        histogram.total_samples,
        histogram.min_value,
        histogram.max_value,
        histogram.peak_value,
        histogram.peak_index
    );
    let rows = rows.clamp(1, HISTOGRAM_BINS);
    let group = HISTOGRAM_BINS.div_ceil(rows);
    let scale = histogram.display_max().max(1) as f64;

    for (i, bins) in histogram.bins.chunks(group).enumerate() {
        let value = bins.iter().copied().max().unwrap_or(0);
        let bar = ((value as f64 / scale).min(1.0) * width as f64).round() as usize;
        out.push_str(&format!(
            "  {:>3}-{:<3} |{}\n",
            i * group,
            i * group + bins.len() - 1,
            "#".repeat(bar)
        ));
    }
    out
}

/// Progress bar for thumbnail batches.
struct BarProgress {
    bar: Option<ProgressBar>,
}

impl BarProgress {
    fn new(total: usize, quiet: bool) -> Self {
        let bar = (!quiet).then(|| {
            let bar = ProgressBar::new(total as u64);
            let style = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        });
        Self { bar }
    }
}

impl ProgressHandler for BarProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        let Some(ref bar) = self.bar else {
            return;
        };
        match event.phase {
            ProgressPhase::Discovery | ProgressPhase::Complete => {
                bar.println(event.message.as_str());
            }
            ProgressPhase::Failed => bar.println(format!("  {}", event.message)),
            ProgressPhase::Rendering => {}
        }
        // Workers finish out of order; keep the bar monotonic.
        if event.completed as u64 > bar.position() {
            bar.set_position(event.completed as u64);
        }
        if event.current_file.is_some() {
            bar.set_message(event.message.clone());
        }
    }

    fn on_complete(&self, _summary: &BatchSummary) {
        if let Some(ref bar) = self.bar {
            bar.finish_with_message("done");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_render_with_preset() {
        let cli = Cli::try_parse_from([
            "medimg-render", "render", "-i", "in.dcm", "-o", "out.png", "--preset", "ct-lung",
        ])
        .unwrap();
        match cli.command {
            Commands::Render { window, .. } => {
                assert_eq!(window.preset, Some(PresetArg::CtLung));
                assert_eq!(
                    window.resolve().unwrap(),
                    Some(WindowLevel::new(1500.0, -600.0))
                );
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_explicit_window() {
        let cli = Cli::try_parse_from([
            "medimg-render", "histogram", "-i", "in.dcm", "--width", "1500", "--center", "-600",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Histogram { window, json, .. } => {
                assert!(json);
                assert_eq!(
                    window.resolve().unwrap(),
                    Some(WindowLevel::new(1500.0, -600.0))
                );
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_window_requires_both_values() {
        assert!(Cli::try_parse_from([
            "medimg-render", "render", "-i", "a.dcm", "-o", "a.png", "--width", "400",
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "medimg-render", "render", "-i", "a.dcm", "-o", "a.png", "--preset", "ct-bone",
            "--width", "400", "--center", "40",
        ])
        .is_err());
    }

    #[test]
    fn test_invalid_explicit_window() {
        let args = WindowArgs {
            preset: None,
            width: Some(0.0),
            center: Some(40.0),
        };
        assert!(matches!(args.resolve(), Err(RenderError::InvalidWindow(_))));
        assert_eq!(WindowArgs::default().resolve().unwrap(), None);
    }

    #[test]
    fn test_preset_args_cover_table() {
        for arg in PresetArg::value_variants() {
            let preset = Preset::from(*arg);
            let name = arg.to_possible_value().unwrap().get_name().to_string();
            assert_eq!(name, preset.key());
        }
        assert_eq!(PresetArg::value_variants().len(), Preset::ALL.len());
    }

    #[test]
    fn test_parse_thumbnails() {
        let cli = Cli::try_parse_from([
            "medimg-render", "-q", "thumbnails", "-i", "series", "-o", "thumbs", "-s", "96",
            "-r", "-j", "2",
        ])
        .unwrap();
        assert!(cli.quiet);
        match cli.command {
            Commands::Thumbnails {
                size,
                recursive,
                jobs,
                ..
            } => {
                assert_eq!(size, Some(96));
                assert!(recursive);
                assert_eq!(jobs, Some(2));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_format_histogram() {
        let mut pixels = vec![0u8; 100];
        pixels.extend(std::iter::repeat(200u8).take(10));
        let histogram = crate::histogram::histogram(&pixels);

        let text = format_histogram(&histogram, 16, 20);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 17);
        assert!(lines[0].contains("Samples: 110"));
        assert!(lines[1].starts_with("    0-15  |"));
        // bin 200 falls in the 192-207 row
        assert!(lines[13].contains("192-207"));
    }

    #[test]
    fn test_bar_progress_never_moves_backwards() {
        let progress = BarProgress {
            bar: Some(ProgressBar::hidden()),
        };
        progress.on_progress(&ProgressEvent::discovery("Found 3 files"));
        progress.on_progress(&ProgressEvent::rendered(Path::new("b.dcm"), 2, 3));
        progress.on_progress(&ProgressEvent::rendered(Path::new("a.dcm"), 1, 3));

        let bar = progress.bar.as_ref().unwrap();
        assert_eq!(bar.position(), 2);

        let error = RenderError::DecodeFailure("truncated".into());
        progress.on_progress(&ProgressEvent::failed(Path::new("c.dcm"), 3, 3, &error));
        assert_eq!(bar.position(), 3);
    }
}
