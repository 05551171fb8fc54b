use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

use animframe::{
    CacheRegeneration, FrameCache, FrameExportOpts, FrameSequenceExport, ImageHandle, LogProgress,
    OrchestratorOpts, PixelRect, ProceduralImage, ProceduralImageOpts, RenderConfig,
    RenderOrchestrator, RenderResult, TimeSpan,
};

#[derive(Parser, Debug)]
#[command(name = "animframe", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a procedural animation to a numbered PNG sequence.
    Export(ExportArgs),
    /// Fill a frame cache from a procedural animation and print the cached ranges.
    Cache(CacheArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// JSON render config (`max_threads`, `max_clones`, `frame_timeout_ms`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the total worker-thread budget.
    #[arg(long)]
    max_threads: Option<usize>,

    /// Override the maximum number of image clones.
    #[arg(long)]
    max_clones: Option<usize>,

    /// Override the per-frame timeout.
    #[arg(long)]
    frame_timeout_ms: Option<u64>,

    /// Report progress while the pass runs.
    #[arg(long)]
    progress: bool,
}

#[derive(Args, Debug)]
struct ImageArgs {
    /// Canvas width.
    #[arg(long, default_value_t = 64)]
    width: u32,

    /// Canvas height.
    #[arg(long, default_value_t = 64)]
    height: u32,

    /// Consecutive frames sharing the same content.
    #[arg(long, default_value_t = 1)]
    hold: i32,

    /// Simulated extra cost of every frame.
    #[arg(long, default_value_t = 0)]
    frame_cost_ms: u64,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Output directory.
    #[arg(long)]
    out: PathBuf,

    /// File name prefix.
    #[arg(long, default_value = "frame_")]
    base_name: String,

    /// First frame to export.
    #[arg(long, default_value_t = 0)]
    start: i32,

    /// Last frame to export (inclusive).
    #[arg(long)]
    end: i32,

    /// Sequence number of the first exported file.
    #[arg(long, default_value_t = 0)]
    sequence_start: i32,

    /// Skip frames whose file already exists.
    #[arg(long)]
    only_missing: bool,

    #[command(flatten)]
    image: ImageArgs,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Parser, Debug)]
struct CacheArgs {
    /// First frame of the playback range.
    #[arg(long, default_value_t = 0)]
    start: i32,

    /// Last frame of the playback range (inclusive).
    #[arg(long)]
    end: i32,

    /// Invalidate `A:B` after the cache was filled (`A:` for an open-ended span).
    #[arg(long, value_parser = parse_span)]
    invalidate: Option<TimeSpan>,

    /// Print the ranges as JSON.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    image: ImageArgs,

    #[command(flatten)]
    config: ConfigArgs,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Export(args) => cmd_export(args),
        Command::Cache(args) => cmd_cache(args),
    }
}

fn load_config(args: &ConfigArgs) -> anyhow::Result<RenderConfig> {
    let mut cfg = match &args.config {
        Some(path) => RenderConfig::from_path(path)
            .with_context(|| format!("load render config '{}'", path.display()))?,
        None => RenderConfig::default(),
    };
    if let Some(n) = args.max_threads {
        cfg.max_threads = n;
    }
    if let Some(n) = args.max_clones {
        cfg.max_clones = n;
    }
    if let Some(ms) = args.frame_timeout_ms {
        cfg.frame_timeout_ms = ms;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn make_image(args: &ImageArgs) -> anyhow::Result<ImageHandle> {
    let img = ProceduralImage::new(ProceduralImageOpts {
        width: args.width,
        height: args.height,
        hold: args.hold,
        frame_cost_ms: args.frame_cost_ms,
        ..ProceduralImageOpts::default()
    })
    .context("create procedural image")?;
    Ok(Arc::new(img))
}

fn run_pass<S: animframe::RenderStrategy>(
    image: ImageHandle,
    strategy: S,
    title: &str,
    config: &ConfigArgs,
) -> anyhow::Result<(RenderResult, S)> {
    let cfg = load_config(config)?;
    let opts = OrchestratorOpts {
        title: title.to_string(),
        region_of_interest: None,
        batch_mode: !config.progress,
    };
    let mut orchestrator = RenderOrchestrator::new(image, strategy, opts).with_config(cfg);
    if config.progress {
        orchestrator = orchestrator.with_progress_surface(LogProgress::default());
    }
    let result = orchestrator.regenerate_range(None);
    let stats = orchestrator.last_pass_stats();
    eprintln!(
        "{result:?}: {} of {} frames in {:.2}s on {} workers",
        stats.completed,
        stats.dirty_frames,
        stats.elapsed.as_secs_f64(),
        stats.workers
    );
    Ok((result, orchestrator.into_strategy()))
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let image = make_image(&args.image)?;
    let export = FrameSequenceExport::new(FrameExportOpts {
        directory: args.out.clone(),
        base_name: args.base_name,
        range: TimeSpan::from_time_to_time(args.start, args.end),
        sequence_start: args.sequence_start,
        only_missing: args.only_missing,
    })
    .with_context(|| format!("prepare export to '{}'", args.out.display()))?;

    let (result, export) = run_pass(image, export, "Exporting frames", &args.config)?;
    if result != RenderResult::Complete {
        anyhow::bail!("export ended with {result:?}");
    }
    eprintln!(
        "wrote {} frames to {}",
        export.saved_frames().len(),
        args.out.display()
    );
    Ok(())
}

fn cmd_cache(args: CacheArgs) -> anyhow::Result<()> {
    let image = make_image(&args.image)?;
    let mut cache = FrameCache::new();
    let regen = CacheRegeneration::new(&mut cache, TimeSpan::from_time_to_time(args.start, args.end))?;
    let (result, _) = run_pass(image, regen, "Regenerating frame cache", &args.config)?;
    if result != RenderResult::Complete {
        anyhow::bail!("cache regeneration ended with {result:?}");
    }

    if let Some(span) = args.invalidate {
        cache.invalidate_frames(span, PixelRect::from_size(args.image.width, args.image.height));
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(cache.ranges())?);
    } else {
        for &start in cache.ranges().keys() {
            if let Some(span) = cache.cached_span(start) {
                println!("{span}");
            }
        }
    }
    Ok(())
}

fn parse_span(s: &str) -> Result<TimeSpan, String> {
    let (a, b) = s
        .split_once(':')
        .ok_or_else(|| format!("expected START:END or START:, got '{s}'"))?;
    let start = a
        .trim()
        .parse::<i32>()
        .map_err(|e| format!("bad span start '{a}': {e}"))?;
    let span = if b.trim().is_empty() {
        TimeSpan::infinite(start)
    } else {
        let end = b
            .trim()
            .parse::<i32>()
            .map_err(|e| format!("bad span end '{b}': {e}"))?;
        TimeSpan::from_time_to_time(start, end)
    };
    if !span.is_valid() {
        return Err(format!("span '{s}' is empty"));
    }
    Ok(span)
}
