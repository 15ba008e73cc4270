use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand, ValueEnum};
use storybook_core::{
    Book, BookPlayer, EngineConfig, HeadlessOutput, ManifestLoader, ManifestLocation, MediaKind,
    MediaResolver, PerformanceStats,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> storybook_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Inspect { manifest } => run_inspect(&manifest).await,
        Commands::Play {
            manifest,
            page,
            button,
            reject,
            duration_ms,
        } => {
            let mut output = HeadlessOutput::new(Duration::from_millis(duration_ms));
            for kind in reject {
                output = output.rejecting(kind.into());
            }
            run_play(&manifest, &page, button, output, config).await
        }
        Commands::Preload { manifest, page } => run_preload(&manifest, &page, config).await,
    }
}

async fn load(manifest: &str) -> storybook_core::Result<(ManifestLocation, Book)> {
    let location = ManifestLocation::parse(manifest)?;
    let book = ManifestLoader::new().load(&location).await?;
    Ok((location, book))
}

async fn run_inspect(manifest: &str) -> storybook_core::Result<()> {
    let (_, book) = load(manifest).await?;
    let resolver = MediaResolver::new();

    println!("base: {}", book.normalized_base());
    for (id, page) in &book.pages {
        println!("{id} ({})", page.image);
        for (index, button) in page.buttons.iter().enumerate() {
            match resolver.resolve(button, page, &book) {
                Ok(url) => println!(
                    "  [{index}] ({:.2}, {:.2}) {url} [{:?}]",
                    button.x,
                    button.y,
                    MediaKind::classify(&url)
                ),
                Err(err) => println!("  [{index}] ({:.2}, {:.2}) error: {err}", button.x, button.y),
            }
        }
    }
    Ok(())
}

async fn run_play(
    manifest: &str,
    page: &str,
    button: usize,
    output: HeadlessOutput,
    config: EngineConfig,
) -> storybook_core::Result<()> {
    let (location, book) = load(manifest).await?;
    let player = BookPlayer::new(book, location.media_fetcher(), Arc::new(output), config);

    if !player.has_page(page) {
        return Err(storybook_core::StorybookError::msg(format!(
            "page `{page}` not found"
        )));
    }
    // The preload session keeps running detached while the button plays.
    let _ = player.show_page(page);

    match player.play_button(button).await {
        Ok(outcome) => {
            tracing::info!(?outcome, state = ?player.playback_state(), "play requested");
            while player.playback_state().is_playing() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
        Err(err) => eprintln!("nothing played: {err}"),
    }

    print_stats(&player.performance_stats())
}

async fn run_preload(
    manifest: &str,
    page: &str,
    config: EngineConfig,
) -> storybook_core::Result<()> {
    let (location, book) = load(manifest).await?;
    let player = BookPlayer::new(
        book,
        location.media_fetcher(),
        Arc::new(HeadlessOutput::default()),
        config,
    );

    match player.show_page(page) {
        Some(session) => {
            let report = session
                .await
                .map_err(|err| storybook_core::StorybookError::msg(err.to_string()))?;
            tracing::info!(?report, "preload finished");
        }
        None => eprintln!("no preload session started for `{page}`"),
    }

    print_stats(&player.performance_stats())
}

fn print_stats(stats: &PerformanceStats) -> storybook_core::Result<()> {
    println!("{}", serde_json::to_string_pretty(&for_display(stats))?);
    Ok(())
}

/// Latencies rounded to two decimals. Only the printed copy is rounded.
fn for_display(stats: &PerformanceStats) -> PerformanceStats {
    let round = |ms: f64| (ms * 100.0).round() / 100.0;
    PerformanceStats {
        avg_load_time_ms: round(stats.avg_load_time_ms),
        min_load_time_ms: stats.min_load_time_ms.map(round),
        max_load_time_ms: stats.max_load_time_ms.map(round),
        ..stats.clone()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Interactive storybook player", long_about = None)]
struct Cli {
    /// Engine configuration file (JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every page and the media each button resolves to.
    Inspect {
        /// Manifest path or http(s) URL.
        manifest: String,
    },
    /// Play one button through the headless output.
    Play {
        manifest: String,
        #[arg(short, long)]
        page: String,
        #[arg(short, long)]
        button: usize,
        /// Make the output refuse a media kind to exercise the tone fallback.
        #[arg(long, value_enum)]
        reject: Vec<KindArg>,
        /// Nominal length of headless media playback.
        #[arg(long, default_value_t = 1_000)]
        duration_ms: u64,
    },
    /// Show a page and wait for its neighbours to be cached.
    Preload {
        manifest: String,
        #[arg(short, long)]
        page: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Audio,
    Video,
}

impl From<KindArg> for MediaKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Audio => MediaKind::Audio,
            KindArg::Video => MediaKind::Video,
        }
    }
}
