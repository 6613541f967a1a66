// Autocue - Real-Time Teleprompter Follower
// Main binary entry point

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "autocue")]
#[command(about = "Real-time teleprompter follower server", long_about = None)]
#[command(version)]
struct Cli {
    /// Port to listen on
    port: u16,

    /// Acoustic model directory
    model_path: PathBuf,

    /// Info-level log file (rotated daily)
    info_log: Option<PathBuf>,

    /// Debug-level log file (rotated daily)
    debug_log: Option<PathBuf>,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Optional TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guards = init_tracing(&cli)?;
    run(cli).await
}

/// Stderr always carries INFO+; each optional log file gets its own daily
/// rotation. The returned guards keep the non-blocking writers flushing.
fn init_tracing(cli: &Cli) -> anyhow::Result<Vec<WorkerGuard>> {
    let mut guards = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    layers.push(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .boxed(),
    );

    if let Some(path) = &cli.info_log {
        layers.push(file_layer(path, LevelFilter::INFO, &mut guards)?);
    }
    if let Some(path) = &cli.debug_log {
        layers.push(file_layer(path, LevelFilter::DEBUG, &mut guards)?);
    }

    tracing_subscriber::registry().with(layers).init();
    Ok(guards)
}

fn file_layer(
    path: &Path,
    level: LevelFilter,
    guards: &mut Vec<WorkerGuard>,
) -> anyhow::Result<Box<dyn Layer<Registry> + Send + Sync>> {
    let directory = match path.parent() {
        Some(parent) if parent != Path::new("") => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .with_context(|| format!("Log path has no file name: {}", path.display()))?;
    let appender = tracing_appender::rolling::daily(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    guards.push(guard);
    Ok(tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(level)
        .boxed())
}

#[cfg(feature = "onnx")]
async fn run(cli: Cli) -> anyhow::Result<()> {
    use autocue::asr::onnx::OnnxModel;
    use autocue::asr::AcousticModel;
    use autocue::server::{Engine, Server};
    use autocue::text::g2p::{DictLexicon, Lexicon, SpellingLexicon};
    use autocue::text::tokenizer::ScriptTokenizer;
    use autocue::text::Tokenizer;
    use autocue::Config;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tracing::info;

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => Config::default(),
    };

    info!("Initializing");

    let model = Arc::new(
        OnnxModel::load(&cli.model_path, config.recognizer.threads)
            .context("Failed to load the acoustic model")?,
    );
    let vocab = model.vocabulary();

    let lexicon_path = cli.model_path.join("lexicon.txt");
    let lexicon: Arc<dyn Lexicon> = if lexicon_path.is_file() {
        info!("Using lexicon: {}", lexicon_path.display());
        Arc::new(DictLexicon::from_file(&lexicon_path, &vocab)?)
    } else {
        info!("No lexicon file, spelling words against the vocabulary");
        Arc::new(SpellingLexicon::new(&vocab))
    };

    let tokenizer: Arc<dyn Tokenizer> = Arc::new(ScriptTokenizer::new(vocab, lexicon));
    let model: Arc<dyn AcousticModel> = model;
    let engine = Arc::new(Engine::new(model, tokenizer, config)?);

    let listener = TcpListener::bind((cli.bind.as_str(), cli.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", cli.bind, cli.port))?;

    info!("Started");
    let server = Server::new(engine);
    tokio::select! {
        result = server.run(listener) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}

#[cfg(not(feature = "onnx"))]
async fn run(_cli: Cli) -> anyhow::Result<()> {
    anyhow::bail!("This build has no acoustic backend; rebuild with --features onnx")
}
