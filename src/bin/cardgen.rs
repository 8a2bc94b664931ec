//! CLI for cardgen - birthday cards from a photo and a name.

use cardgen::{
    CardGenerator, FormController, GeminiCardGenerator, GeminiModel, ImageFile, SubmitOutcome,
    UiState,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cardgen")]
#[command(about = "Turn a photo into a personalized birthday card via Gemini")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log request details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Gemini API key
    #[arg(long, env = "API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini model to use
    #[arg(long, value_enum, default_value = "flash-image-preview", global = true)]
    model: ModelArg,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a birthday card
    Generate(GenerateArgs),

    /// Check that the API key and model are usable
    Check,
}

#[derive(Args)]
struct GenerateArgs {
    /// Name to put on the card
    #[arg(short, long)]
    name: String,

    /// Photo to turn into the card (PNG, JPEG or WebP, at most 4 MiB)
    #[arg(short, long)]
    photo: PathBuf,

    /// Directory the card is saved to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    FlashImagePreview,
    FlashImage,
}

impl From<ModelArg> for GeminiModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::FlashImagePreview => GeminiModel::FlashImagePreview,
            ModelArg::FlashImage => GeminiModel::FlashImage,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // A missing key is fatal before any command runs
    let mut builder = GeminiCardGenerator::builder().model(cli.model.into());
    if let Some(key) = cli.api_key {
        builder = builder.api_key(key);
    }
    let generator = builder.build()?;

    match cli.command {
        Commands::Generate(args) => generate(generator, args, cli.json).await?,
        Commands::Check => check(generator, cli.json).await?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "cardgen=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn generate(
    generator: GeminiCardGenerator,
    args: GenerateArgs,
    json_output: bool,
) -> anyhow::Result<()> {
    let form = FormController::new(generator);

    let mut changes = form.subscribe();
    let progress = tokio::spawn(async move {
        let mut was_loading = false;
        while changes.changed().await.is_ok() {
            let state: UiState = changes.borrow_and_update().clone();
            if state.is_loading && !was_loading && !json_output {
                eprintln!("Generating your card...");
            }
            was_loading = state.is_loading;
        }
    });

    form.set_name(&args.name);
    form.select_image(ImageFile::from_path(&args.photo)?)?;

    let card = match form.submit().await? {
        SubmitOutcome::Generated(card) => card,
        SubmitOutcome::AlreadyInFlight => anyhow::bail!("a generation is already in flight"),
    };

    let Some(path) = form.download(&args.output_dir)? else {
        anyhow::bail!("no card to save");
    };

    drop(form);
    let _ = progress.await;

    if json_output {
        let result = serde_json::json!({
            "success": true,
            "output": path.display().to_string(),
            "size_bytes": card.size(),
            "mime_type": card.mime_type,
            "name": card.subject_name,
            "model": card.metadata.model,
            "duration_ms": card.metadata.duration_ms,
            "text": card.metadata.text,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Generated card: {} ({} bytes, {})",
            path.display(),
            card.size(),
            card.mime_type
        );
        if let Some(duration) = card.metadata.duration_ms {
            println!("Duration: {}ms", duration);
        }
        for text in &card.metadata.text {
            println!("Model says: {text}");
        }
    }

    Ok(())
}

async fn check(generator: GeminiCardGenerator, json_output: bool) -> anyhow::Result<()> {
    generator.health_check().await?;

    if json_output {
        let result = serde_json::json!({
            "success": true,
            "provider": generator.name(),
            "model": generator.model().as_str(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "{} is reachable ({})",
            generator.name(),
            generator.model().as_str()
        );
    }

    Ok(())
}
