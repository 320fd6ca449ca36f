// Deckforge CLI - Command Line Interface Entry Point

mod renderer;

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use deckforge_config::{Config, ConfigLoader, parse_override};
use deckforge_core::model::auth::{CredentialStore, FileCredentialStore};
use deckforge_core::model::{ModelRegistryRef, ReferenceImage, default_credentials, init_model_layer};
use deckforge_core::pipeline::{
    Availability, AvailabilityProber, ChannelSink, DocumentTarget, EventSink, FanoutSink,
    GenerationCoordinator, GenerationJob, GenerationReport, ModelSelection, RegenerateInput,
    TracingSink,
};
use deckforge_core::translate::{GoogleTranslator, NoopTranslator, Translator};
use deckforge_protocol::{Modality, ProgressEvent, SlideField};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::renderer::DirectoryRenderer;

/// Deckforge - slide decks from a topic
#[derive(Parser, Debug)]
#[command(name = "deckforge")]
#[command(version, about, long_about = None)]
struct TopCli {
    #[clap(flatten)]
    config_overrides: CliConfigOverrides,

    #[clap(subcommand)]
    command: Commands,
}

/// CLI configuration overrides
#[derive(Debug, clap::Args)]
struct CliConfigOverrides {
    /// Configuration override in key=value format
    #[arg(short = 'c', long = "config", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,
}

/// Model selection flags shared by several commands
#[derive(Debug, Clone, clap::Args)]
struct ModelArgs {
    /// Text model id (defaults to models.text)
    #[arg(long = "text-model")]
    text_model: Option<String>,

    /// Image model id (defaults to models.image)
    #[arg(long = "image-model")]
    image_model: Option<String>,
}

impl ModelArgs {
    fn selection(&self, config: &Config) -> ModelSelection {
        let defaults = ModelSelection::from(&config.models);
        ModelSelection::new(
            self.text_model.clone().unwrap_or(defaults.text),
            self.image_model.clone().unwrap_or(defaults.image),
        )
    }
}

/// Available commands
#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate a deck about a topic
    Generate {
        /// Presentation topic
        topic: String,

        /// Number of slides (defaults to generation.default_slide_count)
        #[arg(short = 'n', long = "slides")]
        slides: Option<usize>,

        #[clap(flatten)]
        models: ModelArgs,

        /// Reference face image for face-conditioned image models
        #[arg(long = "reference")]
        reference: Option<PathBuf>,

        /// Deck name (defaults to the topic)
        #[arg(long = "name")]
        name: Option<String>,

        /// Output directory (defaults to output.directory)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,

        /// Print the job report as JSON
        #[arg(long = "json")]
        json: bool,
    },

    /// Regenerate one field of one slide in a rendered deck
    Regenerate {
        /// Deck directory
        deck: PathBuf,

        /// Slide number, starting at 1
        #[arg(short = 's', long = "slide")]
        slide: usize,

        /// Field to regenerate: title, content or image
        #[arg(short = 'f', long = "field")]
        field: SlideField,

        /// New title, content prompt or image prompt
        #[arg(short = 'p', long = "prompt")]
        prompt: Option<String>,

        /// Deck topic, used as context for content
        #[arg(long = "topic")]
        topic: Option<String>,

        /// Use this image file instead of generating one
        #[arg(long = "image-file")]
        image_file: Option<PathBuf>,

        #[clap(flatten)]
        models: ModelArgs,

        /// Reference face image for face-conditioned image models
        #[arg(long = "reference")]
        reference: Option<PathBuf>,
    },

    /// Check whether the selected models answer
    Probe {
        #[clap(flatten)]
        models: ModelArgs,
    },

    /// List available models
    Models {
        /// Only list models of this modality
        #[arg(long = "modality")]
        modality: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// Authentication
    Auth {
        #[command(subcommand)]
        auth_command: AuthCommands,
    },
}

/// Configuration commands
#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Show the merged configuration
    Show,
}

/// Authentication commands
#[derive(Debug, Subcommand)]
enum AuthCommands {
    /// Store an API key for a provider
    Login {
        /// Provider id: replicate, xai or google
        provider: String,

        /// API key (read from stdin when omitted)
        #[arg(short = 'k', long = "key")]
        api_key: Option<String>,
    },

    /// Remove the stored key for a provider
    Logout {
        /// Provider id
        provider: String,
    },

    /// Show which providers have a credential
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info".to_string())
                .as_str(),
        )
        .with_writer(io::stderr)
        .init();

    let cli = TopCli::parse();
    let config = load_config(&cli.config_overrides)?;

    match cli.command {
        Commands::Generate {
            topic,
            slides,
            models,
            reference,
            name,
            output,
            json,
        } => {
            let slides = slides.unwrap_or(config.generation.default_slide_count);
            let selection = models.selection(&config);
            let name = name.unwrap_or_else(|| topic.clone());
            let mut job = GenerationJob::new(topic, slides, selection)
                .with_target(DocumentTarget::new(name));
            if let Some(path) = reference {
                job = job.with_reference_image(read_reference(&path).await?);
            }
            let output = output.unwrap_or_else(|| config.output.directory.clone());
            run_generate(&config, job, output, json).await?;
        }
        Commands::Regenerate {
            deck,
            slide,
            field,
            prompt,
            topic,
            image_file,
            models,
            reference,
        } => {
            let input = regenerate_input(field, prompt, topic, image_file).await?;
            let reference = match reference {
                Some(path) => Some(read_reference(&path).await?),
                None => None,
            };
            let index = slide
                .checked_sub(1)
                .context("slide numbers start at 1")?;
            run_regenerate(&config, deck, index, input, models.selection(&config), reference)
                .await?;
        }
        Commands::Probe { models } => {
            run_probe(&config, models.selection(&config)).await?;
        }
        Commands::Models { modality } => {
            let modality = modality.as_deref().map(parse_modality).transpose()?;
            list_models(&config, modality).await?;
        }
        Commands::Config { config_command } => match config_command {
            ConfigCommands::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },
        Commands::Auth { auth_command } => {
            handle_auth_command(&config, auth_command).await?;
        }
    }

    Ok(())
}

/// Defaults, ~/.deckforge/config.toml, ./.deckforge/config.toml, then `-c` overrides
fn load_config(overrides: &CliConfigOverrides) -> Result<Config> {
    let overrides = overrides
        .overrides
        .iter()
        .map(|raw| parse_override(raw))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut loader = ConfigLoader::new();
    if let Ok(cwd) = std::env::current_dir() {
        loader = loader.with_project_dir(cwd);
    }
    Ok(loader.load_with_cli_overrides(overrides)?)
}

async fn model_layer(config: &Config) -> Result<(ModelRegistryRef, Arc<dyn CredentialStore>)> {
    let credentials = default_credentials(config).context("failed to open credential stores")?;
    let registry = init_model_layer(config, credentials.clone()).await;
    Ok((registry, credentials))
}

fn translator(config: &Config) -> Arc<dyn Translator> {
    if config.locale.translate_image_prompts {
        Arc::new(GoogleTranslator::default())
    } else {
        Arc::new(NoopTranslator)
    }
}

async fn read_reference(path: &Path) -> Result<ReferenceImage> {
    ReferenceImage::from_path(path)
        .await
        .with_context(|| format!("failed to read reference image {}", path.display()))
}

fn parse_modality(raw: &str) -> Result<Modality> {
    match raw.to_ascii_lowercase().as_str() {
        "text" => Ok(Modality::Text),
        "image" => Ok(Modality::Image),
        other => bail!("unknown modality: {other}"),
    }
}

/// Run one generation job, printing progress to stderr
async fn run_generate(config: &Config, job: GenerationJob, output: PathBuf, json: bool) -> Result<()> {
    let (registry, _) = model_layer(config).await?;
    let total = job.slide_count * SlideField::ALL.len();

    let (tx_event, mut rx_event) = mpsc::channel(64);
    let progress = tokio::spawn(async move {
        let mut done = 0;
        while let Some(event) = rx_event.recv().await {
            report_progress(&event, &mut done, total);
        }
    });

    let events: Arc<dyn EventSink> = Arc::new(
        FanoutSink::new()
            .with(Arc::new(TracingSink))
            .with(Arc::new(ChannelSink::new(tx_event))),
    );
    let coordinator = GenerationCoordinator::from_config(
        config,
        registry,
        Arc::new(DirectoryRenderer::new(output)),
    )
    .with_translator(translator(config))
    .with_events(events);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling generation");
            ctrl_c.cancel();
        }
    });

    let result = coordinator.generate(job, cancel).await;
    drop(coordinator);
    if let Err(e) = progress.await {
        warn!(error = %e, "progress printer stopped");
    }

    let report = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn report_progress(event: &ProgressEvent, done: &mut usize, total: usize) {
    match event {
        ProgressEvent::ProbeResult {
            modality,
            model_id,
            available,
        } => {
            let status = if *available { "available" } else { "unavailable" };
            eprintln!("{modality} model {model_id}: {status}");
        }
        ProgressEvent::ModelSubstituted { modality, from, to } => {
            eprintln!("{modality} model {from} replaced by {to}");
        }
        ProgressEvent::PlanReady {
            num_slides,
            degraded,
        } => {
            let note = if *degraded { " (partly synthesized)" } else { "" };
            eprintln!("planned {num_slides} slides{note}");
        }
        ProgressEvent::SlideFieldDone {
            index,
            field,
            fallback,
        } => {
            *done += 1;
            let note = match fallback {
                Some(cause) => format!(" (fallback: {cause:?})"),
                None => String::new(),
            };
            eprintln!("[{done}/{total}] slide {} {field}{note}", index + 1);
        }
        _ => {}
    }
}

fn print_report(report: &GenerationReport) {
    println!("Deck written to {}", report.document.location);
    println!("  slides:      {}", report.num_slides);
    println!("  text model:  {}", report.models.text);
    println!("  image model: {}", report.models.image);
    for substitution in &report.substitutions {
        println!(
            "  substituted {} model {} -> {} ({:?})",
            substitution.modality, substitution.from, substitution.to, substitution.cause
        );
    }
    if report.planning_degraded {
        println!("  {} slide outlines were synthesized", report.synthesized_specs);
    }
    for fallback in &report.fallbacks {
        println!(
            "  slide {} {} used a fallback ({:?})",
            fallback.index + 1,
            fallback.field,
            fallback.cause
        );
    }
}

async fn regenerate_input(
    field: SlideField,
    prompt: Option<String>,
    topic: Option<String>,
    image_file: Option<PathBuf>,
) -> Result<RegenerateInput> {
    if let Some(path) = image_file {
        if field != SlideField::Image {
            bail!("--image-file only applies to the image field");
        }
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        return Ok(RegenerateInput::ImageBytes(bytes));
    }

    let prompt = prompt.context("--prompt is required unless --image-file is given")?;
    Ok(match field {
        SlideField::Title => RegenerateInput::Title(prompt),
        SlideField::Content => RegenerateInput::Content {
            prompt,
            topic: topic.context("--topic is required when regenerating content")?,
        },
        SlideField::Image => RegenerateInput::ImagePrompt(prompt),
    })
}

async fn run_regenerate(
    config: &Config,
    deck: PathBuf,
    index: usize,
    input: RegenerateInput,
    models: ModelSelection,
    reference: Option<ReferenceImage>,
) -> Result<()> {
    let (registry, _) = model_layer(config).await?;
    let root = deck
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let coordinator =
        GenerationCoordinator::from_config(config, registry, Arc::new(DirectoryRenderer::new(root)))
            .with_translator(translator(config));

    let handle = DirectoryRenderer::handle_for(&deck);
    let field = input.field();
    coordinator
        .regenerate_field(&handle, index, field, input, &models, reference)
        .await?;
    println!("Slide {} {field} updated in {}", index + 1, deck.display());
    Ok(())
}

async fn run_probe(config: &Config, models: ModelSelection) -> Result<()> {
    let (registry, _) = model_layer(config).await?;
    let timeout = std::time::Duration::from_secs(config.generation.probe_timeout_secs.max(1));
    let probe = AvailabilityProber::new(registry, timeout)
        .probe_selection(&models)
        .await;

    for (modality, id, availability) in [
        (Modality::Text, &models.text, &probe.text),
        (Modality::Image, &models.image, &probe.image),
    ] {
        match availability {
            Availability::Available => println!("{:<6} {id}: available", modality.as_str()),
            Availability::Unavailable { kind, detail } => {
                println!("{:<6} {id}: unavailable ({kind:?}) {detail}", modality.as_str())
            }
        }
    }
    Ok(())
}

/// List available models
async fn list_models(config: &Config, modality: Option<Modality>) -> Result<()> {
    let (registry, credentials) = model_layer(config).await?;
    let providers = registry.list_providers(credentials.as_ref()).await;

    println!("Available models:");
    for entry in registry.list_models(modality).await {
        let ready = providers
            .iter()
            .any(|p| p.id == entry.provider_id && p.authenticated);
        let mut notes = Vec::new();
        if entry.id == config.models.text || entry.id == config.models.image {
            notes.push("default");
        }
        if entry.requires_reference_image() {
            notes.push("needs reference image");
        }
        if !ready {
            notes.push("no credential");
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!(" [{}]", notes.join(", "))
        };
        println!(
            "  {:<6} {:<24} {} via {}{}",
            entry.modality().as_str(),
            entry.id,
            entry.display_name,
            entry.provider_id,
            notes
        );
    }
    println!();
    println!("Use: deckforge -c models.text=<model_id> to select a model");
    Ok(())
}

fn credential_file(config: &Config) -> Result<FileCredentialStore> {
    let path = match &config.credentials.file {
        Some(path) => path.clone(),
        None => FileCredentialStore::default_path()?,
    };
    Ok(FileCredentialStore::load(path)?)
}

/// Handle auth commands
async fn handle_auth_command(config: &Config, cmd: AuthCommands) -> Result<()> {
    match cmd {
        AuthCommands::Login { provider, api_key } => {
            let (registry, _) = model_layer(config).await?;
            if registry.get_adapter(&provider).await.is_none() {
                bail!("unknown provider: {provider}");
            }
            let key = match api_key {
                Some(key) => key,
                None => {
                    eprintln!("Paste the {provider} API key and press Enter:");
                    let mut line = String::new();
                    io::stdin().lock().read_line(&mut line)?;
                    line
                }
            };
            let key = key.trim();
            if key.is_empty() {
                bail!("empty API key");
            }

            let store = credential_file(config)?;
            store.store(&provider, key)?;
            info!(provider = %provider, "credential stored");
            println!("Stored {provider} key in {}", store.path().display());
        }
        AuthCommands::Logout { provider } => {
            let store = credential_file(config)?;
            if store.remove(&provider)? {
                println!("Removed {provider} key from {}", store.path().display());
            } else {
                println!("No stored key for {provider}");
            }
        }
        AuthCommands::Status => {
            let (registry, credentials) = model_layer(config).await?;
            println!("Providers:");
            for provider in registry.list_providers(credentials.as_ref()).await {
                let status = if provider.authenticated {
                    "configured".to_string()
                } else {
                    format!("missing (set {})", provider.env_vars.join(" or "))
                };
                println!("  {:<10} {:<16} {status}", provider.id, provider.name);
            }
        }
    }
    Ok(())
}
