mod cli;
mod utils;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use cli::{
    complete::complete_cmd, judge::judge_cmd, list::list_cmd, resolve::resolve_cmd, ColorMode,
    Context,
};
use llmroute::config::read_config;
use llmroute::providers::LlmProvider;
use llmroute::registry::populate::Probe;
use utils::errors::{configure_color, error_chain};
use utils::logging::init_logging;

#[derive(Default, Clone, Copy, ValueEnum, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum RequestedColorMode {
    #[default]
    Auto,
    On,
    Off,
}

#[derive(Parser)]
#[command(name = "llmroute")]
#[command(
    about = "Route chat-model requests to the provider serving each model",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Read the configuration from this file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true, default_value_t = RequestedColorMode::default())]
    color: RequestedColorMode,
    /// Log debug information to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a completion for a prompt
    Complete(CompleteArgs),
    /// Ask a model, configured with judge parameters, for a single response
    Judge(JudgeArgs),
    /// Print the provider serving a model
    Resolve(ResolveArgs),
    /// List providers or models
    List(ListArgs),
}

#[derive(Parser)]
pub(crate) struct CompleteArgs {
    /// The workspace whose credentials are used
    #[arg(short, long)]
    workspace: Option<String>,
    /// The model to complete with
    #[arg(short, long)]
    model: Option<String>,
    /// A system message sent before the prompt
    #[arg(short, long)]
    system: Option<String>,
    #[arg(long)]
    temperature: Option<f64>,
    #[arg(long)]
    max_tokens: Option<u32>,
    #[arg(long)]
    seed: Option<i64>,
    /// The prompt, read from stdin if omitted
    prompt: Option<String>,
}

#[derive(Parser)]
pub(crate) struct JudgeArgs {
    /// The workspace whose credentials are used
    #[arg(short, long)]
    workspace: Option<String>,
    /// Model parameters as JSON, e.g. '{"name": "gpt-4o-mini", "temperature": 0.0}'
    #[arg(long)]
    parameters: String,
    /// The prompt, read from stdin if omitted
    prompt: Option<String>,
}

#[derive(Parser)]
pub(crate) struct ResolveArgs {
    /// The model name to resolve
    model: String,
}

/// Possible listings
#[derive(Subcommand)]
pub(crate) enum ListObject {
    /// Models served by the registered providers
    Models(ListModelArgs),
    /// Providers and their priorities
    Providers,
}

/// Output formats
#[derive(ValueEnum, Default, Clone, Copy, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum ListingFormat {
    /// Format the output as a table
    #[default]
    Table,
    /// Format the output as JSON
    Json,
    /// Format the output as a table without a header
    HeaderlessTable,
}

#[derive(Parser)]
pub(crate) struct ListArgs {
    /// Output the listing with the specified format
    #[arg(short, long, default_value_t = ListingFormat::default())]
    format: ListingFormat,
    /// List the specified object
    #[command(subcommand)]
    object: ListObject,
}

#[derive(Parser)]
pub(crate) struct ListModelArgs {
    /// Limit listing to the specified provider
    #[arg(short, long)]
    provider: Option<LlmProvider>,
    /// The workspace whose credentials are used
    #[arg(short, long)]
    workspace: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    configure_color(ColorMode::resolve_auto(cli.color));

    let config_file = match read_config(cli.config.clone()) {
        Ok(config_file) => config_file,
        Err(err) => die!("{}", error_chain(&err)),
    };

    let mut config = config_file.config;

    init_logging(if cli.verbose {
        "debug"
    } else {
        config.log_level()
    });

    if let Some(path) = &config_file.path {
        tracing::debug!(path = %path.display(), "loaded config");
    }

    for key in &config_file.extraneous_keys {
        warn!("config contains extraneous key \"{}\", ignoring", key);
    }

    if let Err(err) = config.apply_environment() {
        die!("{}", error_chain(&err));
    }

    // Resolution is answered from the registry alone.
    let probe = match cli.command {
        Commands::Resolve(_) => Probe::Skip,
        _ => Probe::Network,
    };

    let ctx = Context::load(config, probe).await;

    match &cli.command {
        Commands::Complete(args) => complete_cmd(&ctx, args).await,
        Commands::Judge(args) => judge_cmd(&ctx, args).await,
        Commands::Resolve(args) => resolve_cmd(&ctx, args),
        Commands::List(args) => list_cmd(&ctx, args).await,
    }
}
