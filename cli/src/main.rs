use clap::{Parser, Subcommand};
use uuid::Uuid;

use modgate_core::settings::SettingsUpdate;

mod commands;
mod util;

use util::require_token;

#[derive(Parser)]
#[command(name = "modgate", version, about = "modgate CLI: operate the moderation routing API")]
struct Cli {
    /// API base URL
    #[arg(long, env = "MODGATE_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Bearer token shared with the API (MODGATE_API_TOKEN on the server)
    #[arg(long, env = "MODGATE_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Effective settings, model availability and pending confirmations
    Status {
        #[arg(long)]
        guild: u64,
    },
    /// Guild settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Enable or disable the router for a guild
    Toggle {
        #[arg(long)]
        guild: u64,
    },
    /// Classify and authorize a request without executing it
    Preview {
        /// InboundRequest JSON file, or '-' for stdin
        #[arg(long, default_value = "-")]
        file: String,
    },
    /// Inspect a pending confirmation
    Confirmation {
        id: Uuid,
    },
    /// Approve a pending confirmation
    Confirm {
        id: Uuid,
        /// Confirming actor as JSON (id, display_name, rank, permissions)
        #[arg(long)]
        actor: String,
    },
    /// Cancel a pending confirmation
    Cancel {
        id: Uuid,
        #[arg(long)]
        actor_id: u64,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show current settings
    Show {
        #[arg(long)]
        guild: u64,
    },
    /// Update one or more settings
    Set {
        #[arg(long)]
        guild: u64,
        #[arg(long)]
        enabled: Option<bool>,
        /// Model override; an empty string restores the default
        #[arg(long)]
        model: Option<String>,
        /// Recent messages used as context (0-30)
        #[arg(long)]
        context_messages: Option<u8>,
        #[arg(long)]
        confirm_enabled: Option<bool>,
        /// Confirmation window in seconds (5-120)
        #[arg(long)]
        confirm_timeout: Option<u64>,
        /// Comma-separated tool names that require confirmation
        #[arg(long)]
        confirm_actions: Option<String>,
        /// Chance of an unprompted reply (0.0-1.0)
        #[arg(long)]
        proactive_chance: Option<f64>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let api_url = cli.api_url.as_str();
    let token = cli.token.as_deref();

    let code = match cli.command {
        Commands::Health => commands::health::run(api_url).await,
        Commands::Status { guild } => {
            commands::settings::status(api_url, require_token(token), guild).await
        }
        Commands::Settings { command } => match command {
            SettingsCommands::Show { guild } => {
                commands::settings::show(api_url, require_token(token), guild).await
            }
            SettingsCommands::Set {
                guild,
                enabled,
                model,
                context_messages,
                confirm_enabled,
                confirm_timeout,
                confirm_actions,
                proactive_chance,
            } => {
                let update = SettingsUpdate {
                    enabled,
                    model,
                    context_messages,
                    confirm_enabled,
                    confirm_timeout_seconds: confirm_timeout,
                    confirm_actions: confirm_actions
                        .as_deref()
                        .map(commands::settings::parse_tool_list),
                    proactive_chance,
                };
                commands::settings::set(api_url, require_token(token), guild, update).await
            }
        },
        Commands::Toggle { guild } => {
            commands::settings::toggle(api_url, require_token(token), guild).await
        }
        Commands::Preview { file } => {
            commands::preview::run(api_url, require_token(token), &file).await
        }
        Commands::Confirmation { id } => {
            commands::confirmation::show(api_url, require_token(token), id).await
        }
        Commands::Confirm { id, actor } => {
            commands::confirmation::confirm(api_url, require_token(token), id, &actor).await
        }
        Commands::Cancel { id, actor_id } => {
            commands::confirmation::cancel(api_url, require_token(token), id, actor_id).await
        }
    };

    std::process::exit(code);
}
