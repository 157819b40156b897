//! Command-line surface over the chat service.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::adapters::config::{ConfigError, Settings, API_URL_ENV, TOKEN_ENV};
use crate::adapters::credentials::SettingsCredentials;
use crate::adapters::http::{ApiError, HttpChatApi};
use crate::core::ports::chat_api::{ChatApiPort, NewChatError};
use crate::core::ports::credentials::CredentialProvider;
use crate::core::retrieval::RetrievalError;
use crate::core::session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    NewChat(#[from] NewChatError),
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to render config: {0}")]
    Toml(#[from] toml::ser::Error),
    /// Already shown to the user; only the exit status is left to set.
    #[error("command failed")]
    Reported,
}

impl CliError {
    pub fn is_unauthorized(&self) -> bool {
        match self {
            CliError::Api(err) => err.is_unauthorized(),
            CliError::Session(SessionError::Load { source, .. })
            | CliError::Session(SessionError::Send(source)) => source.is_unauthorized(),
            _ => false,
        }
    }
}

pub fn print_auth_hint() {
    eprintln!(
        "Hint: set a token with `kbchat config set access_token <token>` or the {TOKEN_ENV} environment variable."
    );
}

#[derive(Debug, Parser)]
#[command(
    name = "kbchat",
    author,
    version,
    about = "Chat with your knowledge bases and inspect the sources behind each answer."
)]
pub struct Cli {
    /// Config file (defaults to ~/.kbchat/config.toml)
    #[arg(long, global = true, env = "KBCHAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List conversations
    Chats,

    /// Start a conversation grounded in one or more knowledge bases
    New {
        /// Knowledge base ID (repeat for several)
        #[arg(long = "kb", required = true)]
        kb_ids: Vec<i64>,
        /// Conversation title
        #[arg(long)]
        title: Option<String>,
        /// Continue straight into the interactive chat
        #[arg(long)]
        open: bool,
    },

    /// Delete a conversation
    Delete {
        /// Conversation ID
        id: i64,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Print a conversation with its decoded answers and sources
    Show {
        /// Conversation ID
        id: i64,
    },

    /// Open a conversation and chat interactively
    Chat {
        /// Conversation ID
        id: i64,
    },

    /// Run a retrieval test against a knowledge base
    Retrieve {
        /// Knowledge base ID
        #[arg(long = "kb")]
        kb_id: i64,
        /// Number of results (defaults to the configured default_top_k)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        top_k: Option<u32>,
        /// Query text
        #[arg(required = true, trailing_var_arg = true)]
        query: Vec<String>,
    },

    /// Decode an encoded assistant response read from stdin or a file
    Decode {
        /// Read from this file instead of stdin
        #[arg(long, short)]
        file: Option<PathBuf>,
    },

    /// Inspect or change the configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration (token masked)
    Show,
    /// Print the config file location
    Path,
    /// Set a config value and save
    Set { key: String, value: String },
}

/// Shared state for one command invocation.
pub(crate) struct Context {
    pub settings: Settings,
    pub config_path: PathBuf,
    pub json: bool,
}

impl Context {
    pub fn api(&self) -> Result<Arc<dyn ChatApiPort>, CliError> {
        log::debug!(
            "Using chat service at {} ({} overrides the config)",
            self.settings.api_base_url(),
            API_URL_ENV
        );
        Ok(Arc::new(HttpChatApi::from_settings(&self.settings)?))
    }

    pub fn credentials(&self) -> Arc<dyn CredentialProvider> {
        Arc::new(SettingsCredentials::new(&self.settings))
    }
}

pub async fn execute(cli: Cli, settings: Settings, config_path: PathBuf) -> Result<(), CliError> {
    let ctx = Context {
        settings,
        config_path,
        json: cli.json,
    };

    match cli.command {
        Command::Chats => commands::chats::list(&ctx).await,
        Command::New {
            kb_ids,
            title,
            open,
        } => commands::chats::create(&ctx, kb_ids, title.as_deref(), open).await,
        Command::Delete { id, yes } => commands::chats::delete(&ctx, id, yes).await,
        Command::Show { id } => commands::conversation::show(&ctx, id).await,
        Command::Chat { id } => commands::conversation::interactive(&ctx, id).await,
        Command::Retrieve {
            kb_id,
            top_k,
            query,
        } => commands::retrieval::run(&ctx, kb_id, top_k, &query.join(" ")).await,
        Command::Decode { file } => commands::decode::run(file.as_deref()).await,
        Command::Config { command } => commands::settings::run(&ctx, command),
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, CliError, Command, ConfigCommand};
    use crate::adapters::http::ApiError;
    use crate::core::session::SessionError;
    use clap::{CommandFactory, Parser};

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn retrieve_joins_trailing_words_and_validates_top_k() {
        let cli = Cli::try_parse_from([
            "kbchat", "retrieve", "--kb", "4", "--top-k", "5", "vacation", "policy",
        ])
        .expect("parse retrieve");
        match cli.command {
            Command::Retrieve {
                kb_id,
                top_k,
                query,
            } => {
                assert_eq!(kb_id, 4);
                assert_eq!(top_k, Some(5));
                assert_eq!(query.join(" "), "vacation policy");
            }
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Cli::try_parse_from(["kbchat", "retrieve", "--kb", "4", "--top-k", "0", "q"]).is_err());
        assert!(Cli::try_parse_from(["kbchat", "retrieve", "--kb", "4"]).is_err());
    }

    #[test]
    fn new_accepts_repeated_knowledge_bases() {
        let cli = Cli::try_parse_from([
            "kbchat", "new", "--kb", "4", "--kb", "7", "--title", "Onboarding", "--open",
        ])
        .expect("parse new");
        match cli.command {
            Command::New {
                kb_ids,
                title,
                open,
            } => {
                assert_eq!(kb_ids, vec![4, 7]);
                assert_eq!(title.as_deref(), Some("Onboarding"));
                assert!(open);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["kbchat", "new"]).is_err());
        assert!(matches!(
            Cli::try_parse_from(["kbchat", "delete", "3", "-y"])
                .expect("parse delete")
                .command,
            Command::Delete { id: 3, yes: true }
        ));
    }

    #[test]
    fn unauthorized_errors_are_recognised_through_wrappers() {
        let denied = || ApiError::from_status(401, r#"{"detail":"Not authenticated"}"#);
        assert!(CliError::Api(denied()).is_unauthorized());
        assert!(CliError::Session(SessionError::Load {
            chat_id: 3,
            source: denied(),
        })
        .is_unauthorized());
        assert!(!CliError::Api(ApiError::from_status(404, "")).is_unauthorized());
        assert!(!CliError::Reported.is_unauthorized());
    }

    #[test]
    fn json_flag_is_global() {
        let cli = Cli::try_parse_from(["kbchat", "show", "12", "--json"]).expect("parse show");
        assert!(cli.json);
        assert!(matches!(cli.command, Command::Show { id: 12 }));

        let cli = Cli::try_parse_from(["kbchat", "config", "set", "default_top_k", "5"])
            .expect("parse config set");
        assert!(matches!(
            cli.command,
            Command::Config {
                command: ConfigCommand::Set { .. }
            }
        ));
    }
}
