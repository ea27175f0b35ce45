use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::cache::RefetchPolicy;
use crate::domain::SortOrder;

/// Command-line arguments for the leadcast binary.
#[derive(Debug, Parser)]
#[command(
    name = "leadcast",
    version,
    about = "Live, cached view of a remote leads collection"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "LEADCAST_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Fetch and print one page of leads.
    List(ListArgs),
    /// Keep a page of leads up to date from the push channel.
    Watch(Box<WatchArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    #[command(flatten)]
    pub overrides: ApiOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    #[command(flatten)]
    pub overrides: ApiOverrides,

    #[command(flatten)]
    pub live: LiveOverrides,
}

/// Initial view of the collection.
#[derive(Debug, Args, Default, Clone)]
pub struct QueryArgs {
    /// One-based page number.
    #[arg(long, value_name = "PAGE")]
    pub page: Option<u64>,

    /// Override the page size for this run.
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<u32>,

    /// Free-text search.
    #[arg(long, value_name = "TEXT")]
    pub search: Option<String>,

    /// Field to sort by.
    #[arg(long = "sort-by", value_name = "FIELD")]
    pub sort_by: Option<String>,

    /// Sort direction (asc|desc).
    #[arg(long, value_name = "ORDER")]
    pub order: Option<SortOrder>,

    /// Only leads in this stage.
    #[arg(long, value_name = "STAGE")]
    pub stage: Option<String>,

    /// Only engaged (true) or not engaged (false) leads.
    #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub engaged: Option<bool>,

    /// Only leads created on or after this date (YYYY-MM-DD).
    #[arg(long = "created-from", value_name = "DATE")]
    pub created_from: Option<String>,

    /// Only leads created on or before this date (YYYY-MM-DD).
    #[arg(long = "created-to", value_name = "DATE")]
    pub created_to: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ApiOverrides {
    /// Override the leads API base URL.
    #[arg(long = "api-base-url", value_name = "URL", value_hint = ValueHint::Url)]
    pub api_base_url: Option<String>,

    /// Override the bearer token sent to the API and the push channel.
    #[arg(long = "api-token", env = "LEADCAST_API_TOKEN", value_name = "TOKEN")]
    pub api_token: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LiveOverrides {
    /// Override the push channel URL.
    #[arg(long = "live-url", value_name = "URL", value_hint = ValueHint::Url)]
    pub live_url: Option<String>,

    /// Override the local actor id used to recognize self-caused events.
    #[arg(long = "actor-id", value_name = "ID")]
    pub actor_id: Option<String>,

    /// Override the cache refetch policy (on-demand|eager).
    #[arg(long, value_enum, value_name = "POLICY")]
    pub refetch: Option<RefetchPolicy>,
}
