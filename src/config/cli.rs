use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the frontgate binary.
#[derive(Debug, Parser)]
#[command(
    name = "frontgate",
    version,
    about = "Rendering cache and asset-delivery front for a server-side renderer"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FRONTGATE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ServeOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP front (default).
    Serve,
    /// Discover installed themes and print them as JSON.
    Themes,
}

/// Overrides accepted by every subcommand. The deployment values also bind to
/// their conventional environment variables.
#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST", global = true)]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "port", env = "PORT", value_name = "PORT", global = true)]
    pub port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(
        long = "server-graceful-shutdown-seconds",
        value_name = "SECONDS",
        global = true
    )]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Public base URL of the site, used to build theme preview URLs.
    #[arg(long = "site-url", env = "SITE_URL", value_name = "URL", global = true)]
    pub site_url: Option<String>,

    /// Shared bearer secret for the admin endpoints.
    #[arg(
        long = "admin-token",
        env = "ADMIN_TOKEN",
        value_name = "TOKEN",
        hide_env_values = true,
        global = true
    )]
    pub admin_token: Option<String>,

    /// Base URL of the site settings API.
    #[arg(long = "api-url", env = "API_URL", value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Render bridge to use (production|development).
    #[arg(long = "render-mode", value_name = "MODE", global = true)]
    pub render_mode: Option<String>,

    /// Override the build output directory.
    #[arg(long = "client-dir", value_name = "PATH", global = true)]
    pub client_dir: Option<PathBuf>,

    /// Override the directory scanned for themes.
    #[arg(long = "themes-dir", value_name = "PATH", global = true)]
    pub themes_dir: Option<PathBuf>,

    /// Override the rendered page time-to-live.
    #[arg(long = "page-ttl-seconds", value_name = "SECONDS", global = true)]
    pub page_ttl_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}
