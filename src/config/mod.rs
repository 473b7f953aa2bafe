//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{CliArgs, Command, ServeOverrides};

use crate::cache::config::{
    DEFAULT_ASSET_CACHE_CONTROL, DEFAULT_PAGE_CACHE_CONTROL, DEFAULT_PAGE_TTL_SECS,
    DEFAULT_STATIC_CACHE_CONTROL,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "frontgate";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_RESTART_DELAY_MS: u64 = 1000;
const DEFAULT_SITE_URL: &str = "http://localhost:5001";
const DEFAULT_SETTINGS_API_URL: &str = "http://localhost:3000/api";
const DEFAULT_SETTINGS_API_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SIDECAR_URL: &str = "http://127.0.0.1:5174";
const DEFAULT_DEV_COMMAND: &str = "node";
const DEFAULT_DEV_ARGS: [&str; 1] = ["render-dev.mjs"];
const DEFAULT_CLIENT_DIR: &str = "dist/client";
const DEFAULT_TEMPLATE_SOURCE: &str = "index.html";
const DEFAULT_THEMES_DIR: &str = "themes";
const DEFAULT_THEME: &str = "theme-default";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub site: SiteSettings,
    pub admin: AdminSettings,
    pub settings_api: SettingsApiSettings,
    pub render: RenderSettings,
    pub paths: PathSettings,
    pub themes: ThemeSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    /// Pause between acknowledging a theme change and restarting.
    pub restart_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct AdminSettings {
    /// `None` leaves every admin route answering 401.
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SettingsApiSettings {
    pub base_url: Url,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Production,
    Development,
}

impl RenderMode {
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            other => Err(format!(
                "unknown render mode `{other}` (expected production or development)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub mode: RenderMode,
    pub sidecar_url: Url,
    pub dev_command: PathBuf,
    pub dev_args: Vec<String>,
    /// Upper bound for one render call; unset means no bound.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct PathSettings {
    pub client_dir: PathBuf,
    /// Source template used in development mode.
    pub template_source: PathBuf,
}

impl PathSettings {
    /// Built template used in production mode.
    pub fn built_template(&self) -> PathBuf {
        self.client_dir.join("index.html")
    }
}

#[derive(Debug, Clone)]
pub struct ThemeSettings {
    pub directory: PathBuf,
    pub default: String,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub page_ttl: Duration,
    pub page_cache_control: String,
    pub asset_cache_control: String,
    pub static_cache_control: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix("FRONTGATE")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("render.dev_args")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_serve_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    site: RawSiteSettings,
    admin: RawAdminSettings,
    settings_api: RawSettingsApiSettings,
    render: RawRenderSettings,
    paths: RawPathSettings,
    themes: RawThemeSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(url) = overrides.site_url.as_ref() {
            self.site.base_url = Some(url.clone());
        }
        if let Some(token) = overrides.admin_token.as_ref() {
            self.admin.token = Some(token.clone());
        }
        if let Some(url) = overrides.api_url.as_ref() {
            self.settings_api.base_url = Some(url.clone());
        }
        if let Some(mode) = overrides.render_mode.as_ref() {
            self.render.mode = Some(mode.clone());
        }
        if let Some(dir) = overrides.client_dir.as_ref() {
            self.paths.client_dir = Some(dir.clone());
        }
        if let Some(dir) = overrides.themes_dir.as_ref() {
            self.themes.directory = Some(dir.clone());
        }
        if let Some(ttl) = overrides.page_ttl_seconds {
            self.cache.page_ttl_seconds = Some(ttl);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    /// Settings with every built-in default and no file, environment or CLI input.
    pub fn defaults() -> Result<Self, LoadError> {
        Self::from_raw(RawSettings::default())
    }

    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            site,
            admin,
            settings_api,
            render,
            paths,
            themes,
            cache,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            site: build_site_settings(site)?,
            admin: build_admin_settings(admin),
            settings_api: build_settings_api_settings(settings_api)?,
            render: build_render_settings(render)?,
            paths: build_path_settings(paths)?,
            themes: build_theme_settings(themes)?,
            cache: build_cache_settings(cache)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    let restart_delay_ms = server.restart_delay_ms.unwrap_or(DEFAULT_RESTART_DELAY_MS);

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        restart_delay: Duration::from_millis(restart_delay_ms),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let base_url = site
        .base_url
        .unwrap_or_else(|| DEFAULT_SITE_URL.to_string());
    let parsed = parse_url(&base_url, "site.base_url")?;
    Ok(SiteSettings {
        base_url: parsed.as_str().trim_end_matches('/').to_string(),
    })
}

fn build_admin_settings(admin: RawAdminSettings) -> AdminSettings {
    let token = admin.token.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });
    AdminSettings { token }
}

fn build_settings_api_settings(
    api: RawSettingsApiSettings,
) -> Result<SettingsApiSettings, LoadError> {
    let base_url = api
        .base_url
        .unwrap_or_else(|| DEFAULT_SETTINGS_API_URL.to_string());
    let base_url = parse_url(&base_url, "settings_api.base_url")?;

    let timeout_secs = api
        .timeout_seconds
        .unwrap_or(DEFAULT_SETTINGS_API_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "settings_api.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(SettingsApiSettings {
        base_url,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let mode = match render.mode {
        Some(mode) => {
            RenderMode::from_str(&mode).map_err(|reason| LoadError::invalid("render.mode", reason))?
        }
        None => RenderMode::Production,
    };

    let sidecar_url = render
        .sidecar_url
        .unwrap_or_else(|| DEFAULT_SIDECAR_URL.to_string());
    let sidecar_url = parse_url(&sidecar_url, "render.sidecar_url")?;

    let dev_command = render
        .dev_command
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DEV_COMMAND));
    if dev_command.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.dev_command",
            "path must not be empty",
        ));
    }

    let dev_args = render
        .dev_args
        .unwrap_or_else(|| DEFAULT_DEV_ARGS.iter().map(|arg| arg.to_string()).collect());

    let timeout = match render.timeout_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "render.timeout_seconds",
                "must be greater than zero when set",
            ));
        }
        Some(seconds) => Some(Duration::from_secs(seconds)),
        None => None,
    };

    Ok(RenderSettings {
        mode,
        sidecar_url,
        dev_command,
        dev_args,
        timeout,
    })
}

fn build_path_settings(paths: RawPathSettings) -> Result<PathSettings, LoadError> {
    let client_dir = paths
        .client_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CLIENT_DIR));
    if client_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "paths.client_dir",
            "path must not be empty",
        ));
    }

    let template_source = paths
        .template_source
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE_SOURCE));

    Ok(PathSettings {
        client_dir,
        template_source,
    })
}

fn build_theme_settings(themes: RawThemeSettings) -> Result<ThemeSettings, LoadError> {
    let directory = themes
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_THEMES_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "themes.directory",
            "path must not be empty",
        ));
    }

    let default = themes.default.unwrap_or_else(|| DEFAULT_THEME.to_string());
    if default.trim().is_empty() {
        return Err(LoadError::invalid("themes.default", "must not be empty"));
    }

    Ok(ThemeSettings { directory, default })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ttl_secs = cache.page_ttl_seconds.unwrap_or(DEFAULT_PAGE_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.page_ttl_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        page_ttl: Duration::from_secs(ttl_secs),
        page_cache_control: header_value_setting(
            cache.page_cache_control,
            DEFAULT_PAGE_CACHE_CONTROL,
            "cache.page_cache_control",
        )?,
        asset_cache_control: header_value_setting(
            cache.asset_cache_control,
            DEFAULT_ASSET_CACHE_CONTROL,
            "cache.asset_cache_control",
        )?,
        static_cache_control: header_value_setting(
            cache.static_cache_control,
            DEFAULT_STATIC_CACHE_CONTROL,
            "cache.static_cache_control",
        )?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    restart_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAdminSettings {
    token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettingsApiSettings {
    base_url: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    mode: Option<String>,
    sidecar_url: Option<String>,
    dev_command: Option<PathBuf>,
    dev_args: Option<Vec<String>>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPathSettings {
    client_dir: Option<PathBuf>,
    template_source: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawThemeSettings {
    directory: Option<PathBuf>,
    default: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    page_ttl_seconds: Option<u64>,
    page_cache_control: Option<String>,
    asset_cache_control: Option<String>,
    static_cache_control: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let url = Url::parse(value.trim())
        .map_err(|err| LoadError::invalid(key, format!("invalid URL `{value}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(key, "URL scheme must be http or https"));
    }
    Ok(url)
}

fn header_value_setting(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    let value = value.unwrap_or_else(|| default.to_string());
    axum::http::HeaderValue::from_str(&value)
        .map_err(|err| LoadError::invalid(key, format!("not a valid header value: {err}")))?;
    Ok(value)
}
