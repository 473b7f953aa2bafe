//! Process lifecycle: bootstrap, listener ownership and in-process restart.
//!
//! A [`Supervisor`] owns the HTTP listener separately from the component
//! graph built by a [`Bootstrap`]. Restarting closes the listener gracefully,
//! drops every component (caches included), bootstraps again and reopens the
//! listener. [`ListenMode::Detached`] skips the listener entirely so restarts
//! can be exercised without sockets.

use std::{future::Future, io, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::http::HeaderValue;
use metrics::counter;
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{info, warn};

use super::{
    error::InfraError,
    http::{HttpState, StaticRoots, build_router},
};
use crate::{
    application::{
        admin::AdminService,
        error::AppError,
        pages::{PageService, TemplateSource},
        render::{RenderEngine, build_engine},
        settings::{HttpSettingsApi, SiteSettingsApi, THEME_SETTING_KEY},
        themes::ThemeRegistry,
    },
    cache::{CacheConfig, Clock, PageCache, StaticFileCache, SystemClock},
    config::Settings,
};

#[derive(Debug, Clone)]
pub struct RestartRequest {
    pub reason: String,
}

/// Cloneable trigger for a supervisor restart.
#[derive(Debug, Clone)]
pub struct RestartHandle {
    sender: mpsc::UnboundedSender<RestartRequest>,
}

impl RestartHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RestartRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Returns `false` when no supervisor is listening any more.
    pub fn request(&self, reason: impl Into<String>) -> bool {
        self.sender
            .send(RestartRequest {
                reason: reason.into(),
            })
            .is_ok()
    }
}

/// Builds one generation of components.
#[async_trait]
pub trait Bootstrap: Send + Sync {
    async fn bootstrap(&self, restart: RestartHandle) -> Result<HttpState, AppError>;
}

/// Production component graph built from [`Settings`]. The engine, settings
/// client and clock can be replaced for tests.
pub struct DefaultBootstrap {
    settings: Settings,
    engine: Option<Arc<dyn RenderEngine>>,
    settings_api: Option<Arc<dyn SiteSettingsApi>>,
    clock: Arc<dyn Clock>,
}

impl DefaultBootstrap {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            engine: None,
            settings_api: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn RenderEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_settings_api(mut self, api: Arc<dyn SiteSettingsApi>) -> Self {
        self.settings_api = Some(api);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn settings_api(&self) -> Result<Arc<dyn SiteSettingsApi>, AppError> {
        if let Some(api) = &self.settings_api {
            return Ok(Arc::clone(api));
        }
        let api = HttpSettingsApi::new(
            &self.settings.settings_api.base_url,
            self.settings.admin.token.clone(),
            self.settings.settings_api.timeout,
        )?;
        Ok(Arc::new(api))
    }

    fn engine(&self) -> Result<Arc<dyn RenderEngine>, AppError> {
        match &self.engine {
            Some(engine) => Ok(Arc::clone(engine)),
            None => Ok(build_engine(&self.settings.render)?),
        }
    }
}

#[async_trait]
impl Bootstrap for DefaultBootstrap {
    async fn bootstrap(&self, restart: RestartHandle) -> Result<HttpState, AppError> {
        let settings = &self.settings;

        let themes = Arc::new(
            ThemeRegistry::discover(&settings.themes.directory, &settings.site.base_url).await,
        );
        let settings_api = self.settings_api()?;
        let theme = resolve_active_theme(settings_api.as_ref(), &themes, &settings.themes.default)
            .await;
        let engine = self.engine()?;

        let cache_config = CacheConfig::from(&settings.cache);
        let page_cache = Arc::new(PageCache::new(&cache_config, Arc::clone(&self.clock)));
        let cache_control = HeaderValue::from_str(&cache_config.page_cache_control)
            .map_err(|err| InfraError::configuration(format!("cache.page_cache_control: {err}")))?;

        let production = settings.render.mode.is_production();
        let template = if production {
            TemplateSource::Built(settings.paths.built_template())
        } else {
            TemplateSource::Source(settings.paths.template_source.clone())
        };

        let pages = PageService::new(
            Arc::clone(&page_cache),
            engine,
            template,
            theme.clone(),
            cache_control,
            production,
        );
        let admin = AdminService::new(
            page_cache,
            Arc::clone(&themes),
            settings_api,
            restart,
            settings.server.restart_delay,
        );

        info!(
            target = "frontgate::infra::lifecycle",
            theme = %theme,
            themes = themes.len(),
            mode = ?settings.render.mode,
            "components bootstrapped"
        );

        Ok(HttpState {
            pages: Arc::new(pages),
            admin: Arc::new(admin),
            themes,
            static_files: Arc::new(StaticFileCache::new()),
            static_roots: Arc::new(StaticRoots::new(
                &settings.paths.client_dir,
                &settings.themes.directory,
                &cache_config,
            )),
            admin_token: settings.admin.token.as_deref().map(Arc::from),
        })
    }
}

/// Theme named by the site settings when it is installed, otherwise the
/// configured default.
pub async fn resolve_active_theme(
    api: &dyn SiteSettingsApi,
    themes: &ThemeRegistry,
    default: &str,
) -> String {
    match api.fetch().await {
        Ok(current) => match current.get(THEME_SETTING_KEY).and_then(|value| value.as_str()) {
            Some(theme) if themes.exists(theme) => theme.to_string(),
            Some(theme) => {
                warn!(
                    target = "frontgate::infra::lifecycle",
                    theme, default, "configured theme is not installed; using default"
                );
                default.to_string()
            }
            None => default.to_string(),
        },
        Err(err) => {
            warn!(
                target = "frontgate::infra::lifecycle",
                error = %err,
                default,
                "site settings unavailable; using default theme"
            );
            default.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ListenMode {
    Bind(SocketAddr),
    Detached,
}

struct ServerTask {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

impl ServerTask {
    async fn spawn(addr: SocketAddr, state: HttpState) -> Result<Self, InfraError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let router = build_router(state);
        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(async move {
                    let _ = signal.await;
                })
                .await
        });
        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    async fn close(mut self, grace: Duration) -> Result<(), InfraError> {
        let _ = self.shutdown.send(());
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(result)) => result.map_err(InfraError::from),
            Ok(Err(join_err)) => Err(InfraError::server(join_err.to_string())),
            Err(_) => {
                warn!(
                    target = "frontgate::infra::lifecycle",
                    addr = %self.local_addr,
                    grace_ms = grace.as_millis() as u64,
                    "in-flight requests outlived the grace period; aborting listener"
                );
                self.task.abort();
                Ok(())
            }
        }
    }
}

struct Generation {
    state: HttpState,
    server: Option<ServerTask>,
}

pub struct Supervisor<B> {
    bootstrap: B,
    listen: ListenMode,
    graceful_shutdown: Duration,
    restart_handle: RestartHandle,
    restart_requests: mpsc::UnboundedReceiver<RestartRequest>,
    current: Option<Generation>,
    generation: u64,
}

impl<B: Bootstrap> Supervisor<B> {
    pub fn new(bootstrap: B, listen: ListenMode, graceful_shutdown: Duration) -> Self {
        let (restart_handle, restart_requests) = RestartHandle::channel();
        Self {
            bootstrap,
            listen,
            graceful_shutdown,
            restart_handle,
            restart_requests,
            current: None,
            generation: 0,
        }
    }

    pub fn restart_handle(&self) -> RestartHandle {
        self.restart_handle.clone()
    }

    /// Number of successful starts so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    pub fn state(&self) -> Option<&HttpState> {
        self.current.as_ref().map(|current| &current.state)
    }

    /// Bound address of the current listener, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.current
            .as_ref()
            .and_then(|current| current.server.as_ref())
            .map(|server| server.local_addr)
    }

    /// Bootstrap components and open the listener. No-op while running.
    pub async fn start(&mut self) -> Result<(), AppError> {
        if self.current.is_some() {
            return Ok(());
        }

        let state = self.bootstrap.bootstrap(self.restart_handle.clone()).await?;
        let server = match self.listen {
            ListenMode::Bind(addr) => Some(ServerTask::spawn(addr, state.clone()).await?),
            ListenMode::Detached => None,
        };

        self.generation += 1;
        info!(
            target = "frontgate::infra::lifecycle",
            generation = self.generation,
            addr = ?server.as_ref().map(|server| server.local_addr),
            "frontgate started"
        );
        self.current = Some(Generation { state, server });
        Ok(())
    }

    /// Close the listener, letting in-flight requests finish within the
    /// grace period, and drop the current components.
    pub async fn stop(&mut self) -> Result<(), AppError> {
        let Some(current) = self.current.take() else {
            return Ok(());
        };
        if let Some(server) = current.server {
            server.close(self.graceful_shutdown).await?;
        }
        info!(
            target = "frontgate::infra::lifecycle",
            generation = self.generation,
            "frontgate stopped"
        );
        Ok(())
    }

    pub async fn restart(&mut self) -> Result<(), AppError> {
        counter!("frontgate_restart_total").increment(1);
        self.stop().await?;
        self.start().await
    }

    /// Start, then serve restart requests until `shutdown` resolves.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(target = "frontgate::infra::lifecycle", "shutdown requested");
                    break;
                }
                request = self.restart_requests.recv() => {
                    let Some(request) = request else { break };
                    info!(
                        target = "frontgate::infra::lifecycle",
                        reason = %request.reason,
                        "restart requested"
                    );
                    self.restart().await?;
                }
            }
        }

        self.stop().await
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
