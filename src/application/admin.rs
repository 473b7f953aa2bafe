//! Administrative operations: cache control and live theme switching.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::{
    application::{
        error::AppError,
        settings::{SiteSettingsApi, merge_theme},
        themes::ThemeRegistry,
    },
    cache::{CacheStats, PageCache},
    domain::{error::DomainError, themes::validate_namespace},
    infra::lifecycle::RestartHandle,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClearOutcome {
    pub success: bool,
    pub message: String,
    pub cleared: usize,
}

pub struct AdminService {
    cache: Arc<PageCache>,
    themes: Arc<ThemeRegistry>,
    settings: Arc<dyn SiteSettingsApi>,
    restart: RestartHandle,
    restart_delay: Duration,
}

impl AdminService {
    pub fn new(
        cache: Arc<PageCache>,
        themes: Arc<ThemeRegistry>,
        settings: Arc<dyn SiteSettingsApi>,
        restart: RestartHandle,
        restart_delay: Duration,
    ) -> Self {
        Self {
            cache,
            themes,
            settings,
            restart,
            restart_delay,
        }
    }

    pub fn clear_cache(&self) -> ClearOutcome {
        let cleared = self.cache.clear();
        info!(
            target = "frontgate::application::admin",
            cleared, "page cache cleared"
        );
        ClearOutcome {
            success: true,
            message: format!("Cleared {cleared} cached pages"),
            cleared,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Validate `theme` and schedule the switch. The returned task fetches the
    /// current site settings, persists the merged theme, waits the restart
    /// delay and then asks the supervisor to restart. A failed fetch or
    /// persist is logged and no restart is requested.
    pub fn set_theme(&self, theme: &str) -> Result<JoinHandle<()>, AppError> {
        let theme = validate_namespace(theme)?;
        if !self.themes.exists(theme) {
            return Err(DomainError::not_found("theme").into());
        }

        let theme = theme.to_string();
        let settings = Arc::clone(&self.settings);
        let restart = self.restart.clone();
        let delay = self.restart_delay;

        info!(
            target = "frontgate::application::admin",
            theme = %theme,
            "theme change accepted"
        );

        Ok(tokio::spawn(async move {
            let current = match settings.fetch().await {
                Ok(current) => current,
                Err(err) => {
                    error!(
                        target = "frontgate::application::admin",
                        theme = %theme,
                        error = %err,
                        "failed to fetch site settings; theme unchanged"
                    );
                    return;
                }
            };

            if let Err(err) = settings.persist(&merge_theme(current, &theme)).await {
                error!(
                    target = "frontgate::application::admin",
                    theme = %theme,
                    error = %err,
                    "failed to persist theme; restart skipped"
                );
                return;
            }

            tokio::time::sleep(delay).await;
            restart.request(format!("theme changed to {theme}"));
        }))
    }
}
