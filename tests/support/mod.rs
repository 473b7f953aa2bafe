#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{Request, Response},
};
use frontgate::{
    application::{
        render::{RenderEngine, RenderError, RenderOutput, RenderRequest},
        settings::{SettingsApiError, SiteSettingsApi, SiteSettingsMap},
    },
    cache::{Clock, SystemClock},
    config::Settings,
    infra::{
        http::HttpState,
        lifecycle::{Bootstrap, DefaultBootstrap, RestartHandle, RestartRequest},
    },
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

pub const ADMIN_TOKEN: &str = "s3cret";
pub const TEMPLATE: &str = "<!doctype html><html><head><!--app-head--></head>\
<body><div id=\"app\"></div><!--app-state--></body></html>";

type RenderFn = dyn Fn(&RenderRequest) -> Result<RenderOutput, RenderError> + Send + Sync;

/// Render engine answering from a closure and counting calls.
pub struct StubEngine {
    calls: AtomicUsize,
    respond: Box<RenderFn>,
    seen: Mutex<Vec<RenderRequest>>,
}

impl StubEngine {
    pub fn new(
        respond: impl Fn(&RenderRequest) -> Result<RenderOutput, RenderError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            respond: Box::new(respond),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Engine rendering `<main>{route}</main>` for every request.
    pub fn echo() -> Arc<Self> {
        Self::new(|request| {
            Ok(RenderOutput {
                markup: format!("<main>{}</main>", request.route),
                head_metadata: "<title>Stub</title>".to_string(),
                page_metadata: BTreeMap::new(),
                application_state: json!({ "route": request.route }),
                ..RenderOutput::default()
            })
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<RenderRequest> {
        self.seen.lock().expect("seen lock").clone()
    }
}

#[async_trait]
impl RenderEngine for StubEngine {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().expect("seen lock").push(request.clone());
        (self.respond)(request)
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// In-memory site settings store.
#[derive(Default)]
pub struct MemorySettings {
    current: Mutex<SiteSettingsMap>,
    persisted: Mutex<Vec<SiteSettingsMap>>,
    unavailable: bool,
}

impl MemorySettings {
    pub fn with_theme(theme: &str) -> Arc<Self> {
        let mut current = SiteSettingsMap::new();
        current.insert("theme".to_string(), Value::String(theme.to_string()));
        current.insert("title".to_string(), Value::String("Frontgate".to_string()));
        Arc::new(Self {
            current: Mutex::new(current),
            ..Self::default()
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            unavailable: true,
            ..Self::default()
        })
    }

    pub fn persisted(&self) -> Vec<SiteSettingsMap> {
        self.persisted.lock().expect("persisted lock").clone()
    }
}

#[async_trait]
impl SiteSettingsApi for MemorySettings {
    async fn fetch(&self) -> Result<SiteSettingsMap, SettingsApiError> {
        if self.unavailable {
            return Err(SettingsApiError::Http("connection refused".to_string()));
        }
        Ok(self.current.lock().expect("current lock").clone())
    }

    async fn persist(&self, settings: &SiteSettingsMap) -> Result<(), SettingsApiError> {
        if self.unavailable {
            return Err(SettingsApiError::Http("connection refused".to_string()));
        }
        *self.current.lock().expect("current lock") = settings.clone();
        self.persisted
            .lock()
            .expect("persisted lock")
            .push(settings.clone());
        Ok(())
    }
}

/// Build output, source template and two installed themes under `root`.
pub fn write_fixture(root: &Path) {
    let client = root.join("client");
    std::fs::create_dir_all(client.join("assets")).expect("create assets dir");
    std::fs::write(client.join("index.html"), TEMPLATE).expect("write template");
    std::fs::write(client.join("assets/app.js"), "console.log('frontgate');\n".repeat(64))
        .expect("write asset");
    std::fs::write(client.join("assets/my file.css"), "body { margin: 0 }\n")
        .expect("write spaced asset");
    std::fs::write(client.join("robots.txt"), "User-agent: *\n").expect("write robots");

    for (namespace, name) in [("theme-default", "Default"), ("theme-dark", "Dark")] {
        let dir = root.join("themes").join(namespace);
        std::fs::create_dir_all(&dir).expect("create theme dir");
        std::fs::write(
            dir.join("theme.toml"),
            format!("name = \"{name}\"\nversion = \"1.0.0\"\nauthor = \"Frontgate\"\n"),
        )
        .expect("write manifest");
        std::fs::write(dir.join("preview.png"), [0x89, b'P', b'N', b'G']).expect("write preview");
    }
}

pub fn settings_for(root: &Path) -> Settings {
    let mut settings = Settings::defaults().expect("default settings are valid");
    settings.paths.client_dir = root.join("client");
    settings.paths.template_source = root.join("client/index.html");
    settings.themes.directory = root.join("themes");
    settings.admin.token = Some(ADMIN_TOKEN.to_string());
    settings.server.restart_delay = Duration::ZERO;
    settings.server.graceful_shutdown = Duration::from_secs(2);
    settings
}

pub struct Harness {
    pub dir: TempDir,
    pub state: HttpState,
    pub engine: Arc<StubEngine>,
    pub site_settings: Arc<MemorySettings>,
    pub restarts: UnboundedReceiver<RestartRequest>,
}

pub async fn harness(engine: Arc<StubEngine>) -> Harness {
    harness_with(engine, MemorySettings::with_theme("theme-default"), |_| {}).await
}

pub async fn harness_with(
    engine: Arc<StubEngine>,
    site_settings: Arc<MemorySettings>,
    configure: impl FnOnce(&mut Settings),
) -> Harness {
    harness_with_clock(engine, site_settings, Arc::new(SystemClock), configure).await
}

/// Harness whose page cache reads time from `clock`.
pub async fn harness_with_clock(
    engine: Arc<StubEngine>,
    site_settings: Arc<MemorySettings>,
    clock: Arc<dyn Clock>,
    configure: impl FnOnce(&mut Settings),
) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    write_fixture(dir.path());
    let mut settings = settings_for(dir.path());
    configure(&mut settings);

    let (restart, restarts) = RestartHandle::channel();
    let state = DefaultBootstrap::new(settings)
        .with_engine(engine.clone())
        .with_settings_api(site_settings.clone())
        .with_clock(clock)
        .bootstrap(restart)
        .await
        .expect("bootstrap should succeed");

    Harness {
        dir,
        state,
        engine,
        site_settings,
        restarts,
    }
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes()
}

pub fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(uri)
}
