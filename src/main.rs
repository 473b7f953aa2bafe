use std::process;

use frontgate::{
    application::{error::AppError, themes::ThemeRegistry},
    config,
    infra::{
        lifecycle::{DefaultBootstrap, ListenMode, Supervisor, shutdown_signal},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args.command.unwrap_or(config::Command::Serve);

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve => run_serve(settings).await,
        config::Command::Themes => run_themes(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    info!(
        target = "frontgate::serve",
        addr = %settings.server.addr,
        mode = ?settings.render.mode,
        themes = %settings.themes.directory.display(),
        "Starting frontgate"
    );

    let listen = ListenMode::Bind(settings.server.addr);
    let graceful = settings.server.graceful_shutdown;
    let supervisor = Supervisor::new(DefaultBootstrap::new(settings), listen, graceful);

    supervisor.run(shutdown_signal()).await?;
    info!(target = "frontgate::serve", "Shutdown complete");
    Ok(())
}

async fn run_themes(settings: config::Settings) -> Result<(), AppError> {
    let registry = ThemeRegistry::discover(&settings.themes.directory, &settings.site.base_url).await;
    let json = serde_json::to_string_pretty(registry.list())
        .map_err(|err| AppError::unexpected(format!("failed to encode themes: {err}")))?;
    println!("{json}");
    Ok(())
}
