mod config;
mod course_api;
mod domain;
mod lms_client;
mod player;
mod storage;
mod tracker;

use std::{path::Path, sync::Arc};

use config::Config;
use course_api::{CourseViewApi, CourseViewRegistry};
use lms_client::LmsClient;
use player::{BridgePlayerHost, PlayerApi};
use poem::{
    EndpointExt, Route, Server,
    listener::TcpListener,
    middleware::{Cors, Tracing as PoemTracing},
};
use poem_openapi::OpenApiService;
use tokio_util::sync::CancellationToken;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt::SubscriberBuilder, prelude::*};

type ProgressSyncResult<T> = anyhow::Result<T>;

#[tokio::main]
async fn main() -> ProgressSyncResult<()> {
    // Respect RUST_LOG if set, default to info for our crate and warn for deps.
    let default_filter = format!(
        "{}=info,poem=info,reqwest=warn,h2=warn",
        env!("CARGO_PKG_NAME")
    );
    let env_filter = std::env::var("RUST_LOG").unwrap_or(default_filter);
    SubscriberBuilder::default()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .with_level(true)
        .pretty()
        .finish()
        .with(ErrorLayer::default())
        .init();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting LMS progress sync"
    );

    if Path::new(".env.local").exists() {
        dotenvy::from_filename(".env.local")?;
    } else if Path::new(".env").exists() {
        dotenvy::from_filename(".env")?;
    };
    let config = Config::load()?;
    if let Err(e) = config.validate() {
        return Err(anyhow::anyhow!(e));
    }

    let client = LmsClient::new(&config.lms_api_base_url, config.request_timeout())?
        .with_access_token(&config.lms_access_token);
    tracing::info!(
        lms_base = %client.base_url(),
        poll_interval_secs = config.poll_interval_secs,
        min_delta = config.progress_min_delta,
        monotonic = config.monotonic_progress,
        "configured LMS client"
    );

    let player_api = PlayerApi::new(|| async { Ok(Arc::new(BridgePlayerHost::new())) });
    let registry = Arc::new(
        CourseViewRegistry::new(Arc::new(client), player_api, config.tracker_settings())
            .with_idle_timeout(config.view_idle_timeout()),
    );
    let reaper_cancel = CancellationToken::new();
    let reaper = tokio::spawn(registry.clone().run_reaper(reaper_cancel.clone()));

    let result = run_poem(registry.clone(), &config).await;
    reaper_cancel.cancel();
    let _ = reaper.await;
    registry.shutdown().await;
    tracing::info!("stopped");
    result
}

pub async fn run_poem(
    registry: Arc<CourseViewRegistry>,
    config: &Config,
) -> ProgressSyncResult<()> {
    let version = env!("CARGO_PKG_VERSION");
    let api = CourseViewApi { registry };
    let api_service = OpenApiService::new(api, "LMS Progress Sync API", version)
        .server(format!("http://{}", config.bind_addr));
    let ui = api_service.rapidoc();
    let spec = api_service.spec();
    let route = Route::new()
        .nest("/", api_service)
        .nest("/ui", ui)
        .nest("/spec", poem::endpoint::make_sync(move |_| spec.clone()))
        .with(Cors::new())
        .with(PoemTracing);

    let bind_addr = config.bind_addr;
    tracing::info!(%bind_addr, "starting HTTP server");
    Server::new(TcpListener::bind(bind_addr))
        .run_with_graceful_shutdown(
            route,
            async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown requested");
            },
            None,
        )
        .await?;
    Ok(())
}
