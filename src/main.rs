use std::{future::IntoFuture, net::SocketAddr, process, sync::Arc, time::Duration};

use scan_proxy::{
    application::{
        access::AccessKeys, bandwidth::BandwidthGate, error::AppError, limiter::UpstreamLimiter,
        resolver::ScanResolver,
    },
    cache::{CacheConfig, ScanCache},
    config,
    infra::{
        error::InfraError,
        http::{self, AppState, ClientRateLimiter},
        origin::HttpOrigin,
        telemetry,
    },
    util::bytes::ByteSize,
};
use tokio::{sync::Notify, task::JoinHandle};
use tracing::{Dispatch, Level, debug, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
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
    let (_cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let origin = HttpOrigin::from_settings(&settings.origin)?;
    info!(
        origin = %origin.base(),
        max_concurrent = settings.origin.max_concurrent.get(),
        min_spacing_ms = settings.origin.min_spacing.as_millis() as u64,
        quota = %ByteSize(settings.bandwidth.limit_bytes.get()),
        "origin configured"
    );

    let cache = Arc::new(ScanCache::new(CacheConfig::from(&settings.cache)));
    let bandwidth = Arc::new(BandwidthGate::new(settings.bandwidth.limit_bytes.get()));
    let limiter = Arc::new(UpstreamLimiter::new(
        settings.origin.max_concurrent.get() as usize,
        settings.origin.min_spacing,
    ));
    let resolver = Arc::new(ScanResolver::new(
        Arc::clone(&cache),
        bandwidth,
        limiter,
        Arc::new(origin),
        settings.chapters,
    ));

    let access = AccessKeys::new(
        settings.auth.api_key.clone(),
        settings.auth.admin_key.clone(),
    );
    if !access.requires_api_key() {
        warn!("no API key configured; proxy endpoints are open to any client");
    }

    let client_limiter = ClientRateLimiter::new(
        Duration::from_secs(u64::from(settings.rate_limit.window_seconds.get())),
        settings.rate_limit.max_requests.get(),
    );

    let sweep_handle = spawn_sweeper(
        Arc::clone(&cache),
        client_limiter.clone(),
        settings.cache.sweep_interval,
    );

    let state = AppState {
        resolver,
        access: Arc::new(access),
        client_limiter,
    };
    let result = serve_http(&settings, state).await;

    sweep_handle.abort();
    let _ = sweep_handle.await;

    result
}

/// Periodically reclaim memory held by expired cache entries and idle throttle windows.
fn spawn_sweeper(
    cache: Arc<ScanCache>,
    client_limiter: ClientRateLimiter,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            let expired = cache.purge_expired();
            let idle = client_limiter.purge_idle();
            debug!(
                expired,
                idle_clients = idle,
                live = cache.len(),
                "sweep completed"
            );
        }
    })
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let limiter = Arc::clone(state.resolver.limiter());
    let router = http::build_router(state, &settings.cors);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let signalled = Arc::new(Notify::new());
    let shutdown = {
        let signalled = Arc::clone(&signalled);
        async move {
            shutdown_signal().await;
            // queued origin fetches fail fast while connections drain
            limiter.close();
            signalled.notify_one();
        }
    };

    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .into_future();
    tokio::pin!(server);

    let outcome = tokio::select! {
        biased;
        outcome = &mut server => outcome,
        _ = signalled.notified() => {
            info!(
                grace_secs = settings.server.graceful_shutdown.as_secs(),
                "shutdown requested; draining connections"
            );
            match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("graceful shutdown timed out; dropping remaining connections");
                    Ok(())
                }
            }
        }
    };

    outcome.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
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
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
