use std::sync::Arc;
use std::time::Duration;

use renderflow::api;
use renderflow::config;
use renderflow::jobs::{AdmissionController, JobRegistry, Reclaimer, Scheduler};
use renderflow::render::files::{cleanup_old_files, init_temp_dir};
use renderflow::render::{CommandRenderer, FallbackParser};

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = config::Config::from_env()?;

    tracing::info!(
        listen_addr = %cfg.listen_addr,
        max_concurrent_renders = cfg.max_concurrent_renders,
        render_timeout_ms = cfg.render_timeout.as_millis() as u64,
        max_queue_depth = cfg.max_queue_depth,
        job_retention_secs = cfg.job_retention.as_secs(),
        sweep_interval_secs = cfg.sweep_interval.as_secs(),
        temp_dir = %cfg.temp_dir.display(),
        llm_model = cfg.llm.as_ref().map_or("-", |l| l.model.as_str()),
        "renderflow starting"
    );

    init_temp_dir(&cfg.temp_dir).await?;
    match cleanup_old_files(&cfg.temp_dir, cfg.job_retention).await {
        Ok(n) if n > 0 => tracing::info!(deleted = n, "startup temp cleanup"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "startup temp cleanup failed"),
    }

    let registry = JobRegistry::new();
    let scheduler = Scheduler::new(registry.clone(), cfg.scheduler());
    let admission = AdmissionController::new(scheduler, cfg.admission());
    let reclaimer = Reclaimer::new(registry, cfg.reclaimer());

    let api_state = api::ApiState::new(
        admission,
        Arc::new(FallbackParser::from_config(cfg.llm.clone())?),
        Arc::new(CommandRenderer::new(cfg.render())),
        cfg.temp_dir.clone(),
    );
    let app = api::router(api_state);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ---- API task ----
    let mut api_handle = {
        let addr = cfg.listen_addr.clone();
        let shutdown = wait_for(shutdown_rx.clone());
        tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(%addr, "api listening");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await?;
            Ok::<(), anyhow::Error>(())
        })
    };

    // ---- Job sweep task (first sweep runs immediately) ----
    let reclaim_handle = tokio::spawn(reclaimer.run(wait_for(shutdown_rx.clone())));

    // ---- Temp file cleanup task ----
    let cleanup_handle = {
        let dir = cfg.temp_dir.clone();
        let max_age = cfg.job_retention;
        let every = cfg.sweep_interval;
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(every) => {}
                    _ = shutdown.changed() => break,
                }
                match cleanup_old_files(&dir, max_age).await {
                    Ok(n) if n > 0 => tracing::info!(deleted = n, "temp cleanup"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "temp cleanup failed"),
                }
            }
        })
    };

    tokio::select! {
        res = &mut api_handle => {
            res??;
            return Ok(());
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);

    // in-flight requests drain before the server task returns
    let drain = cfg.render_timeout + Duration::from_secs(5);
    match tokio::time::timeout(drain, &mut api_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "api server stopped with an error"),
        Ok(Err(e)) => tracing::error!(error = %e, "api task failed"),
        Err(_) => {
            tracing::warn!(drain_ms = drain.as_millis() as u64, "api drain timed out");
            api_handle.abort();
        }
    }
    let _ = reclaim_handle.await;
    let _ = cleanup_handle.await;
    tracing::info!("renderflow stopped");

    Ok(())
}

async fn wait_for(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await
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
