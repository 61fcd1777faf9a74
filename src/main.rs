use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use store_provisioner::api::{router, AppState};
use store_provisioner::config::Config;
use store_provisioner::helm::cli::CliHelmExecutor;
use store_provisioner::kube_probe::client::KubeProbe;
use store_provisioner::logging;
use store_provisioner::recovery::RecoveryController;
use store_provisioner::store::sqlite::SqliteStoreRepository;
use store_provisioner::store::StoreRepository;
use store_provisioner::worker::{Worker, WorkerConfig};

#[tokio::main]
async fn main() {
    logging::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!(error = %e, "fatal error during startup");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let store: Arc<dyn StoreRepository> = Arc::new(SqliteStoreRepository::connect(&config.database_url).await?);

    let helm = Arc::new(CliHelmExecutor::new(
        config.helm_chart_path.clone(),
        config.helm_values_file.clone(),
        config.helm_env_values_file.clone(),
        config.helm_exec_timeout,
        config.kubeconfig.clone(),
    ));
    let probe = Arc::new(KubeProbe::new());

    let worker = Worker::new(
        store.clone(),
        helm.clone(),
        probe,
        WorkerConfig {
            max_workers: config.provisioning_max_workers,
            poll_interval: config.provisioning_poll_interval,
            overall_timeout: config.provisioning_timeout,
            base_domain: config.base_domain.clone(),
            tls_enabled: config.tls_enabled,
        },
    );

    // Reconcile persisted intent against cluster reality before the API
    // starts accepting traffic.
    info!("running startup recovery");
    RecoveryController::new(store.clone(), helm, worker.clone()).run().await;

    let app = axum::Router::new()
        .nest("/api/v1", router(AppState { store, worker: worker.clone() }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(worker))
        .await?;

    Ok(())
}

async fn shutdown_signal(worker: Worker) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining in-flight provisioning tasks");
    worker.begin_shutdown();
}
