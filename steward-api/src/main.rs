use anyhow::Result;
use tokio::time::Duration;
use tracing::info;

use steward_api::{create_app, Config};
use steward_cluster::get_cluster;
use steward_engine::db::{backup_database, create_pool, run_migrations};
use steward_engine::{ActionExecutor, ClusterObserver, DeploymentStore, Reconciler};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter("steward_api=debug,steward_engine=debug,tower_http=debug")
        .init();

    info!("Starting steward-api service...");

    // Load configuration
    let config = Config::from_env();
    info!(
        "Configuration loaded: bind_addr={}, db_path={}, cluster_backend={}",
        config.bind_addr,
        config.db_path.display(),
        config.cluster_backend
    );

    // Database setup
    let db_path = &config.db_path;

    // Backup before migrations
    if db_path.exists() {
        let backup_path = backup_database(db_path)?;
        info!("Database backed up to: {}", backup_path.display());
    }

    let pool = create_pool(db_path).await?;
    info!("Running database migrations...");
    run_migrations(&pool).await?;
    info!("Migrations complete");

    let store = DeploymentStore::new(pool);

    // Cluster backend and observer loop
    let cluster = get_cluster(&config.cluster_config())?;
    let observer = ClusterObserver::new(cluster.clone());
    let observer_handle = observer.handle();
    tokio::spawn(observer.run(Duration::from_secs(config.observe_interval_secs)));
    info!(
        "Observer task started (interval: {}s)",
        config.observe_interval_secs
    );

    // Reconcile loop
    let executor = ActionExecutor::new(cluster, store.clone());
    let reconciler = Reconciler::new(store.clone(), observer_handle.clone(), executor);
    tokio::spawn(reconciler.run(Duration::from_secs(config.reconcile_interval_secs)));
    info!(
        "Reconciler task started (interval: {}s)",
        config.reconcile_interval_secs
    );

    // Create app
    let app = create_app(store, observer_handle);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
