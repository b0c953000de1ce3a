//! Process wiring: providers, tenant router, task handlers, beats.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use trawl_application::beat::{check_for_checkpoint_cleanup, check_for_indexing, cleanup_checkpoint};
use trawl_application::context::TenantContext;
use trawl_application::indexing::{ExitCodePolicy, IndexingServices, IndexingWatchdog};
use trawl_application::sync::{check_for_doc_sync, sync_document};
use trawl_application::tasks::{
    self, CleanupCheckpointPayload, DocSyncPayload, IndexingTaskPayload,
};
use trawl_domain::error::{Error, Result};
use trawl_domain::ports::{ContentClassifier, EmbeddingProvider, KvBroker, SearchIndexProvider, TextGenerator, VisionProvider};
use trawl_domain::value_objects::TenantId;
use trawl_infrastructure::config::AppConfig;
use trawl_infrastructure::queue::{QueueDriver, TaskRegistry};
use trawl_infrastructure::spawn::TokioProcessSpawner;
use trawl_infrastructure::tenant::TenantRouter;
use trawl_providers::connectors::DefaultConnectorFactory;
use trawl_providers::database::sqlite;
use trawl_providers::inference::{HashEmbeddingProvider, ModelServerClient};
use trawl_providers::kv::{MemoryKvBroker, MemoryKvState, RedisKvBroker};
use trawl_providers::search_index::{HttpSearchIndex, MemorySearchIndex};

/// Everything one worker process runs with.
pub struct App {
    /// Loaded configuration
    pub config: AppConfig,
    /// Tenant router
    pub router: Arc<TenantRouter>,
    /// Shared provider bundle
    pub services: IndexingServices,
    /// The queue driver
    pub queue: Arc<QueueDriver>,
}

fn tenant_ids(config: &AppConfig) -> Vec<TenantId> {
    if config.tenants.is_empty() {
        vec![TenantId::default()]
    } else {
        config.tenants.iter().map(TenantId::new).collect()
    }
}

fn build_kv_pair(
    memory_state: &Arc<MemoryKvState>,
    redis_root: &Option<RedisKvBroker>,
    tenant: &TenantId,
) -> (Arc<dyn KvBroker>, Arc<dyn KvBroker>) {
    match redis_root {
        Some(root) => {
            // the broker routes scans to its replica connection internally
            let handle: Arc<dyn KvBroker> = Arc::new(root.for_tenant(tenant));
            (Arc::clone(&handle), handle)
        }
        None => {
            let handle: Arc<dyn KvBroker> =
                Arc::new(MemoryKvBroker::new(Arc::clone(memory_state), tenant));
            (Arc::clone(&handle), handle)
        }
    }
}

/// Build the full application: providers, tenants, handlers, queue.
pub async fn build(config: AppConfig, config_path: Option<PathBuf>) -> Result<App> {
    let memory_state = MemoryKvState::new();
    let redis_root = if config.kv.backend == "redis" {
        Some(
            RedisKvBroker::connect(
                &config.kv.url,
                config.kv.replica_url.as_deref(),
                &TenantId::default(),
            )
            .await?,
        )
    } else {
        None
    };

    let search_index: Arc<dyn SearchIndexProvider> = if config.search_index.backend == "http" {
        Arc::new(HttpSearchIndex::new(config.search_index.url.clone()))
    } else {
        MemorySearchIndex::new()
    };

    let embedding: Arc<dyn EmbeddingProvider>;
    let classifier: Option<Arc<dyn ContentClassifier>>;
    let vision: Option<Arc<dyn VisionProvider>>;
    let generator: Option<Arc<dyn TextGenerator>>;
    if config.inference.backend == "http" {
        let client = Arc::new(ModelServerClient::new(
            config.inference.url.clone(),
            "default",
            config.inference.dimensions,
        ));
        embedding = Arc::clone(&client) as Arc<dyn EmbeddingProvider>;
        classifier = config
            .inference
            .enable_content_classification
            .then(|| Arc::clone(&client) as Arc<dyn ContentClassifier>);
        vision = Some(Arc::clone(&client) as Arc<dyn VisionProvider>);
        generator = Some(client as Arc<dyn TextGenerator>);
    } else {
        embedding = Arc::new(HashEmbeddingProvider::new(config.inference.dimensions));
        classifier = None;
        vision = None;
        generator = None;
    }

    let router = Arc::new(TenantRouter::new());
    for tenant in tenant_ids(&config) {
        let (kv, kv_replica) = build_kv_pair(&memory_state, &redis_root, &tenant);
        let executor = if config.database.path == ":memory:" {
            sqlite::connect_in_memory().await?
        } else {
            let path = config.database.path.replace("{tenant}", tenant.as_str());
            sqlite::connect(&path).await?
        };
        let repos = sqlite::build_repositories(executor);
        router.register(TenantContext::new(tenant, kv, kv_replica, repos));
    }

    let registry = Arc::new(TaskRegistry::new());
    let queue = QueueDriver::new(Arc::clone(&registry), &config.queue);

    let services = IndexingServices {
        search_index: Arc::clone(&search_index),
        embedding,
        classifier,
        vision,
        generator,
        connector_factory: Arc::new(DefaultConnectorFactory::new()),
        queue: Arc::clone(&queue) as Arc<dyn trawl_domain::ports::TaskQueue>,
        spawner: Arc::new(TokioProcessSpawner::new(config_path)),
    };

    register_handlers(
        &registry,
        Arc::clone(&router),
        services.clone(),
        Arc::clone(&search_index),
        ExitCodePolicy::from(config.indexing.exit_code_policy),
    );

    Ok(App {
        config,
        router,
        services,
        queue,
    })
}

fn register_handlers(
    registry: &TaskRegistry,
    router: Arc<TenantRouter>,
    services: IndexingServices,
    search_index: Arc<dyn SearchIndexProvider>,
    policy: ExitCodePolicy,
) {
    {
        let router = Arc::clone(&router);
        let services = services.clone();
        registry.register(tasks::TASK_INDEXING_WATCHDOG, move |execution| {
            let router = Arc::clone(&router);
            let services = services.clone();
            async move {
                let ctx = router.resolve(&execution.tenant)?;
                let payload: IndexingTaskPayload = serde_json::from_value(execution.payload)?;
                let watchdog = IndexingWatchdog::new(policy);
                watchdog
                    .run(&ctx, &services, &payload, &execution.task_id)
                    .await?;
                Ok(())
            }
        });
    }

    {
        let router = Arc::clone(&router);
        registry.register(tasks::TASK_DOC_SYNC, move |execution| {
            let router = Arc::clone(&router);
            let search_index = Arc::clone(&search_index);
            async move {
                let ctx = router.resolve(&execution.tenant)?;
                let payload: DocSyncPayload = serde_json::from_value(execution.payload)?;
                sync_document(&ctx, search_index.as_ref(), &payload).await?;
                Ok(())
            }
        });
    }

    registry.register(tasks::TASK_CLEANUP_CHECKPOINT, move |execution| {
        let router = Arc::clone(&router);
        async move {
            let ctx = router.resolve(&execution.tenant)?;
            let payload: CleanupCheckpointPayload = serde_json::from_value(execution.payload)?;
            cleanup_checkpoint(&ctx, payload.index_attempt_id).await
        }
    });
}

/// Run the beats until shutdown.
pub async fn serve(config: AppConfig, config_path: Option<PathBuf>) -> Result<()> {
    let app = build(config, config_path).await?;
    let beat_period = Duration::from_secs(app.config.indexing.beat_period_secs.max(1));
    let sync_period = Duration::from_secs(app.config.sync.beat_period_secs.max(1));
    let cleanup_period = Duration::from_secs(3600);

    // make sure the active settings have their index schemas before any
    // attempt writes chunks
    for ctx in app.router.all() {
        for settings in ctx.repos.search_settings.list_active().await? {
            app.services.search_index.ensure_ready(&settings).await?;
        }
    }

    tracing::info!(
        tenants = app.router.all().len(),
        beat_secs = beat_period.as_secs(),
        "Trawl worker serving"
    );

    let mut handles = Vec::new();
    for ctx in app.router.all() {
        let services = app.services.clone();
        let beat_ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(beat_period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = check_for_indexing(&beat_ctx, &services).await {
                    tracing::error!(tenant = %beat_ctx.tenant, error = %e, "Indexing beat failed");
                }
            }
        }));

        let queue = Arc::clone(&app.queue);
        let sync_ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sync_period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = check_for_doc_sync(&sync_ctx, queue.as_ref()).await {
                    tracing::error!(tenant = %sync_ctx.tenant, error = %e, "Doc sync beat failed");
                }
            }
        }));

        let queue = Arc::clone(&app.queue);
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = check_for_checkpoint_cleanup(&ctx, queue.as_ref()).await {
                    tracing::error!(tenant = %ctx.tenant, error = %e, "Checkpoint cleanup beat failed");
                }
            }
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::internal(format!("failed to listen for shutdown: {e}")))?;
    tracing::info!("Shutdown signal received, stopping beats");
    for handle in handles {
        handle.abort();
    }
    Ok(())
}
