use std::net::SocketAddr;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::info;

use k1s0_approval_server::adapter::handler::{self, AppState};
use k1s0_approval_server::adapter::repository::{
    InMemoryDefinitionRepository, InMemoryOrganizationRepository, InMemoryWorkflowStore,
    PostgresDefinitionRepository, PostgresOrganizationRepository, PostgresWorkflowStore,
};
use k1s0_approval_server::domain::repository::{
    OrganizationRepository, WorkflowDefinitionRepository, WorkflowStore,
};
use k1s0_approval_server::domain::service::{PermissionResolver, SignatureService};
use k1s0_approval_server::infrastructure::acknowledgement::{
    AcknowledgementQueue, AcknowledgementWorker,
};
use k1s0_approval_server::infrastructure::config::Config;
use k1s0_approval_server::infrastructure::database;
use k1s0_approval_server::infrastructure::definition_loader::DefinitionLoader;
use k1s0_approval_server::infrastructure::erp_sink::{
    ErpAcknowledgementSink, LoggingErpSink, PostgresErpSink,
};
use k1s0_approval_server::infrastructure::telemetry::init_telemetry;
use k1s0_approval_server::usecase;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config
    let cfg = Config::load()?;

    // Telemetry
    init_telemetry(&cfg.logging)?;

    info!(
        app_name = %cfg.app.name,
        version = %cfg.app.version,
        environment = %cfg.app.environment,
        "starting approval server"
    );

    // Signature secret（環境変数が設定ファイルより優先）
    let secret = std::env::var("SIGNATURE_SECRET")
        .map(SecretString::new)
        .unwrap_or_else(|_| cfg.signature.secret.clone());
    let signer = Arc::new(SignatureService::new(&secret)?);

    // Workflow definitions from YAML
    let loaded_definitions = DefinitionLoader::new(&cfg.definitions.dir).load_all().await?;

    // Database pool (optional)
    let db_pool = database::connect(cfg.database.as_ref(), "DATABASE_URL").await?;

    let (store, definitions, organization): (
        Arc<dyn WorkflowStore>,
        Arc<dyn WorkflowDefinitionRepository>,
        Arc<dyn OrganizationRepository>,
    ) = if let Some(pool) = db_pool {
        info!("database connection pool established");
        MIGRATOR.run(&pool).await?;
        info!("database migrations applied");
        let definitions = PostgresDefinitionRepository::new(pool.clone());
        let mut seeded = 0;
        for def in &loaded_definitions {
            // 既に登録済みのサービスコードは上書きしない
            if definitions.find_by_service_code(&def.service_code).await?.is_none() {
                definitions.insert(def).await?;
                seeded += 1;
            }
        }
        info!(
            loaded = loaded_definitions.len(),
            seeded, "workflow definitions seeded into database"
        );
        (
            Arc::new(PostgresWorkflowStore::new(pool.clone())),
            Arc::new(definitions),
            Arc::new(PostgresOrganizationRepository::new(pool)),
        )
    } else {
        tracing::warn!("no database configured, using in-memory repositories");
        let definitions = Arc::new(InMemoryDefinitionRepository::new());
        let count = loaded_definitions.len();
        for def in loaded_definitions {
            definitions.insert(def).await;
        }
        info!(count, "workflow definitions registered in memory");
        (
            Arc::new(InMemoryWorkflowStore::new(definitions.clone())),
            definitions as Arc<dyn WorkflowDefinitionRepository>,
            Arc::new(InMemoryOrganizationRepository::new()),
        )
    };

    // ERP acknowledgement sink (optional)
    let erp_pool = database::connect(
        cfg.erp_database.as_ref().map(|erp| &erp.connection),
        "ERP_DATABASE_URL",
    )
    .await?;
    let sink: Arc<dyn ErpAcknowledgementSink> = if let Some(pool) = erp_pool {
        let queue_schema = cfg
            .erp_database
            .as_ref()
            .map_or_else(|| "DSCSYS".to_string(), |erp| erp.queue_schema.clone());
        info!(queue_schema = %queue_schema, "erp database connection pool established");
        Arc::new(PostgresErpSink::new(pool, queue_schema))
    } else {
        info!("no erp database configured, acknowledgements will only be logged");
        Arc::new(LoggingErpSink)
    };

    // Acknowledgement worker
    let (ack_queue, ack_receiver) = AcknowledgementQueue::new(cfg.ingestion.ack_queue_capacity);
    let ack_worker = AcknowledgementWorker::new(
        sink,
        cfg.ingestion.ack_message.clone(),
        cfg.erp_db_mapping.clone(),
    )
    .spawn(ack_receiver);

    // Use cases
    let initiate_workflow_uc = Arc::new(usecase::InitiateWorkflowUseCase::new(
        store.clone(),
        signer.clone(),
    ));
    let process_action_uc = Arc::new(usecase::ProcessActionUseCase::new(
        store.clone(),
        PermissionResolver::new(organization.clone()),
        signer.clone(),
    ));
    let get_pending_tasks_uc = Arc::new(usecase::GetPendingTasksUseCase::new(
        store.clone(),
        PermissionResolver::new(organization.clone()),
    ));
    let get_history_uc = Arc::new(usecase::GetHistoryUseCase::new(store.clone()));
    let verify_history_uc = Arc::new(usecase::VerifyHistoryUseCase::new(store.clone(), signer));
    let ingest_document_uc = Arc::new(usecase::IngestDocumentUseCase::new(
        store,
        definitions,
        organization,
        initiate_workflow_uc.clone(),
        ack_queue,
        cfg.ingestion.clone(),
    ));

    let state = AppState {
        initiate_workflow_uc,
        process_action_uc,
        get_pending_tasks_uc,
        get_history_uc,
        verify_history_uc,
        ingest_document_uc,
    };

    // Router
    let app = handler::router(state);

    // REST / SOAP server
    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port).parse()?;
    info!("REST server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ルーターの破棄でキューの送信側が閉じ、ワーカーは残りのジョブを処理してから終了する
    if let Err(e) = ack_worker.await {
        tracing::warn!(error = %e, "acknowledgement worker terminated abnormally");
    }
    info!("approval server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
