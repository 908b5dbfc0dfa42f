use axum::{Router, extract::DefaultBodyLimit, routing::get};
use osz_asset_backend::config::AppConfig;
use osz_asset_backend::cors::build_cors_layer;
use osz_asset_backend::features::assets::{self, AssetStore};
use osz_asset_backend::features::{health, upload};
use osz_asset_backend::startup::run_startup_checks;
use osz_asset_backend::state::AppState;
use osz_asset_backend::{ShutdownManager, request_id};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::compression::CompressionLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

fn compression_predicate() -> impl tower_http::compression::predicate::Predicate {
    use tower_http::compression::predicate::{NotForContentType, Predicate, SizeAbove};

    // 压缩策略：明确排除不该压缩的响应。
    //
    // 本服务的主要流量就是 JPEG/MP3 资产，它们本身已是压缩格式，
    // 再套一层 gzip/brotli 纯属浪费 CPU；JSON（上传回执/错误体/OpenAPI）仍然受益。
    SizeAbove::default()
        .and(NotForContentType::IMAGES)
        .and(NotForContentType::SSE)
        .and(NotForContentType::const_new("audio/"))
        .and(NotForContentType::const_new("application/octet-stream"))
        .and(NotForContentType::const_new("application/zip"))
}


#[derive(OpenApi)]
#[openapi(
    paths(
        osz_asset_backend::features::upload::handler::upload_osz,
        osz_asset_backend::features::assets::handler::get_thumbnail,
        osz_asset_backend::features::assets::handler::get_preview,
        osz_asset_backend::features::health::handler::health_check,
    ),
    components(
        schemas(
            osz_asset_backend::error::AppError,
            osz_asset_backend::error::AssetGenError,
            osz_asset_backend::error::ProblemDetails,
            osz_asset_backend::features::upload::handler::UploadResponse,
            osz_asset_backend::features::health::handler::HealthResponse,
        )
    ),
    tags(
        (name = "Upload", description = "Upload APIs"),
        (name = "Assets", description = "Asset APIs"),
        (name = "Health", description = "Health APIs"),
    ),
    info(
        title = "OSZ Asset Backend API",
        version = "0.1.0",
        description = "Custom beatmap thumbnail/preview service (Axum)"
    )
)]
pub struct ApiDoc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "osz_asset_backend=info,tower_http=info".into()),
        )
        .init();

    // 创建优雅退出管理器
    let shutdown_manager = ShutdownManager::new();

    // Load config
    if let Err(e) = AppConfig::init_global() {
        tracing::error!("Config init failed: {}", e);
        std::process::exit(1);
    }
    let config = AppConfig::global();

    // 启动信号处理器
    if let Err(e) = shutdown_manager.start_signal_handler().await {
        tracing::error!("信号处理器启动失败: {}", e);
        std::process::exit(1);
    }

    // Run startup checks
    if let Err(e) = run_startup_checks(config).await {
        tracing::error!("Startup checks failed: {}", e);
        std::process::exit(1);
    }

    // Shared state
    let generate_permits = {
        let m = config.generation.max_parallel as usize;
        if m == 0 { num_cpus::get() } else { m }
    };
    let app_state = AppState {
        asset_store: Arc::new(AssetStore::new(config.assets_path())),
        generate_semaphore: Arc::new(Semaphore::new(generate_permits)),
        upload_max_bytes: config.upload.max_archive_bytes,
        optimize_speed: config.generation.optimize_speed,
    };

    // Routes：资产路由挂在根路径（与主站 /thumb、/preview URL 形状一致），
    // 上传触发挂在 API 前缀下并放开请求体大小限制。
    let api_router = Router::<AppState>::new()
        .merge(upload::create_upload_router())
        .layer(DefaultBodyLimit::max(
            config.upload.max_archive_bytes as usize,
        ));

    let mut app = Router::<AppState>::new()
        .route("/health", get(health::health_check))
        .merge(assets::create_asset_router())
        .nest(&config.api.prefix, api_router)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(app_state.clone());

    // 全局 request_id 中间件
    app = app.layer(axum::middleware::from_fn(request_id::request_id_middleware));

    // CORS（按配置启用）
    if let Some(cors) = build_cors_layer(&config.cors) {
        app = app.layer(cors);
    }

    // 应用内响应压缩：JSON/文本受益；JPEG/MP3 资产被谓词排除。
    app = app.layer(CompressionLayer::new().compress_when(compression_predicate()));

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!("Upload API: http://{}{}/osz/{{id}}", addr, config.api.prefix);
    tracing::info!("Asset cache: {:?}", config.assets_path());

    // 启动服务器并等待优雅退出信号
    let shutdown_config = config.shutdown.clone();
    let shutdown_timeout = shutdown_config.timeout_duration();
    let semaphore_for_drain = app_state.generate_semaphore.clone();

    let shutdown_signal = async move {
        let reason = shutdown_manager.wait_for_shutdown().await;
        tracing::info!("接收到退出信号: {:?}，开始优雅退出...", reason);

        // 拿满全部生成许可即代表没有在途的资产生成任务；
        // 超时则放弃等待；半途的生成只留下临时文件，重启后可重新触发。
        match tokio::time::timeout(shutdown_timeout, async {
            let _all = semaphore_for_drain
                .acquire_many(generate_permits as u32)
                .await;
            tracing::info!("在途资产生成任务已全部完成");
        })
        .await
        {
            Ok(_) => {
                tracing::info!("优雅退出完成");
            }
            Err(_) => {
                tracing::warn!("优雅退出超时，强制退出");
                if shutdown_config.force_quit {
                    tracing::info!("等待 {} 秒后强制退出", shutdown_config.force_delay_secs);
                    tokio::time::sleep(shutdown_config.force_delay_duration()).await;
                }
            }
        }
    };

    let graceful = axum::serve(listener, app).with_graceful_shutdown(async {
        shutdown_signal.await;
        tracing::info!("开始优雅关闭HTTP服务器...");
    });

    if let Err(e) = graceful.await {
        tracing::error!("服务器运行错误: {}", e);
        std::process::exit(1);
    }

    tracing::info!("服务器已优雅关闭");
}
