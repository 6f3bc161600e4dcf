use std::future::IntoFuture;
use std::process;
use std::sync::Arc;

use axum::http::{HeaderValue, Method, header};
use axum::middleware as axum_middleware;
use foglio::{
    application::{
        auth::{AdminSeed, AuthService},
        comments::CommentService,
        error::AppError,
        favorites::FavoriteService,
        jobs::{CacheWorker, JobQueue},
        notifications::NotificationService,
        posts::PostService,
        repos::{
            CategoriesRepo, CategoriesWriteRepo, CommentsRepo, FavoritesRepo, NotificationsRepo,
            PostsRepo, PostsWriteRepo, TagsRepo, TagsWriteRepo, UsersRepo,
        },
        taxonomy::TaxonomyService,
        tokens::TokenCodec,
        users::UserService,
    },
    cache::{CacheStore, MemoryCacheStore, RedisCacheStore},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState},
        telemetry,
        uploads::AvatarStore,
    },
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    let store: Arc<dyn CacheStore> = match (settings.cache.enabled, settings.cache.url.as_ref()) {
        (true, Some(url)) => {
            let redis = RedisCacheStore::connect(url)
                .await
                .map_err(|err| InfraError::cache(err.to_string()))?;
            info!("redis cache connected");
            Arc::new(redis)
        }
        (true, None) => {
            warn!("cache enabled without a url, using the in-process store");
            Arc::new(MemoryCacheStore::new())
        }
        _ => {
            info!("cache disabled, using the in-process store");
            Arc::new(MemoryCacheStore::new())
        }
    };

    let (jobs, job_rx) = JobQueue::new();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let worker = CacheWorker::new(
        job_rx,
        store.clone(),
        posts_write_repo,
        settings.cache.ttl_seconds,
        settings.cache.flush_threshold,
    );
    let worker_handle = tokio::spawn(worker.run());

    let api_state = build_api_state(&settings, repositories.clone(), store, jobs).await?;

    let result = serve_http(&settings, api_state, repositories).await;

    worker_handle.abort();
    let _ = worker_handle.await;

    result
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    init_repositories(&settings).await?;
    info!("migrations applied");
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, &settings.database)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn build_api_state(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
    store: Arc<dyn CacheStore>,
    jobs: JobQueue,
) -> Result<ApiState, AppError> {
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repositories.clone();
    let favorites_repo: Arc<dyn FavoritesRepo> = repositories.clone();
    let notifications_repo: Arc<dyn NotificationsRepo> = repositories.clone();
    let tags_repo: Arc<dyn TagsRepo> = repositories.clone();
    let tags_write_repo: Arc<dyn TagsWriteRepo> = repositories.clone();
    let categories_repo: Arc<dyn CategoriesRepo> = repositories.clone();
    let categories_write_repo: Arc<dyn CategoriesWriteRepo> = repositories.clone();

    let ttl = time::Duration::try_from(settings.auth.token_ttl)
        .map_err(|err| AppError::unexpected(format!("token ttl out of range: {err}")))?;
    let tokens = TokenCodec::new(settings.auth.token_secret.clone(), ttl);

    let auth = Arc::new(AuthService::new(users_repo.clone(), tokens.clone()));
    auth.ensure_default_admin(&AdminSeed {
        username: settings.auth.admin_username.clone(),
        email: settings.auth.admin_email.clone(),
        password: settings.auth.admin_password.clone(),
    })
    .await
    .map_err(AppError::Seed)?;

    let posts = Arc::new(PostService::new(
        posts_repo.clone(),
        posts_write_repo,
        store,
        jobs,
    ));
    let comments = Arc::new(CommentService::new(
        comments_repo.clone(),
        posts_repo.clone(),
        notifications_repo.clone(),
    ));
    let favorites = Arc::new(FavoriteService::new(favorites_repo, posts_repo.clone()));
    let notifications = Arc::new(NotificationService::new(notifications_repo));
    let taxonomy = Arc::new(TaxonomyService::new(
        tags_repo,
        tags_write_repo,
        categories_repo,
        categories_write_repo,
        posts_repo.clone(),
    ));
    let users = Arc::new(UserService::new(
        users_repo,
        posts_repo,
        comments_repo,
        tokens.clone(),
    ));

    let avatars = AvatarStore::new(&settings.uploads)
        .map_err(InfraError::from)
        .map_err(AppError::from)?;

    Ok(ApiState {
        auth,
        posts,
        comments,
        favorites,
        notifications,
        taxonomy,
        users,
        tokens,
        avatars: Arc::new(avatars),
        upload_limit: settings.uploads.max_request_bytes.get() as usize,
    })
}

async fn serve_http(
    settings: &config::Settings,
    api_state: ApiState,
    repositories: Arc<PostgresRepositories>,
) -> Result<(), AppError> {
    let cors = cors_layer(&settings.cors)?;

    let router = http::build_api_router(api_state)
        .merge(http::build_health_router(repositories))
        .nest_service(
            settings.uploads.public_base.as_str(),
            ServeDir::new(&settings.uploads.directory),
        )
        .layer(cors)
        .layer(axum_middleware::from_fn(http::set_request_context));

    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| {
            AppError::unexpected(format!("failed to bind {}: {err}", settings.server.addr))
        })?;

    info!(addr = %settings.server.addr, "http server listening");

    let grace = settings.server.graceful_shutdown;
    let (drained_tx, drained_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            wait_for_shutdown().await;
            let _ = drained_tx.send(());
        })
        .into_future();

    tokio::pin!(server);
    tokio::select! {
        result = &mut server => {
            result.map_err(|err| AppError::unexpected(format!("http server error: {err}")))?;
        }
        _ = async {
            let _ = drained_rx.await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                grace_secs = grace.as_secs(),
                "graceful shutdown period elapsed, dropping remaining connections"
            );
        }
    }

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for the shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received, draining connections");
}

fn cors_layer(cors: &config::CorsSettings) -> Result<CorsLayer, AppError> {
    let origin = cors.allowed_origin.parse::<HeaderValue>().map_err(|err| {
        AppError::unexpected(format!(
            "invalid CORS origin `{}`: {err}",
            cors.allowed_origin
        ))
    })?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true))
}
