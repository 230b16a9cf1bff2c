use std::{process, sync::Arc, time::Duration};

use scholia::{
    application::{
        error::AppError,
        featured::FeaturedArticleService,
        flags::FlagService,
        repos::{ArticlesRepo, FeaturedArticlesRepo, FlagsRepo, PermissionChecker, SearchIndex},
        syndication::ArticleFeedService,
        taxonomy::TaxonomyService,
    },
    cache::{CacheConfig, FeedStore},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AdminState, HttpState},
        search::SolrSearchIndex,
        telemetry,
    },
};
use tokio::{sync::watch, try_join};
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
        config::Command::Categories(args) => run_categories(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let search: Arc<dyn SearchIndex> = Arc::new(
        SolrSearchIndex::new(settings.search.clone()).map_err(AppError::from)?,
    );
    let cache_config = CacheConfig::from(&settings.cache);

    let overrides: Arc<dyn FeaturedArticlesRepo> = repositories.clone();
    let permissions: Arc<dyn PermissionChecker> = repositories.clone();
    let flags_repo: Arc<dyn FlagsRepo> = repositories.clone();
    let articles: Arc<dyn ArticlesRepo> = repositories.clone();

    let taxonomy = Arc::new(TaxonomyService::from_config(
        Arc::clone(&search),
        &cache_config,
    ));
    let featured = Arc::new(FeaturedArticleService::new(
        overrides,
        Arc::clone(&search),
        permissions,
    ));
    let flags = Arc::new(FlagService::new(flags_repo));
    let feed_store = cache_config
        .feed_enabled
        .then(|| {
            Arc::new(FeedStore::new(
                cache_config.feed_limit_non_zero(),
                cache_config.feed_ttl(),
            ))
        });
    let feeds = Arc::new(ArticleFeedService::new(
        articles,
        feed_store,
        settings.feed.clone(),
    ));

    let http_state = HttpState {
        taxonomy,
        featured: Arc::clone(&featured),
        flags,
        feeds,
        db: Arc::clone(&repositories),
    };
    let admin_state = AdminState {
        featured,
        db: repositories,
    };

    serve_http(&settings, http_state, admin_state).await
}

async fn run_categories(
    settings: config::Settings,
    args: config::CategoriesArgs,
) -> Result<(), AppError> {
    let search: Arc<dyn SearchIndex> =
        Arc::new(SolrSearchIndex::new(settings.search).map_err(AppError::from)?);
    let taxonomy = TaxonomyService::new(search, None, Duration::ZERO);

    let tree = taxonomy
        .top_and_second_level_categories(args.journal.as_deref())
        .await?;
    let rendered = serde_json::to_string_pretty(tree.as_ref())
        .map_err(|err| AppError::unexpected(format!("failed to encode categories: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn serve_http(
    settings: &config::Settings,
    http_state: HttpState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_router(http_state);
    let admin_router = http::build_admin_router(admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "scholia::serve",
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "listeners bound"
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(wait_for_stop(stop_rx.clone()));
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(wait_for_stop(stop_rx));

    let servers = async { try_join!(public_server, admin_server).map(|_| ()) };
    tokio::pin!(servers);

    tokio::select! {
        result = &mut servers => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = shutdown_signal() => {
            info!(target = "scholia::serve", "shutdown requested, draining connections");
            let _ = stop_tx.send(true);
            match tokio::time::timeout(settings.server.graceful_shutdown, &mut servers).await {
                Ok(result) => {
                    result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
                }
                Err(_) => warn!(
                    target = "scholia::serve",
                    timeout_secs = settings.server.graceful_shutdown.as_secs(),
                    "graceful shutdown timed out"
                ),
            }
        }
    }

    Ok(())
}

async fn wait_for_stop(mut stop: watch::Receiver<bool>) {
    while !*stop.borrow() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target = "scholia::serve", error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
