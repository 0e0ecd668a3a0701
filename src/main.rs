use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use chatwire::api::middleware::{ApiKeySessionResolver, IdentityResolution, SessionResolver};
use chatwire::chat::{LlmTitleGenerator, ModelStreamSource, ProviderStreamSource, TitleGenerator};
use chatwire::cli::{
    commands::{Cli, Commands},
    run_cli,
};
use chatwire::config::AppConfig;
use chatwire::db::{self, ChatStore, DuckDbChatStore};
use chatwire::llm::ProviderFactory;
use chatwire::tools::ToolRegistry;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({"status": "healthy"}))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Serve) {
        if let Err(e) = run_cli(cli.command, &cli.config).await {
            error!("{}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    info!("Starting chatwire server...");

    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let db_pool = match db::get_connection(&config.database) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let llm_provider = match ProviderFactory::create_default(&config) {
        Some(p) => p,
        None => {
            error!("Failed to initialize LLM provider '{}'", config.llm.provider);
            std::process::exit(1);
        }
    };

    let store: Arc<dyn ChatStore> = Arc::new(DuckDbChatStore::new(db_pool));
    let tools = Arc::new(ToolRegistry::new(&config.tools));
    let source: Arc<dyn ModelStreamSource> = Arc::new(ProviderStreamSource::new(
        llm_provider.clone(),
        tools,
        config.chat.max_steps,
    ));
    let titles: Arc<dyn TitleGenerator> = Arc::new(LlmTitleGenerator::new(
        llm_provider.clone(),
        config.chat.title_model.clone(),
    ));
    let sessions: Arc<dyn SessionResolver> = Arc::new(ApiKeySessionResolver::new(&config.auth));

    let host = config.server.host.clone();
    let port = config.server.port;

    info!("Server listening on {}:{} using {}", host, port, llm_provider.name());

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(store.clone()))
            .app_data(web::Data::new(source.clone()))
            .app_data(web::Data::new(titles.clone()))
            .app_data(web::Data::new(sessions.clone()))
            .route("/health", web::get().to(health))
            .wrap(IdentityResolution)
            .configure(chatwire::api::routes::configure)
    })
    .bind((host, port))?
    .run()
    .await
}
