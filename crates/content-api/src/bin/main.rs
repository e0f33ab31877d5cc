//! Content API entry point

use clap::Parser;
use content_api::{create_router, load_document, telemetry::init_tracing, Cli, Commands};
use openapi_guard::{RequestGuard, RequestValidator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Serve(args) => {
            let addr = args.addr()?;
            let document = load_document(args.spec.as_deref())?;
            let guard = RequestGuard::from_document(&document, args.guard_options())?;

            tracing::info!(
                title = %document.title(),
                version = %document.version(),
                operations = guard.validator().operation_count(),
                token_count = args.api_tokens.len(),
                "OpenAPI document compiled"
            );

            let router = create_router(guard);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::info!("Starting Content API on {}", addr);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            tracing::info!("Server stopped");
        }

        Commands::Check { spec } => {
            let document = load_document(spec.as_deref())?;
            let validator = RequestValidator::new(&document)?;

            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "title": document.title(),
                    "version": document.version(),
                    "operations": validator.operations(),
                }))?
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
