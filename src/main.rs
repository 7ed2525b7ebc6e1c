use std::sync::Arc;

use fit_coach::config::AppConfig;
use fit_coach::llm::create_provider;
use fit_coach::onboarding::{OnboardingManager, OnboardingRouteState, onboarding_routes};
use fit_coach::plans::{PlanManager, PlanRouteState, plan_routes};
use fit_coach::store::{Database, LibSqlBackend};
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export GROQ_API_KEY=gsk_...");
        std::process::exit(1);
    });

    eprintln!("🏋️ Fit Coach v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({:?})", config.llm.model, config.llm.backend);
    eprintln!("   Onboarding API: http://0.0.0.0:{}/api/onboarding", config.port);
    eprintln!("   Plans API: http://0.0.0.0:{}/api/plans/{{workout,diet}}", config.port);

    let llm = create_provider(&config.llm)?;

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}\n", config.db_path.display());

    // ── HTTP API ─────────────────────────────────────────────────────────
    let onboarding = Arc::new(OnboardingManager::new(Arc::clone(&db), Arc::clone(&llm)));
    let plans = Arc::new(PlanManager::new(db, llm));
    let app = onboarding_routes(OnboardingRouteState {
        manager: onboarding,
    })
    .merge(plan_routes(PlanRouteState { manager: plans }))
    .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Fit Coach server started");
    axum::serve(listener, app).await?;

    Ok(())
}
