use std::sync::Arc;

use auth::SystemClock;
use identity_service::config::Config;
use identity_service::domain::account::authentication::AuthenticationService;
use identity_service::domain::account::errors::AuthError;
use identity_service::domain::account::models::RegisterAccount;
use identity_service::outbound::repositories::PostgresAccountRepository;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "identity_service=debug,bootstrap=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        service = "identity-service",
        version = env!("CARGO_PKG_VERSION"),
        "Bootstrap starting"
    );

    let config = Config::load()?;
    let settings = config.auth.validate()?;

    tracing::info!(
        database_url = %config.database.redacted_url(),
        token_ttl_seconds = settings.token_ttl().num_seconds(),
        clock_skew_seconds = settings.clock_skew().num_seconds(),
        "Configuration loaded"
    );

    let pg_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    tracing::info!(
        max_connections = config.database.max_connections,
        database = "postgresql",
        "Database connection pool created"
    );

    sqlx::migrate!("./migrations").run(&pg_pool).await?;
    tracing::info!(database = "postgresql", "Database migrations completed");

    let Some(bootstrap) = config.bootstrap else {
        tracing::info!("No bootstrap account configured");
        return Ok(());
    };

    let codec = Arc::new(settings.codec(Arc::new(SystemClock))?);
    let repository = Arc::new(PostgresAccountRepository::new(pg_pool));
    let authentication = AuthenticationService::new(repository, settings.authenticator(codec));

    let command = RegisterAccount::new(
        bootstrap.username,
        bootstrap.email,
        bootstrap.password,
        bootstrap.full_name,
    )?;
    let username = command.username.clone();

    match authentication.register_privileged(command).await {
        Ok(account) => tracing::info!(
            account_id = %account.id,
            username = %account.username,
            "Privileged account created"
        ),
        Err(AuthError::Conflict(reason)) => tracing::info!(
            username = %username,
            reason = %reason,
            "Privileged account already present, skipping"
        ),
        Err(e) => {
            tracing::error!(error = %e, "Bootstrap failed");
            return Err(e.into());
        }
    }

    Ok(())
}
