use budget_engine::{
    config::{database, settings},
    core::{account, spending, time, transaction},
    errors::Result,
    jobs::pull_transactions::PullTransactionsArguments,
};
use chrono::Utc;
use dotenvy::dotenv;
use std::env;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Load .env file (as early as possible)
    let dotenv_loaded = dotenv().is_ok(); // Non-fatal, env vars can be set externally

    // 2. Load settings; the log filter lives there
    let config_path = env::var("BUDGET_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let settings = settings::load_settings(&config_path)?;

    // 3. Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.logging.filter)),
        )
        .init();
    info!(dotenv_loaded, config = %config_path, "Loaded configuration.");

    // 4. Initialize database
    let db = database::create_connection(&settings.database.url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    // 5. Bring every bucket's schedule up to date
    let now = Utc::now();
    let summary = spending::refresh_all_schedules(&db, now)
        .await
        .inspect_err(|e| error!("Failed to refresh spending schedules: {}", e))?;
    info!(?summary, "Scheduled refresh complete.");

    // 6. Emit the pull jobs the queue should run next
    for account in account::list_accounts(&db).await? {
        let tz = time::parse_timezone(&account.timezone)?;
        let today = time::local_today(now, tz);
        for link in account::external_links_for_account(&db, account.id).await? {
            // A link that has never been pulled gets its history first.
            let args = if transaction::link_has_transactions(&db, link.id).await? {
                PullTransactionsArguments::lookback(
                    account.id,
                    link.id,
                    today,
                    settings.sync.lookback_days,
                )
            } else {
                PullTransactionsArguments::historical(account.id, link.id, today)
            };
            info!(payload = %serde_json::to_string(&args)?, "Pull transactions job due.");
        }
    }

    Ok(())
}
