use std::sync::Arc;

use anyhow::Context;
use hospital_crm::{
    build_app_filter, Auth, AuthConfig, Clinic, GeminiRouter, LogNotifier, Notifier, Settings,
    SpecialtyRouter, SqliteStore, TwilioNotifier,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env().context("refusing to start")?;

    let store = Arc::new(
        SqliteStore::open(&settings.database_path)
            .with_context(|| format!("opening database {}", settings.database_path.display()))?,
    );

    let mut auth_config = AuthConfig::new(settings.jwt_secret.clone(), store.clone());
    auth_config.auth_token_issuer = settings.jwt_issuer.clone();
    auth_config.distinct_login_errors = settings.distinct_login_errors;
    let auth = Auth::new(auth_config);

    let notifier: Arc<dyn Notifier> = match settings.twilio.clone() {
        Some(twilio) => Arc::new(TwilioNotifier::new(
            twilio.account_sid,
            twilio.auth_token,
            twilio.from_number,
        )),
        None => {
            warn!("Twilio credentials not set, appointment texts will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let router: Option<Arc<dyn SpecialtyRouter>> = match settings.llm.clone() {
        Some(llm) => Some(Arc::new(GeminiRouter::new(llm.api_key, &llm.model))),
        None => {
            warn!("LLM_API_KEY not set, AI triage is disabled");
            None
        }
    };

    let clinic = Clinic::new(store, notifier, router);
    let app = build_app_filter(&auth, &clinic);

    info!(addr = %settings.bind_addr, "hospital CRM listening");
    warp::serve(app).run(settings.bind_addr).await;

    Ok(())
}
