//! Service wiring: stores, collaborators and the application services.
//!
//! Built once at start-up and shared by every handler through an
//! `Extension<Arc<AppServices>>`.

use std::sync::Arc;

use anyhow::Context;

use formhub_auth::{Hs256JwtValidator, JwtValidator};
use formhub_infra::identity::{ExternalIdentityVerifier, GoogleTokenInfoVerifier};
use formhub_infra::mail::{LogMailer, Mailer};
use formhub_infra::services::{AccountService, FormService, SubmissionService};
use formhub_infra::store::{InMemoryStore, PostgresStore, Store};

use crate::config::AppConfig;

pub type SharedStore = Arc<dyn Store>;

pub struct AppServices {
    pub store: SharedStore,
    pub accounts: AccountService<SharedStore>,
    pub forms: FormService<SharedStore>,
    pub submissions: SubmissionService<SharedStore>,
    pub jwt: Arc<dyn JwtValidator>,
    /// Include internal error detail in responses (non-production only).
    pub expose_internal: bool,
}

impl AppServices {
    /// Wire services around an existing store and mailer.
    pub fn new(config: &AppConfig, store: SharedStore, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        let auth = config.auth();
        let identity: Option<Arc<dyn ExternalIdentityVerifier>> = match &config.google_client_id {
            Some(client_id) => Some(Arc::new(
                GoogleTokenInfoVerifier::new(client_id.clone()).context("external identity client")?,
            )),
            None => None,
        };

        Ok(Self {
            accounts: AccountService::new(
                store.clone(),
                auth.clone(),
                mailer,
                identity,
                config.frontend_url.clone(),
            ),
            forms: FormService::new(store.clone(), config.frontend_url.clone()),
            submissions: SubmissionService::new(store.clone()),
            jwt: Arc::new(Hs256JwtValidator::new(&auth)),
            expose_internal: !config.is_production(),
            store,
        })
    }

    /// Release injected resources: mail transport first, then the store.
    pub async fn shutdown(&self) {
        self.accounts.shutdown().await;
        self.store.close().await;
        tracing::info!("services shut down");
    }
}

/// Build services from configuration, connecting to Postgres when
/// persistent stores are enabled.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: SharedStore = match (config.use_persistent_stores, &config.database_url) {
        (true, Some(url)) => {
            let store = PostgresStore::connect(url, config.database_max_connections)
                .await
                .context("connect to postgres")?;
            store.migrate().await.context("apply schema")?;
            tracing::info!("using postgres stores");
            Arc::new(store)
        }
        (true, None) => anyhow::bail!("DATABASE_URL must be set when USE_PERSISTENT_STORES is enabled"),
        (false, _) => {
            tracing::info!("using in-memory stores");
            Arc::new(InMemoryStore::new())
        }
    };

    let mailer: Arc<dyn Mailer> = Arc::new(LogMailer::new(!config.is_production()));
    AppServices::new(config, store, mailer)
}
