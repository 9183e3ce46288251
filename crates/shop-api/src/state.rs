//! # Application State
//!
//! Shared state for the Axum application: configuration plus one instance of
//! each workflow service, all sharing a single store.

use anyhow::Context;
use chrono::Duration as ChronoDuration;
use shop_core::{
    AccountService, BoxedEmailSender, BoxedIdentityProvider, BoxedPaymentStrategy, CartLedger,
    CatalogSeed, CheckoutOrchestrator, CheckoutUrls, Currency, InMemoryDirectory, MemoryOutbox,
    MemoryStore, OtpAuthority, OtpPolicy, Storefront,
};
use shop_stripe::StripeCheckoutStrategy;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Store backing every service
pub type ShopStore = MemoryStore;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Base URL for links and payment redirects
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    pub currency: Currency,
    /// Catalog seed file; the usual locations are searched when unset
    pub catalog_path: Option<String>,
    /// Deadline for every storage, email, identity and payment call
    pub external_call_timeout: Duration,
    pub otp_policy: OtpPolicy,
}

/// Parse `raw` when present; a value that does not parse is an error, not the default
fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {value:?}")),
        None => Ok(default),
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_or(key, env::var(key).ok(), default)
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let currency = match env::var("SHOP_CURRENCY") {
            Ok(code) => code.parse::<Currency>()?,
            Err(_) => Currency::default(),
        };

        let defaults = OtpPolicy::default();
        let otp_policy = OtpPolicy {
            max_per_window: env_or("OTP_MAX_PER_WINDOW", defaults.max_per_window)?,
            window: ChronoDuration::hours(env_or("OTP_WINDOW_HOURS", 24)?),
            ttl: ChronoDuration::hours(env_or("OTP_TTL_HOURS", 24)?),
            max_failed_attempts: env_or("OTP_MAX_FAILED_ATTEMPTS", defaults.max_failed_attempts)?,
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_or("PORT", 8080)?,
            base_url: env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            currency,
            catalog_path: env::var("CATALOG_PATH").ok(),
            external_call_timeout: Duration::from_secs(env_or("EXTERNAL_CALL_TIMEOUT_SECS", 30)?),
            otp_policy,
        })
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            environment: "development".to_string(),
            currency: Currency::default(),
            catalog_path: None,
            external_call_timeout: Duration::from_secs(30),
            otp_policy: OtpPolicy::default(),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub accounts: AccountService,
    pub cart: CartLedger<ShopStore>,
    pub otp: OtpAuthority<ShopStore>,
    pub checkout: CheckoutOrchestrator<ShopStore>,
    pub storefront: Storefront<ShopStore>,
    /// Verifies inbound payment webhooks
    pub payment: BoxedPaymentStrategy,
}

impl AppState {
    /// Wire the services around explicit collaborators
    pub fn with_parts(
        config: AppConfig,
        store: ShopStore,
        identity: BoxedIdentityProvider,
        email: BoxedEmailSender,
        payment: BoxedPaymentStrategy,
    ) -> Self {
        let timeout = config.external_call_timeout;
        let currency = config.currency;

        Self {
            accounts: AccountService::new(
                identity.clone(),
                email.clone(),
                config.base_url.clone(),
                timeout,
            ),
            cart: CartLedger::new(store.clone(), currency, timeout),
            otp: OtpAuthority::new(
                store.clone(),
                identity.clone(),
                email,
                config.otp_policy.clone(),
                timeout,
            ),
            checkout: CheckoutOrchestrator::new(
                store.clone(),
                identity,
                payment.clone(),
                CheckoutUrls::new(&config.base_url),
                currency,
                timeout,
            ),
            storefront: Storefront::new(store, timeout),
            payment,
            config,
        }
    }

    /// Production wiring: Stripe from the environment, in-memory store,
    /// directory and outbox, catalog seeded from TOML
    pub async fn from_env() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let stripe = StripeCheckoutStrategy::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize Stripe: {}", e))?;

        let store = ShopStore::new();
        load_catalog(&store, &config).await?;

        Ok(Self::with_parts(
            config,
            store,
            Arc::new(InMemoryDirectory::new()),
            Arc::new(MemoryOutbox::new()),
            Arc::new(stripe),
        ))
    }
}

/// Seed the store from the catalog TOML file
async fn load_catalog(store: &ShopStore, config: &AppConfig) -> anyhow::Result<()> {
    let candidates: Vec<String> = match &config.catalog_path {
        Some(path) => vec![path.clone()],
        None => [
            "config/catalog.toml",
            "../config/catalog.toml",
            "../../config/catalog.toml",
        ]
        .iter()
        .map(|p| p.to_string())
        .collect(),
    };

    for path in &candidates {
        let Ok(content) = tokio::fs::read_to_string(path).await else {
            continue;
        };
        let seed = CatalogSeed::from_toml(&content)
            .with_context(|| format!("Failed to parse {path}"))?;
        let summary = seed.install(store, config.currency).await?;
        info!(
            path = %path,
            categories = summary.categories,
            books = summary.books,
            promotions = summary.promotions,
            "catalog loaded"
        );
        return Ok(());
    }

    if config.catalog_path.is_some() {
        anyhow::bail!("catalog file not found: {}", candidates.join(", "));
    }
    warn!("No catalog found, starting with an empty store");
    Ok(())
}
