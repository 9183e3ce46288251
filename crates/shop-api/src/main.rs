//! # bookcart
//!
//! Bookstore backend: catalog, cart, promotions, password reset and
//! Stripe checkout.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export STRIPE_SECRET_KEY=sk_test_...
//! export STRIPE_WEBHOOK_SECRET=whsec_...
//! export CATALOG_PATH=config/catalog.toml
//!
//! # Run the server
//! bookcart
//! ```

use shop_api::{routes, state::AppState};
use shop_stripe::REQUIRED_WEBHOOK_EVENTS;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    print_banner();

    let state = AppState::from_env().await?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Currency: {}", state.config.currency);
    info!(
        "Payment provider: {} (webhook {})",
        state.payment.provider_name(),
        state.payment.webhook_path()
    );
    info!("Webhook events to enable: {}", REQUIRED_WEBHOOK_EVENTS.join(", "));

    let app = routes::create_router(state);

    info!("📚 bookcart starting on http://{}", addr);

    if !is_prod {
        info!("🩺 Health: http://{}/health", addr);
        info!("🛒 Cart: http://{}/api/customer/cart", addr);
        info!("🔔 Webhook: POST http://{}/webhook/stripe", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// `LOG_FORMAT=json` switches to structured output
fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

fn print_banner() {
    println!(
        r#"
  📚 bookcart 📚
  ━━━━━━━━━━━━━━━━━━━━━━━
  Bookstore backend
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}
