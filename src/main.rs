//! PAYDESK: client core of the exchange dashboard
//!
//! Entry point. Loads configuration, initialises structured logging,
//! reads the host init data from the environment, runs one bootstrap
//! cycle against the remote service and prints the resulting snapshot.
//! Optionally prices a sale with `PAYDESK_QUOTE=<method>:<amount>`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

use paydesk::account;
use paydesk::config::{self, AppConfig};
use paydesk::fees::catalog::PaymentMethodId;
use paydesk::fees::FeeCalculator;
use paydesk::gateway::http::HttpGateway;
use paydesk::identity::{Credential, HostIdentity};
use paydesk::sync::SyncController;
use paydesk::types::SyncState;

const BANNER: &str = r#"
 ____   _ __   ______  _____ ____  _  __
|  _ \ / \\ \ / /  _ \| ____/ ___|| |/ /
| |_) / _ \\ V /| | | |  _| \___ \| ' /
|  __/ ___ \| | | |_| | |___ ___) | . \
|_| /_/   \_\_| |____/|_____|____/|_|\_\

  Exchange dashboard client core v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("PAYDESK_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        session = %cfg.session.name,
        base_url = %cfg.gateway.base_url,
        currency = %cfg.session.currency,
        "PAYDESK starting up"
    );

    if let Ok(request) = std::env::var("PAYDESK_QUOTE") {
        print_quote(&request)?;
    }

    // -- Wire collaborators ----------------------------------------------

    let gateway = Arc::new(HttpGateway::new(&cfg.gateway.base_url, Some(cfg.request_timeout()))?);
    let identity = Arc::new(HostIdentity::pending());

    let controller = SyncController::start(cfg.sync_config(), identity.clone(), gateway.clone());

    // Host adapter: outside the chat host there is no init data and the
    // controller's fallback policy decides what happens.
    match AppConfig::resolve_env(&cfg.session.init_data_env)
        .ok()
        .and_then(Credential::new)
    {
        Some(credential) => identity.publish(credential),
        None => warn!(
            env = %cfg.session.init_data_env,
            "No host init data in environment; waiting for identity timeout"
        ),
    }

    // -- Bootstrap -------------------------------------------------------

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let state = tokio::select! {
        state = controller.wait_settled() => state,
        _ = &mut shutdown => {
            info!("Shutdown signal received.");
            controller.shutdown();
            return Ok(());
        }
    };

    match state {
        SyncState::Ready => {
            let snapshot = controller.snapshot();
            info!(
                balance = %snapshot.balance,
                stats = %snapshot.stats,
                transactions = snapshot.transactions.len(),
                vip_progress = %snapshot.stats.vip_progress_pct().round_dp(1),
                "Dashboard ready"
            );
            for tx in snapshot.transactions.iter().take(10) {
                println!("  {tx}");
            }
            match account::check_access(gateway.as_ref(), identity.as_ref()).await {
                Ok(status) => {
                    if let Some(code) = status.referral_code.as_deref() {
                        let link = account::referral_link(&cfg.session.bot_username, code);
                        info!(link = %link, custom = status.is_referral_custom, "Referral link");
                    }
                }
                Err(e) => warn!(error = %e, "Access status unavailable"),
            }
        }
        SyncState::TimedOutNoIdentity => {
            warn!("Cannot authenticate: open the dashboard inside the host app");
        }
        SyncState::Failed(e) => {
            error!(error = %e, "Bootstrap failed");
        }
        other => {
            warn!(state = %other, "Bootstrap ended in a non-terminal state");
        }
    }

    controller.shutdown();
    info!("PAYDESK shut down cleanly.");
    Ok(())
}

/// Price a sale given as `<method>:<amount>` and print the breakdown.
fn print_quote(request: &str) -> Result<()> {
    let (method, amount) = request
        .split_once(':')
        .with_context(|| format!("PAYDESK_QUOTE must be <method>:<amount>, got {request}"))?;
    let method: PaymentMethodId = method.parse()?;
    let amount: Decimal = amount
        .trim()
        .parse()
        .with_context(|| format!("Invalid quote amount: {amount}"))?;

    match FeeCalculator::default().compute(amount, method) {
        Ok(quote) => {
            let split = quote.distribution();
            println!("{quote}");
            println!(
                "  payout {:.1}% | fees {:.1}%",
                split.net_pct, split.fees_pct
            );
        }
        // Non-positive input yields no breakdown rather than an error.
        Err(e) => warn!(error = %e, "No quote"),
    }
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("paydesk=info"));

    let json_logging = std::env::var("PAYDESK_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
