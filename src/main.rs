//! Ruler Server
//!
//! Run with: cargo run
//!
//! Configuration is read from `RULER_*` environment variables, see
//! [`ruler::config`]. Log filtering follows `RUST_LOG`
//! (default: `ruler=info,tower_http=info`).

use ruler::api::run_server;
use ruler::config::ServerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ruler=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    let ruler = &config.ruler;

    tracing::info!("Ruler configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Query URL: {}", ruler.query_url);
    tracing::info!("  Poll interval: {:?}", ruler.poll_interval);
    tracing::info!("  Evaluation timeout: {:?}", ruler.evaluation_timeout);
    tracing::info!("  Store timeout: {:?}", ruler.store_timeout);
    tracing::info!(
        "  Default limits: {} groups, {} rules per group",
        ruler.default_limits.max_rule_groups,
        ruler.default_limits.max_rules_per_group
    );
    if !ruler.tenant_limits.is_empty() {
        tracing::info!("  Tenant overrides: {}", ruler.tenant_limits.len());
    }

    if ruler.enable_federated_rules {
        tracing::info!("  Federation: ENABLED");
        for tenant in &ruler.allowed_federated_tenants {
            tracing::info!("    - {}", tenant);
        }
    } else {
        tracing::info!("  Federation: DISABLED");
    }

    println!(
        r#"
  ____        _
 |  _ \ _   _| | ___ _ __
 | |_) | | | | |/ _ \ '__|
 |  _ <| |_| | |  __/ |
 |_| \_\\__,_|_|\___|_|

 Multi-Tenant Rule Evaluation
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
