//! Provider reachability check - lists Gemini models with every configured key
//! Run with: cargo run --bin check_connection

use anyhow::{Context, Result};
use tracing::info;

use arch_gateway::core::config::mask_key;
use arch_gateway::services::gemini::GeminiTransport;
use arch_gateway::services::http_client::build_http_client;
use arch_gateway::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("arch_gateway=info")
        .with_target(false)
        .init();

    let config = Config::new().context("Failed to load configuration")?;
    let http_client = build_http_client(&config.limits)?;
    let transport = GeminiTransport::new(http_client, config.gemini_base_url(), None);

    info!("Testing connection to: {}", transport.base_url());

    if config.api_keys().is_empty() {
        eprintln!("GOOGLE_API_KEY is not set");
        std::process::exit(1);
    }

    let mut failures = 0;
    for (i, key) in config.api_keys().iter().enumerate() {
        println!("\n[Key {}] {}", i + 1, mask_key(key));
        match transport.list_models(key).await {
            Ok(models) => {
                println!("  Success! Found {} models.", models.len());
                for wanted in [&config.gemini.image_model, &config.gemini.vision_model] {
                    let listed = models
                        .iter()
                        .any(|name| name.trim_start_matches("models/") == wanted.as_str());
                    println!(
                        "  {} {}",
                        if listed { "✓" } else { "✗" },
                        wanted
                    );
                }
            }
            Err(e) => {
                failures += 1;
                println!("  Connection failed: {}", e);
            }
        }
    }

    if failures > 0 {
        eprintln!("\n{} of {} keys failed", failures, config.api_keys().len());
        std::process::exit(1);
    }

    Ok(())
}
