//! Prompt optimization smoke test - runs sample ideas through the text provider
//! Run with: cargo run --bin optimize_samples -- [extra prompt ...]

use anyhow::{Context, Result};

use arch_gateway::services::http_client::build_http_client;
use arch_gateway::services::text::{ChatCompletionClient, PromptOptimizer};
use arch_gateway::Config;

const SAMPLES: &[&str] = &[
    "湖边的现代别墅，黄昏，极简主义",
    "一个像飞船一样的博物馆，停在沙漠里",
    "old brick factory converted into office, sunny day",
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("arch_gateway=debug")
        .with_target(false)
        .init();

    let config = Config::new().context("Failed to load configuration")?;
    let http_client = build_http_client(&config.limits)?;
    let chat = ChatCompletionClient::new(&config, http_client, None);
    let optimizer = PromptOptimizer::new(chat, config.limits.optimize_timeout);

    // Extra prompts from the command line replace the samples
    let args: Vec<String> = std::env::args().skip(1).collect();
    let inputs: Vec<&str> = if args.is_empty() {
        SAMPLES.to_vec()
    } else {
        args.iter().map(String::as_str).collect()
    };

    println!("----- Prompt Optimization ({}) -----", config.text.model);
    for input in inputs {
        println!("\n[Input]: {}", input);
        match optimizer.optimize(input).await {
            Ok(result) => println!("[Output]:\n{}", result),
            Err(e) => {
                println!("[Error]: {}", e);
                println!("Check QWEN_API_KEY and QWEN_API_BASE_URL in .env");
            }
        }
    }

    Ok(())
}
