use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use guestbook::config;
use guestbook::parameters::{self, display_value, ConfigSource};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Resolve every guestbook parameter and report which ones are missing"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let params = cfg.parameter_source();

    println!("Checking parameters...\n");
    let db_ok = check_group(&params, "Database", &parameters::DATABASE_KEYS).await;
    let notify_ok = check_group(&params, "Queue and email", &parameters::NOTIFICATION_KEYS).await;

    let total = parameters::DATABASE_KEYS.len() + parameters::NOTIFICATION_KEYS.len();
    let resolved = db_ok + notify_ok;
    println!("\nResults: {resolved}/{total} parameters resolved");
    if resolved < total {
        bail!("{} parameter(s) could not be resolved", total - resolved);
    }
    println!("All parameters resolved.");
    Ok(())
}

/// Print one line per key and a group verdict. Returns how many resolved.
async fn check_group(params: &dyn ConfigSource, label: &str, keys: &[&str]) -> usize {
    println!("{label}:");
    let mut ok = 0;
    for key in keys {
        match params.resolve(key).await {
            Ok(value) => {
                println!("  ok      {key}: {}", display_value(key, &value));
                ok += 1;
            }
            Err(err) => println!("  FAILED  {key}: {}", err.reason),
        }
    }
    if ok == keys.len() {
        println!("  {label} configuration complete");
    } else {
        println!("  {label} configuration incomplete");
    }
    ok
}
