//! cshield - run the endpoint race from the command line
//!
//! Bootstraps the (optional) local proxy bridge, opens one race
//! generation and reports the winning endpoint, printing every status
//! transition along the way. Doubles as an operator smoke test for a
//! deployment's source URLs.

use anyhow::Context;
use clap::Parser;
use cloud_shield::{
    cli::Cli, FileDomainStore, ProxyEndpoint, Shield, ShieldError, ShieldStatus, StaticBridge,
};
use colored::Colorize;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<ShieldError>()
            .map(ShieldError::exit_code)
            .unwrap_or(1);
        process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let use_color = !cli.no_color;
    let config = cli.to_config();
    config.validate().context("invalid configuration")?;

    if cli.debug {
        println!("cloud-shield v{}", cloud_shield::VERSION);
        println!("  Static list URL: {}", config.static_list_url);
        println!("  Site-query URL:  {}", config.site_query_url);
        println!("  Default domains: {}", config.default_domains.join(", "));
        println!("  Timeout:         {}s", config.timeout_seconds);
        println!();
    }

    let bridge = match &cli.local_endpoint {
        Some(spec) => {
            let endpoint = parse_endpoint(spec)?;
            Arc::new(StaticBridge::with_endpoint(endpoint))
        }
        None => Arc::new(StaticBridge::unavailable()),
    };

    let store_path = cli
        .store_path
        .clone()
        .unwrap_or_else(FileDomainStore::default_path);
    let store = Arc::new(FileDomainStore::new(store_path));

    let shield = Shield::new(config, bridge, store).context("failed to construct shield")?;

    // Print transitions as they happen
    let mut status_rx = shield.subscribe_status();
    let printer = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = *status_rx.borrow();
            print_status(status, use_color);
            if status.is_terminal() {
                break;
            }
        }
    });

    shield.start().await;
    shield.start_speed_test();

    let terminal = tokio::time::timeout(Duration::from_secs(60), shield.wait_for_terminal())
        .await
        .map_err(|_| anyhow::anyhow!("race did not finish within 60 seconds"))?;
    let _ = printer.await;

    match terminal {
        ShieldStatus::DomainSpeedTestSuccess => {
            let winner = shield
                .active_base_url(None)
                .expect("success state implies a winner");
            if use_color {
                println!("\n{} {}", "winner:".green().bold(), winner);
            } else {
                println!("\nwinner: {}", winner);
            }
            if shield.is_primary_line() {
                println!("serving on the primary line");
            }
            Ok(())
        }
        _ => Err(ShieldError::AllCandidatesExhausted.into()),
    }
}

fn parse_endpoint(spec: &str) -> anyhow::Result<ProxyEndpoint> {
    let (ip, port) = spec
        .rsplit_once(':')
        .context("local endpoint must be ip:port")?;
    let port: u16 = port.parse().context("invalid local endpoint port")?;
    Ok(ProxyEndpoint::new(ip, port))
}

fn print_status(status: ShieldStatus, use_color: bool) {
    if !use_color {
        println!("status: {}", status);
        return;
    }
    let rendered = match status {
        ShieldStatus::DomainSpeedTestSuccess => status.as_str().green(),
        ShieldStatus::DomainSpeedTestFailure
        | ShieldStatus::InitializeFailure
        | ShieldStatus::LocalServiceFailure => status.as_str().red(),
        _ => status.as_str().cyan(),
    };
    println!("status: {}", rendered);
}
