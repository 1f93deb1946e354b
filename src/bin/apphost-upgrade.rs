//! CLI tool for upgrading app-hosting applications across a list of devices.

use anyhow::{bail, Context, Result};
use apphost_upgrade::{
    load_device_list, run_all, targets_from, Credentials, NoAppPolicy, OutcomeSummary, Session,
    SshConnector, UpgradeConfig, UpgradeStatus,
};
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "apphost-upgrade")]
#[command(author, version, about = "Upgrade app-hosting applications on IOS devices", long_about = None)]
struct Args {
    /// File with one device address per line
    devices: PathBuf,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Package URL (overrides config)
    #[arg(long)]
    url: Option<String>,

    /// Flash destination directory (overrides config)
    #[arg(long)]
    destination: Option<String>,

    /// Upgrade this app id when none is RUNNING instead of skipping
    #[arg(long)]
    fallback_app_id: Option<String>,

    /// Issue `file prompt quiet` before copying
    #[arg(long)]
    quiet_file_prompts: bool,

    /// Login username (prompted when omitted)
    #[arg(short, long)]
    username: Option<String>,

    /// SSH port
    #[arg(short, long, default_value_t = 22)]
    port: u16,

    /// Extra ssh `-o` option, repeatable
    #[arg(short = 'o', long = "ssh-option")]
    ssh_options: Vec<String>,

    /// Prompt wait timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Print the upgrade command response for each upgraded device
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = build_config(&args)?;

    let addresses = load_device_list(&args.devices)
        .with_context(|| format!("reading device list {}", args.devices.display()))?;
    if addresses.is_empty() {
        bail!("no devices listed in {}", args.devices.display());
    }

    let credentials = prompt_credentials(args.username.as_deref())?;
    let targets = targets_from(&addresses, &credentials, args.port);

    let mut builder = Session::builder().timeout(Duration::from_secs(args.timeout));
    for option in &args.ssh_options {
        builder = builder.ssh_option(option.as_str());
    }
    let connector = SshConnector::new(builder);

    println!("Upgrading {} device(s) from {}", targets.len(), config.package_url);
    let outcomes = run_all(&connector, &targets, &config).await;

    println!("\nResults:");
    for outcome in &outcomes {
        let mark = match &outcome.status {
            UpgradeStatus::Upgraded { .. } => "✓",
            UpgradeStatus::Failed(_) => "✗",
            _ => "-",
        };
        println!("  {} {}", mark, outcome);
        if args.verbose {
            if let UpgradeStatus::Upgraded { response, .. } = &outcome.status {
                for line in response.lines() {
                    println!("      {}", line.trim_end());
                }
            }
        }
    }
    println!("\n{}", OutcomeSummary::of(&outcomes));

    Ok(())
}

/// Config file values, then command-line overrides.
fn build_config(args: &Args) -> Result<UpgradeConfig> {
    let mut config = match &args.config {
        Some(path) => UpgradeConfig::load(path)?,
        None => UpgradeConfig::default(),
    };

    if let Some(url) = &args.url {
        config.package_url = url.clone();
    }
    if let Some(destination) = &args.destination {
        config.destination = destination.clone();
    }
    if let Some(app_id) = &args.fallback_app_id {
        config.no_app_policy = NoAppPolicy::Fallback(app_id.clone());
    }
    if args.quiet_file_prompts {
        config.quiet_file_prompts = true;
    }

    config.validate()?;
    Ok(config)
}

fn prompt_credentials(username: Option<&str>) -> Result<Credentials> {
    let username = match username {
        Some(name) => name.to_string(),
        None => {
            print!("Username: ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line.trim().to_string()
        }
    };
    if username.is_empty() {
        bail!("username is required");
    }

    let password = rpassword::prompt_password(format!("Password for {}: ", username))
        .context("reading password")?;
    Ok(Credentials::new(username, password))
}
