//! Upgrade a single device, walking the workflow steps by hand
//!
//! Usage: cargo run --example upgrade_one_device -- <address> <username> <password> <package-url>

use apphost_upgrade::workflow::steps;
use apphost_upgrade::{Credentials, DeviceChannel, DeviceTarget, Session, UpgradeConfig};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [address, username, password, url] = args.as_slice() else {
        eprintln!("usage: upgrade_one_device <address> <username> <password> <package-url>");
        std::process::exit(2);
    };

    println!("apphost-upgrade - single device");
    println!("{}", "=".repeat(50));

    let config = UpgradeConfig::new(url.as_str());
    config.validate()?;
    let target = DeviceTarget::new(address.as_str(), Credentials::new(username.as_str(), password.as_str()));

    // Step 1: log in
    println!("\n[1] Connecting to {}...", target.address);
    let mut session = Session::builder()
        .timeout(Duration::from_secs(60))
        .login_timeout(Duration::from_secs(30))
        .open(&target)
        .await?;
    println!("   ✓ Logged in");

    // Step 2: running application
    println!("[2] Looking for the running application...");
    let Some(app_id) = steps::discover_app_id(&mut session, &config).await? else {
        println!("   - Nothing running, skipping");
        session.close().await?;
        return Ok(());
    };
    println!("   ✓ Found {}", app_id);

    // Step 3: destination directory
    println!("[3] Checking {}...", config.destination);
    if steps::ensure_destination(&mut session, &config).await? {
        println!("   ✓ Created");
    }

    // Step 4: package transfer
    if !steps::source_is_clean(&config) {
        eprintln!("   ✗ Package URL looks rewritten by a link gateway");
        session.close().await?;
        return Err("obfuscated package URL".into());
    }
    println!("[4] Copying {}...", url);
    steps::transfer_package(&mut session, &config).await?;
    println!("   ✓ Transfer finished");

    // Step 5: upgrade
    println!("[5] Upgrading {}...", app_id);
    let response = steps::invoke_upgrade(&mut session, &config, &app_id).await?;
    for line in response.lines() {
        println!("   {}", line.trim_end());
    }

    session.close().await?;
    println!("\n✓ Done");
    Ok(())
}
