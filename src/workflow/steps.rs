//! The five upgrade steps, each gated on the previous response

use crate::classify;
use crate::config::{NoAppPolicy, UpgradeConfig};
use crate::result::{CommandResult, DriverError};
use crate::session::{DeviceChannel, WaitPolicy};
use tracing::{debug, info, warn};

/// App-hosting status listing
pub const LIST_APPS_COMMAND: &str = "show app-hosting list";

/// Suppress flash confirmation prompts
pub const QUIET_FILE_PROMPTS_COMMAND: &str = "file prompt quiet";

/// `dir <path>`
pub fn dir_command(destination: &str) -> String {
    format!("dir {}", destination)
}

/// `mkdir <path>`
pub fn mkdir_command(destination: &str) -> String {
    format!("mkdir {}", destination)
}

/// `copy <url> <path>`
pub fn copy_command(url: &str, destination: &str) -> String {
    format!("copy {} {}", url, destination)
}

/// `app-hosting upgrade appid <id> package <file>`
pub fn upgrade_command(app_id: &str, package_path: &str) -> String {
    format!("app-hosting upgrade appid {} package {}", app_id, package_path)
}

/// Step 1: find the running application id.
///
/// `None` means the device should be skipped.
pub async fn discover_app_id<C: DeviceChannel>(
    channel: &mut C,
    config: &UpgradeConfig,
) -> Result<Option<String>, DriverError> {
    let listing = channel.issue(LIST_APPS_COMMAND, WaitPolicy::Prompt).await?;

    if let Some(app_id) = classify::running_app_id(&listing.output) {
        info!(app_id = %app_id, "found running application");
        return Ok(Some(app_id));
    }

    match &config.no_app_policy {
        NoAppPolicy::Skip => {
            info!("no running application");
            Ok(None)
        }
        NoAppPolicy::Fallback(app_id) => {
            warn!(app_id = %app_id, "no running application, using fallback id");
            Ok(Some(app_id.clone()))
        }
    }
}

/// Step 2: create the destination directory if the listing says it is missing.
///
/// Returns whether `mkdir` was issued.
pub async fn ensure_destination<C: DeviceChannel>(
    channel: &mut C,
    config: &UpgradeConfig,
) -> Result<bool, DriverError> {
    let destination = config.destination.as_str();
    let listing = channel
        .issue(&dir_command(destination), WaitPolicy::Prompt)
        .await?;

    if !classify::directory_missing(&listing.output, &config.markers) {
        debug!(destination, "destination exists");
        return Ok(false);
    }

    info!(destination, "creating destination directory");
    let created = channel
        .issue(&mkdir_command(destination), WaitPolicy::Delay(config.command_delay()))
        .await?;

    if classify::mkdir_needs_confirmation(&created.output, destination, &config.markers) {
        debug!("confirming mkdir");
        channel
            .issue("", WaitPolicy::Delay(config.command_delay()))
            .await?;
    }

    Ok(true)
}

/// Step 3: whether the package URL is usable (not rewritten by a link gateway).
pub fn source_is_clean(config: &UpgradeConfig) -> bool {
    !classify::obfuscated_source(&config.package_url, &config.markers)
}

/// Step 4: copy the package, answering the destination-filename and
/// overwrite/confirm sub-prompts at most once each, in that order.
///
/// Returns the accumulated transcript of the exchange.
pub async fn transfer_package<C: DeviceChannel>(
    channel: &mut C,
    config: &UpgradeConfig,
) -> Result<CommandResult, DriverError> {
    if config.quiet_file_prompts {
        channel
            .issue(QUIET_FILE_PROMPTS_COMMAND, WaitPolicy::Prompt)
            .await?;
    }

    let command = copy_command(&config.package_url, &config.destination);
    info!(url = %config.package_url, destination = %config.destination, "copying package");
    let response = channel
        .issue(&command, WaitPolicy::Delay(config.transfer_delay()))
        .await?;
    let mut transcript = response.output;

    if classify::asks_destination_filename(&transcript, &config.markers) {
        debug!("accepting default destination filename");
        let reply = channel
            .issue("", WaitPolicy::Delay(config.command_delay()))
            .await?;
        transcript.push_str(&reply.output);
    }

    if classify::asks_overwrite_confirm(&transcript, &config.markers) {
        debug!("confirming overwrite");
        let reply = channel
            .issue("", WaitPolicy::Delay(config.transfer_delay()))
            .await?;
        transcript.push_str(&reply.output);
    }

    let tail = channel.settle(config.transfer_timeout()).await?;
    transcript.push_str(&tail.output);

    Ok(CommandResult::new(command, transcript))
}

/// Step 5: run the upgrade and hand back the response verbatim.
pub async fn invoke_upgrade<C: DeviceChannel>(
    channel: &mut C,
    config: &UpgradeConfig,
    app_id: &str,
) -> Result<CommandResult, DriverError> {
    let package_path = config.package_path().ok_or_else(|| {
        DriverError::Config(format!("package_url has no file name: {}", config.package_url))
    })?;
    info!(app_id, package = %package_path, "upgrading application");
    channel
        .issue(&upgrade_command(app_id, &package_path), WaitPolicy::Prompt)
        .await
}
