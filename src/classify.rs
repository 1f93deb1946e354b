//! Response classifiers
//!
//! Device responses are free text. Each question the workflow asks of a
//! response is a named predicate here, so classification can be tested
//! without a live session.

use crate::config::ResponseMarkers;
use regex::Regex;
use std::sync::LazyLock;

/// Marker that follows the app id on a running application's status line
pub const RUNNING_MARKER: &str = "RUNNING";

static RUNNING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\S+)\s+RUNNING\s*$").expect("running-line regex is valid")
});

/// Application id of the first RUNNING app in an app-hosting status listing.
///
/// A line qualifies when its first whitespace-delimited token is followed
/// only by the literal `RUNNING` marker:
///
/// ```
/// use apphost_upgrade::classify::running_app_id;
///
/// let listing = "App id          State\n-----------------------\nte              RUNNING\n";
/// assert_eq!(running_app_id(listing).as_deref(), Some("te"));
/// assert_eq!(running_app_id("te  DEPLOYED\n"), None);
/// ```
pub fn running_app_id(listing: &str) -> Option<String> {
    listing
        .lines()
        .find_map(|line| RUNNING_LINE.captures(line.trim_end_matches('\r')))
        .map(|caps| caps[1].to_string())
}

/// Whether `text` contains any marker (case-sensitive).
pub fn contains_any(text: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| !m.is_empty() && text.contains(m.as_str()))
}

/// Whether `text` contains any marker, ignoring ASCII case.
pub fn contains_any_ignore_case(text: &str, markers: &[String]) -> bool {
    let text = text.to_ascii_lowercase();
    markers
        .iter()
        .any(|m| !m.is_empty() && text.contains(&m.to_ascii_lowercase()))
}

/// A directory listing reported that the directory does not exist.
pub fn directory_missing(listing: &str, markers: &ResponseMarkers) -> bool {
    contains_any(listing, &markers.directory_missing)
}

/// A `mkdir` response is waiting for confirmation: either a bracketed echo of
/// the directory name (`Create directory filename [apps]?`) or a configured
/// marker such as `confirm`.
pub fn mkdir_needs_confirmation(response: &str, destination: &str, markers: &ResponseMarkers) -> bool {
    if let Some(name) = directory_name(destination) {
        if response.contains(&format!("[{}]", name)) {
            return true;
        }
    }
    response.contains(&format!("[{}]", destination)) || contains_any(response, &markers.mkdir_confirm)
}

/// The package URL looks rewritten by an email link-protection gateway.
pub fn obfuscated_source(url: &str, markers: &ResponseMarkers) -> bool {
    contains_any_ignore_case(url, &markers.obfuscation)
}

/// A copy response is asking for the destination filename.
pub fn asks_destination_filename(response: &str, markers: &ResponseMarkers) -> bool {
    contains_any(response, &markers.destination_filename)
}

/// A copy response is asking to confirm or overwrite.
pub fn asks_overwrite_confirm(response: &str, markers: &ResponseMarkers) -> bool {
    contains_any_ignore_case(response, &markers.overwrite_confirm)
}

/// Last component of a flash path: `bootflash:/apps/` -> `apps`.
fn directory_name(destination: &str) -> Option<&str> {
    let path = destination.rsplit_once(':').map_or(destination, |(_, p)| p);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
}
