//! Managed host block inside an SSH client config file.
//!
//! The block sits between two fixed marker lines. It is always regenerated
//! whole and moved to the top of the file; everything outside the markers
//! belongs to the user and is kept verbatim (modulo surrounding whitespace).

use crate::config::HostEntry;
use crate::fs::atomic::write_atomic;
use crate::utils::errors::{IoResultExt, Result};
use std::io;
use std::path::Path;

pub const BLOCK_START: &str = "# >>> ssh-vault managed git hosts >>>";
pub const BLOCK_END: &str = "# <<< ssh-vault managed git hosts <<<";

/// Markers written by the earlier scry tooling. Configs restored from its
/// blobs still carry them, so they are stripped like our own.
pub const LEGACY_BLOCK_START: &str = "# >>> scry managed git hosts >>>";
pub const LEGACY_BLOCK_END: &str = "# <<< scry managed git hosts <<<";

const MARKERS: [(&str, &str); 2] = [
    (BLOCK_START, BLOCK_END),
    (LEGACY_BLOCK_START, LEGACY_BLOCK_END),
];

/// Render the full managed block, markers included, ending in a newline.
pub fn render_block(hosts: &[HostEntry]) -> String {
    let mut lines = vec![BLOCK_START.to_string()];
    for (index, host) in hosts.iter().enumerate() {
        if index > 0 {
            lines.push(String::new());
        }
        lines.push(format!("Host {}", host.alias));
        lines.push(format!("  HostName {}", host.hostname));
        lines.push(format!("  User {}", host.user));
        lines.push(format!("  IdentityFile {}", host.identity_file));
        lines.push("  IdentitiesOnly yes".to_string());
    }
    lines.push(BLOCK_END.to_string());
    lines.push(String::new());
    lines.join("\n")
}

/// Remove every complete managed block, current or legacy, along with the
/// newline right after it.
///
/// A start marker without a matching end marker is left alone.
fn strip_managed(text: &str) -> String {
    let mut rest = text.to_string();
    for (block_start, block_end) in MARKERS {
        let mut from = 0;
        while let Some(found) = rest[from..].find(block_start) {
            let start = from + found;
            let Some(end_offset) = rest[start..].find(block_end) else {
                break;
            };
            let mut end = start + end_offset + block_end.len();
            if rest[end..].starts_with('\n') {
                end += 1;
            }
            rest.replace_range(start..end, "");
            from = start;
        }
    }
    rest
}

/// Compute the new config text for `existing` (already LF-normalized).
pub fn merge(existing: &str, hosts: &[HostEntry]) -> String {
    let block = render_block(hosts);
    let stripped = strip_managed(existing);
    let remainder = stripped.trim();

    if remainder.is_empty() {
        block
    } else {
        format!("{block}\n{remainder}\n")
    }
}

/// Rewrite the managed block in the config file at `path`.
///
/// Returns `false` without touching the file when it is already up to date.
pub fn apply(path: &Path, hosts: &[HostEntry]) -> Result<bool> {
    let existing = match std::fs::read_to_string(path) {
        Ok(text) => text.replace("\r\n", "\n"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).at(path),
    };

    let next = merge(&existing, hosts);
    if next == existing {
        tracing::debug!("Managed host block in {} already current", path.display());
        return Ok(false);
    }

    write_atomic(path, next.as_bytes(), 0o600)?;
    Ok(true)
}
