//! Conflict naming for keep-both resolution
//!
//! Generates unique keys for conflict copies, following the pattern:
//! `name (conflicted copy YYYY-MM-DD XXXXXXXX).ext`

use chrono::Utc;
use uuid::Uuid;

use omnisync_core::domain::newtypes::ItemKey;

/// Generates a conflict copy key for a keep-both resolution.
///
/// Given `docs/report.txt`, produces something like
/// `docs/report (conflicted copy 2026-08-23 a1b2c3d4).txt`. The short
/// random suffix keeps repeated conflicts on the same key from colliding.
#[must_use]
pub fn conflict_copy_key(original: &ItemKey) -> ItemKey {
    let timestamp = Utc::now().format("%Y-%m-%d");
    let short_uuid = &Uuid::new_v4().to_string()[..8];
    let name = original.as_str();

    // Only the final path segment's extension counts; a dot in a parent
    // directory name must not be treated as one.
    let last_slash = name.rfind('/').map_or(0, |i| i + 1);
    let renamed = match name[last_slash..].rfind('.') {
        Some(rel_dot) => {
            let dot = last_slash + rel_dot;
            format!(
                "{} (conflicted copy {timestamp} {short_uuid}){}",
                &name[..dot],
                &name[dot..]
            )
        }
        None => format!("{name} (conflicted copy {timestamp} {short_uuid})"),
    };

    // The input key is non-empty, so the renamed key is too.
    ItemKey::new(renamed).unwrap_or_else(|_| original.clone())
}
