//! Reconciles a received keyset onto `<keydir>/<user>.keys` (C8). Each
//! user's file is replaced with a `.tmp` write followed by a same-filesystem
//! rename, so a reader never observes a partially-written file. One user's
//! failure does not prevent the others from being reconciled.

use std::fs;
use std::io;
use std::path::Path;

use keys_protocol::Keyset;
use tracing::warn;

/// Per-user outcome of a single `reconcile` call, returned so the caller can
/// log and/or assert on exactly what changed.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub written: Vec<String>,
    pub removed: Vec<String>,
    pub errors: Vec<(String, io::Error)>,
}

impl ReconcileReport {
    fn empty_keyset() -> Self {
        Self::default()
    }
}

/// Applies `keyset` to `keydir`. An empty keyset is almost certainly a
/// misconfiguration or a projection bug rather than an intentional "remove
/// every key" push, so it is rejected with a warning and no filesystem
/// changes (spec.md §4.8 step 1, S7).
pub fn reconcile(keydir: &Path, keyset: &Keyset) -> ReconcileReport {
    if keyset.is_empty() {
        warn!(keydir = %keydir.display(), "refusing to reconcile an empty keyset");
        return ReconcileReport::empty_keyset();
    }

    let mut report = ReconcileReport::default();

    for entry in read_keys_files(keydir) {
        let Some(user) = entry.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if !keyset.contains_key(user) {
            match fs::remove_file(&entry) {
                Ok(()) => report.removed.push(user.to_owned()),
                Err(err) => {
                    warn!(user, error = %err, "failed to remove stale keys file");
                    report.errors.push((user.to_owned(), err));
                }
            }
        }
    }

    for (user, keys) in keyset {
        match write_user_keys(keydir, user, keys) {
            Ok(()) => report.written.push(user.clone()),
            Err(err) => {
                warn!(user, error = %err, "failed to write keys file");
                report.errors.push((user.clone(), err));
            }
        }
    }

    report
}

fn read_keys_files(keydir: &Path) -> Vec<std::path::PathBuf> {
    let Ok(entries) = fs::read_dir(keydir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("keys"))
        .collect()
}

fn write_user_keys(keydir: &Path, user: &str, keys: &std::collections::BTreeSet<String>) -> io::Result<()> {
    let final_path = keydir.join(format!("{user}.keys"));
    let tmp_path = keydir.join(format!("{user}.keys.tmp"));

    let mut body = keys.iter().cloned().collect::<Vec<_>>().join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    fs::write(&tmp_path, body)?;
    fs::rename(&tmp_path, &final_path)
}
