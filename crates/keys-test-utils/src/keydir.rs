// keydir: a scratch `<keydir>` for exercising the fetcher reconciler (C8)
// without a live server or fetcher daemon.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A temp directory standing in for a fetcher's keydir, plus assertion
/// helpers over its `.keys` files.
pub struct TempKeydir {
    dir: tempfile::TempDir,
}

impl TempKeydir {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Seeds `<user>.keys` with arbitrary pre-existing content, as if a
    /// previous reconciliation (or a stale file) had left it there.
    pub fn seed(&self, user: &str, lines: &[&str]) {
        fs::write(self.path().join(format!("{user}.keys")), lines.join("\n")).unwrap();
    }

    /// Every `<user>.keys` file currently present, mapped to its line list.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<String>> {
        let mut out = BTreeMap::new();
        for entry in fs::read_dir(self.path()).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("keys") {
                continue;
            }
            let user = path.file_stem().unwrap().to_string_lossy().into_owned();
            let text = fs::read_to_string(&path).unwrap();
            let lines = text.lines().map(str::to_owned).collect();
            out.insert(user, lines);
        }
        out
    }

    pub fn has_file(&self, user: &str) -> bool {
        self.path().join(format!("{user}.keys")).exists()
    }
}
