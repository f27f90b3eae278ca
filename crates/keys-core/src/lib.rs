// keys-core: the admin database model and the pure projection algorithm
// that turns it into per-host keysets. No networking, no signal handling,
// no file watching -- those live in the keyserver binary, which holds a
// `KeysetStore` wrapping a `Projection` built here.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use keys_protocol::{AdminDb, Domain, Host, Keyset, WILDCARD_HOST};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("failed to read admin db at {path}: {source}")]
    ReadDb {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse admin db at {path}: {source}")]
    ParseDb {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write admin db at {path}: {source}")]
    WriteDb {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A reason a key or domain was excluded while building a `Projection`.
/// Carried back to the caller instead of only logged so tests can assert
/// on it without scraping log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionWarning {
    pub key_name: String,
    pub reason: String,
}

impl std::fmt::Display for ProjectionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "key '{}': {}", self.key_name, self.reason)
    }
}

/// The flattened, per-host view of the admin database: what C5 actually
/// sends over the wire. `blobs` holds the pre-rendered canonical JSON for
/// each host (plus `"*"`) so a hot session never re-serializes on every
/// push -- only `KeysetStore::reload` pays that cost, once per reload.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    wild: Keyset,
    per_host: BTreeMap<String, Keyset>,
    blobs: BTreeMap<String, Vec<u8>>,
}

impl Projection {
    /// The rendered blob to send to `hostname`, falling back to the
    /// wildcard blob when `hostname` has no host-specific overrides.
    pub fn blob_for(&self, hostname: Option<&str>) -> &[u8] {
        match hostname {
            Some(h) if self.blobs.contains_key(h) => &self.blobs[h],
            _ => &self.blobs[WILDCARD_HOST],
        }
    }

    pub fn wild(&self) -> &Keyset {
        &self.wild
    }

    pub fn per_host(&self, host: &str) -> Option<&Keyset> {
        self.per_host.get(host)
    }
}

/// Resolves a `KeyRecord.data` value, following the `file!<path>`
/// indirection if present: a record may point at a file on disk instead
/// of embedding the key text, so one key file can back many records
/// without duplicating its content into the database.
pub fn resolve_key_data(data: &str) -> Result<String, std::io::Error> {
    match data.strip_prefix("file!") {
        Some(path) => Ok(fs::read_to_string(path)?.trim().to_owned()),
        None => Ok(data.to_owned()),
    }
}

/// Builds a `Projection` from the admin database. Total: a db with no
/// keys (or a missing keys map, which `serde(default)` already turns into
/// an empty map on load) yields a `Projection` whose only blob is an empty
/// `{}` at `"*"`. Keys and domains that fail validation are skipped with a
/// `ProjectionWarning`, never fatal -- other keys still load.
pub fn project(db: &AdminDb, validate: &dyn Fn(&str) -> bool) -> (Projection, Vec<ProjectionWarning>) {
    let mut wild: Keyset = BTreeMap::new();
    let mut per_host: BTreeMap<String, Keyset> = BTreeMap::new();
    let mut warnings = Vec::new();

    for (name, record) in &db.keys {
        let data = match resolve_key_data(&record.data) {
            Ok(data) => data,
            Err(err) => {
                warnings.push(ProjectionWarning {
                    key_name: name.clone(),
                    reason: format!("could not resolve key data: {err}"),
                });
                continue;
            }
        };

        if !validate(&data) {
            warnings.push(ProjectionWarning {
                key_name: name.clone(),
                reason: "key data failed validation".to_owned(),
            });
            continue;
        }

        for domain_str in &record.domains {
            let domain = match Domain::from_str(domain_str) {
                Ok(domain) => domain,
                Err(err) => {
                    warnings.push(ProjectionWarning {
                        key_name: name.clone(),
                        reason: format!("domain '{domain_str}': {err}"),
                    });
                    continue;
                }
            };

            let target = match domain.host {
                Host::Wildcard => &mut wild,
                Host::Named(ref host) => per_host.entry(host.clone()).or_default(),
            };
            target.entry(domain.user).or_default().insert(data.clone());
        }
    }

    let mut blobs: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    blobs.insert(
        WILDCARD_HOST.to_owned(),
        keys_protocol::render_keyset(&wild).unwrap_or_default(),
    );
    for (host, keyset) in &per_host {
        let mut merged = wild.clone();
        for (user, keys) in keyset {
            merged.entry(user.clone()).or_default().extend(keys.iter().cloned());
        }
        blobs.insert(
            host.clone(),
            keys_protocol::render_keyset(&merged).unwrap_or_default(),
        );
    }

    (
        Projection {
            wild,
            per_host,
            blobs,
        },
        warnings,
    )
}

/// Loads the admin database from `path`. A missing file is not an error at
/// this layer -- the caller (`KeysetStore::reload`) decides whether "no db
/// yet" should start the server with an empty projection or abort.
pub fn load_db(path: &Path) -> Result<AdminDb, CoreError> {
    let text = fs::read_to_string(path).map_err(|source| CoreError::ReadDb {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CoreError::ParseDb {
        path: path.display().to_string(),
        source,
    })
}

/// Writes the admin database back to `path`, pretty-printed so operators
/// can diff commits of it sanely. Not atomic -- the admin CLI is a single
/// short-lived process with no concurrent writer, unlike the server's
/// reload path.
pub fn write_db(path: &Path, db: &AdminDb) -> Result<(), CoreError> {
    let text = serde_json::to_string_pretty(db).expect("AdminDb always serializes");
    fs::write(path, text).map_err(|source| CoreError::WriteDb {
        path: path.display().to_string(),
        source,
    })
}

/// A minimal syntactic check for the common SSH public-key line shapes,
/// used as the server's default validator. Anything more rigorous is a
/// pluggable concern (spec calls out `ssh-keygen -lf` as one historical
/// choice); this only guards against obviously malformed entries.
pub fn default_validate(data: &str) -> bool {
    let mut fields = data.split_whitespace();
    let key_type = match fields.next() {
        Some(t) => t,
        None => return false,
    };
    let body = match fields.next() {
        Some(b) => b,
        None => return false,
    };

    const KNOWN_TYPES: &[&str] = &[
        "ssh-ed25519",
        "ssh-rsa",
        "ssh-dss",
        "ecdsa-sha2-nistp256",
        "ecdsa-sha2-nistp384",
        "ecdsa-sha2-nistp521",
        "sk-ssh-ed25519@openssh.com",
        "sk-ecdsa-sha2-nistp256@openssh.com",
    ];
    if !KNOWN_TYPES.contains(&key_type) {
        return false;
    }

    !body.is_empty() && body.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
}
