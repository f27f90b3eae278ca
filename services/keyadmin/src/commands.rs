//! The administrator CLI's command logic (spec.md §6): `add-key`,
//! `update-key`, `describe-key`, `list-keys`, `remove-key`. Pure
//! `AdminDb` transformations, deliberately separate from `main`'s argument
//! parsing and pidfile/signal I/O so they're unit-testable without a
//! filesystem or a running server.
//!
//! Mirrors `examples/original_source/src/keyserver/admin.py`'s `main()`
//! dispatch, one function per `elif args.action == ...` branch.

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use keys_protocol::{AdminDb, Domain, Host, KeyRecord};

use crate::error::AdminError;

/// Loads the admin db at `path`, or an empty one if it doesn't exist yet --
/// mirrors `admin.py`'s `read_db()`, which treats a missing file as `{}`
/// rather than an error (unlike `keyserver`'s own startup load, which is
/// fatal on a missing db: this CLI is how the db comes into existence).
pub fn load_or_default(path: &Path) -> Result<AdminDb, AdminError> {
    if path.exists() {
        Ok(keys_core::load_db(path)?)
    } else {
        Ok(AdminDb::default())
    }
}

pub fn validate_domains(domains: &[String]) -> Result<(), AdminError> {
    for domain in domains {
        Domain::from_str(domain)?;
    }
    Ok(())
}

/// The last whitespace-separated field of an SSH public-key line is
/// conventionally its comment (`<type> <base64> [comment]`); used as the
/// key name when `--name` is not given, same as `admin.py`'s `key.comment`.
pub fn derive_name_from_key(data: &str) -> Option<String> {
    let mut fields = data.split_whitespace();
    fields.next()?; // type
    fields.next()?; // base64 body
    fields.next().map(str::to_owned)
}

pub fn add_key(
    db: &mut AdminDb,
    name: Option<String>,
    data: String,
    domains: Vec<String>,
    options: Vec<String>,
) -> Result<String, AdminError> {
    validate_domains(&domains)?;
    if !keys_core::default_validate(&data) {
        return Err(AdminError::InvalidKeyData);
    }
    let name = name
        .or_else(|| derive_name_from_key(&data))
        .ok_or(AdminError::NameRequired)?;
    if db.keys.contains_key(&name) {
        return Err(AdminError::DuplicateName(name));
    }
    db.keys.insert(
        name.clone(),
        KeyRecord {
            data,
            domains,
            options,
        },
    );
    Ok(name)
}

#[derive(Default)]
pub struct UpdateKeyArgs {
    pub data: Option<String>,
    pub add_domains: Vec<String>,
    pub remove_domains: Vec<String>,
    pub rename: Option<String>,
    pub add_options: Vec<String>,
    pub remove_options: Vec<String>,
}

pub fn update_key(db: &mut AdminDb, name: &str, args: UpdateKeyArgs) -> Result<(), AdminError> {
    validate_domains(&args.add_domains)?;
    validate_domains(&args.remove_domains)?;
    if !db.keys.contains_key(name) {
        return Err(AdminError::NotFound(name.to_owned()));
    }
    if let Some(data) = &args.data {
        if !keys_core::default_validate(data) {
            return Err(AdminError::InvalidKeyData);
        }
    }
    let final_name = args.rename.clone().unwrap_or_else(|| name.to_owned());
    if final_name != name && db.keys.contains_key(&final_name) {
        return Err(AdminError::DuplicateName(final_name));
    }

    let mut record = db.keys.remove(name).expect("checked above");
    if let Some(data) = args.data {
        record.data = data;
    }

    let mut domains: BTreeSet<String> = record.domains.into_iter().collect();
    for d in args.remove_domains {
        domains.remove(&d);
    }
    domains.extend(args.add_domains);
    record.domains = domains.into_iter().collect();

    let mut options: BTreeSet<String> = record.options.into_iter().collect();
    for o in args.remove_options {
        options.remove(&o);
    }
    options.extend(args.add_options);
    record.options = options.into_iter().collect();

    db.keys.insert(final_name, record);
    Ok(())
}

pub fn describe_key<'a>(db: &'a AdminDb, name: &str) -> Result<&'a KeyRecord, AdminError> {
    db.keys
        .get(name)
        .ok_or_else(|| AdminError::NotFound(name.to_owned()))
}

pub fn remove_key(db: &mut AdminDb, name: &str) -> Result<(), AdminError> {
    if db.keys.remove(name).is_none() {
        return Err(AdminError::NotFound(name.to_owned()));
    }
    Ok(())
}

#[derive(Default)]
pub struct ListKeysFilter {
    pub domain: Option<String>,
    pub host: Option<String>,
    pub user: Option<String>,
}

/// Names of every key matching the filter, sorted. `--host H` matches a
/// domain whose host is exactly `H` *or* the wildcard host `*` -- spec.md
/// §9 open question 2, resolved in favor of the more recent source
/// iteration's behavior (DESIGN.md records this decision).
pub fn list_keys(db: &AdminDb, filter: &ListKeysFilter) -> Vec<String> {
    let mut names = BTreeSet::new();
    for (name, record) in &db.keys {
        let matches = if let Some(domain) = &filter.domain {
            record.domains.iter().any(|d| d == domain)
        } else if let Some(host) = &filter.host {
            record.domains.iter().any(|d| match Domain::from_str(d) {
                Ok(parsed) => match parsed.host {
                    Host::Named(h) => &h == host,
                    Host::Wildcard => true,
                },
                Err(_) => false,
            })
        } else if let Some(user) = &filter.user {
            record.domains.iter().any(|d| match Domain::from_str(d) {
                Ok(parsed) => &parsed.user == user,
                Err(_) => false,
            })
        } else {
            true
        };
        if matches {
            names.insert(name.clone());
        }
    }
    names.into_iter().collect()
}
