//! `keyadmin`: the administrator CLI (spec.md §6). A thin editor over the
//! admin db JSON file -- the single writer of that file, and the only
//! thing that triggers a `keyserver`'s hot reload. Out of scope as a core
//! subject per spec.md §1, but its exact surface is specified there, so
//! it's implemented here rather than left a stub.

mod commands;
mod error;
mod pidfile;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::{ListKeysFilter, UpdateKeyArgs};
use error::AdminError;
use keys_protocol::AdminDb;

fn default_keydb() -> PathBuf {
    PathBuf::from("/var/db/keyserver.db")
}

fn default_pidfile() -> PathBuf {
    PathBuf::from("/var/run/keyserver.pid")
}

/// Administers the `sshkeyd` key database.
#[derive(Parser, Debug)]
struct Cli {
    /// Path to the admin database JSON file.
    #[arg(long, default_value_os_t = default_keydb(), global = true)]
    keydb: PathBuf,

    /// Path to the keyserver's pidfile, used to deliver SIGUSR1 after a
    /// mutation (or on an explicit `reload`).
    #[arg(long, default_value_os_t = default_pidfile(), global = true)]
    pidfile: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a new key record.
    AddKey {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        keyfile: Option<PathBuf>,
        #[arg(long)]
        keydata: Option<String>,
        #[arg(long = "domain")]
        domains: Vec<String>,
        #[arg(long = "option")]
        options: Vec<String>,
    },
    /// Update an existing key record.
    UpdateKey {
        #[arg(long, required = true)]
        name: String,
        #[arg(long)]
        keyfile: Option<PathBuf>,
        #[arg(long)]
        keydata: Option<String>,
        #[arg(long = "add-domain")]
        add_domains: Vec<String>,
        #[arg(long = "remove-domain")]
        remove_domains: Vec<String>,
        #[arg(long)]
        rename: Option<String>,
        #[arg(long = "add-option")]
        add_options: Vec<String>,
        #[arg(long = "remove-option")]
        remove_options: Vec<String>,
    },
    /// Print a key record as JSON.
    DescribeKey {
        #[arg(long, required = true)]
        name: String,
    },
    /// List key names, optionally filtered.
    ListKeys {
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        user: Option<String>,
    },
    /// Remove a key record.
    RemoveKey {
        #[arg(long, required = true)]
        name: String,
    },
    /// Signal the running keyserver to reload, without changing the db.
    Reload,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AdminError> {
    if matches!(cli.command, Command::Reload) {
        return pidfile::reload_server(&cli.pidfile);
    }

    let mut db = commands::load_or_default(&cli.keydb)?;
    let mut mutated = true;

    match cli.command {
        Command::AddKey {
            name,
            keyfile,
            keydata,
            domains,
            options,
        } => {
            let data = resolve_key_data(keyfile, keydata)?;
            let name = commands::add_key(&mut db, name, data, domains, options)?;
            println!("added key '{name}'");
        }
        Command::UpdateKey {
            name,
            keyfile,
            keydata,
            add_domains,
            remove_domains,
            rename,
            add_options,
            remove_options,
        } => {
            let data = match (keyfile, keydata) {
                (None, None) => None,
                (keyfile, keydata) => Some(resolve_key_data(keyfile, keydata)?),
            };
            commands::update_key(
                &mut db,
                &name,
                UpdateKeyArgs {
                    data,
                    add_domains,
                    remove_domains,
                    rename,
                    add_options,
                    remove_options,
                },
            )?;
            println!("updated key '{name}'");
        }
        Command::DescribeKey { name } => {
            let record = commands::describe_key(&db, &name)?;
            println!("{}", serde_json::to_string_pretty(record)?);
            mutated = false;
        }
        Command::ListKeys { domain, host, user } => {
            let names = commands::list_keys(&db, &ListKeysFilter { domain, host, user });
            println!("{}", serde_json::to_string_pretty(&names)?);
            mutated = false;
        }
        Command::RemoveKey { name } => {
            commands::remove_key(&mut db, &name)?;
            println!("removed key '{name}'");
        }
        Command::Reload => unreachable!("handled above"),
    }

    if mutated {
        write_db_and_reload(&cli.keydb, &db, &cli.pidfile)?;
    }
    Ok(())
}

fn resolve_key_data(keyfile: Option<PathBuf>, keydata: Option<String>) -> Result<String, AdminError> {
    match (keyfile, keydata) {
        (Some(path), _) => std::fs::read_to_string(&path)
            .map(|s| s.trim().to_owned())
            .map_err(|source| AdminError::ReadKeyfile {
                path: path.display().to_string(),
                source,
            }),
        (None, Some(data)) => Ok(data),
        (None, None) => Err(AdminError::KeyDataRequired),
    }
}

/// Writes the db then signals the server, mirroring `admin.py`'s
/// `write_db()`, which always calls `reload_db()` after writing. A
/// missing or unreadable pidfile (no server running yet) is logged to
/// stderr but does not fail the command -- spec.md §6 only requires a
/// non-zero exit on *validation* failure or a failed write, and by the
/// time we'd signal, the write has already succeeded.
fn write_db_and_reload(keydb: &std::path::Path, db: &AdminDb, pidfile: &std::path::Path) -> Result<(), AdminError> {
    keys_core::write_db(keydb, db)?;
    if let Err(err) = pidfile::reload_server(pidfile) {
        eprintln!("warning: db updated but failed to signal keyserver: {err}");
    }
    Ok(())
}
