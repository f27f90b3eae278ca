//! Fetcher CLI surface (spec.md §6): `-k`, `-s`, `-p`, `--fqdn`, `-d`,
//! unchanged from `examples/original_source/src/keyserver/fetcher.py`'s
//! `argparse` flags, transliterated to `clap`'s derive API the way
//! `keyadmin` and `keyserver` do.
//!
//! **[SUPPLEMENT]** `fetcher.py` itself never exposes a TLS toggle, but the
//! client it drives (`lib/keyserver/client.py::create_client`) defaults
//! `enable_ssl=True` and accepts `--disable-ssl` to opt out. This
//! implementation carries that same default (connect over TLS unless
//! told not to) and the same flag name, since the server this daemon
//! talks to always exposes a TLS endpoint per spec.md §6.

use std::path::PathBuf;

use clap::Parser;

fn default_keydir() -> PathBuf {
    PathBuf::from("/var/db/sshkeys")
}

/// SSH authorized_keys fetcher daemon.
#[derive(Parser, Debug)]
pub struct Args {
    /// Directory in which `<user>.keys` files are materialized.
    #[arg(short = 'k', default_value_os_t = default_keydir())]
    pub keydir: PathBuf,

    /// Key server hostname or address. Defaults to `keyserver` (plaintext)
    /// or `keyserver.lan.raincity.io` (TLS), mirroring the original
    /// client's `default_server`/`default_ssl_server`.
    #[arg(short = 's')]
    pub server: Option<String>,

    /// Key server port. Defaults to 8282 (plaintext) or 8283 (TLS).
    #[arg(short = 'p')]
    pub port: Option<u16>,

    /// Hostname declared at handshake. Defaults to the local FQDN.
    #[arg(long)]
    pub fqdn: Option<String>,

    /// Enable debug logging.
    #[arg(short = 'd')]
    pub debug: bool,

    /// Connect in plaintext instead of TLS.
    #[arg(long)]
    pub disable_ssl: bool,
}

pub const DEFAULT_PLAINTEXT_SERVER: &str = "keyserver";
pub const DEFAULT_TLS_SERVER: &str = "keyserver.lan.raincity.io";
pub const DEFAULT_PLAINTEXT_PORT: u16 = 8282;
pub const DEFAULT_TLS_PORT: u16 = 8283;

impl Args {
    pub fn resolved_server(&self) -> &str {
        self.server.as_deref().unwrap_or(if self.disable_ssl {
            DEFAULT_PLAINTEXT_SERVER
        } else {
            DEFAULT_TLS_SERVER
        })
    }

    pub fn resolved_port(&self) -> u16 {
        self.port.unwrap_or(if self.disable_ssl {
            DEFAULT_PLAINTEXT_PORT
        } else {
            DEFAULT_TLS_PORT
        })
    }
}
