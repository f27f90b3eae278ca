//! Sends `SIGUSR1` to the running `keyserver`, identified by the pid in a
//! pidfile -- spec.md §6's "the tool writes the DB and sends `SIGUSR1` to
//! the server PID read from a pidfile," mirroring `admin.py`'s
//! `reload_db()`.

use std::path::Path;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::error::AdminError;

pub fn reload_server(pidfile: &Path) -> Result<(), AdminError> {
    let text = std::fs::read_to_string(pidfile).map_err(|source| AdminError::ReadPidfile {
        path: pidfile.display().to_string(),
        source,
    })?;
    let pid: i32 = text.trim().parse().map_err(|_| AdminError::BadPid {
        path: pidfile.display().to_string(),
        text: text.trim().to_owned(),
    })?;
    kill(Pid::from_raw(pid), Signal::SIGUSR1).map_err(|source| AdminError::Signal { pid, source })
}
