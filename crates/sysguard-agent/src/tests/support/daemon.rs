//! Fake daemons speaking the line protocol.
//!
//! [`ScriptedDaemon`] is a `/bin/sh` script run through the process
//! transport; [`NetworkDaemon`] serves the same answers over loopback TCP.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tempfile::TempDir;

const INTERACTIVE_SCRIPT: &str = r#"printf 'ksysguardd 4.0.0\n(c) 1999-2024 sysguard test\nksysguardd> '
while IFS= read -r line; do
  case "$line" in
    cpu/load) printf '3.2\nksysguardd> ' ;;
    mem/free) printf '1024\nksysguardd> ' ;;
    monitors) printf 'cpu/load\tfloat\nmem/free\tinteger\nksysguardd> ' ;;
    notify) printf '\033disk almost full\033ksysguardd> ' ;;
    reconfigure) printf '\033RECONFIGURE\033ksysguardd> ' ;;
    *) printf 'UNKNOWN COMMAND\nksysguardd> ' ;;
  esac
done
"#;

const CRASHING_SCRIPT: &str = "exit 3\n";

/// Shell script standing in for the daemon binary.
pub struct ScriptedDaemon {
    _dir: TempDir,
    command: String,
}

impl ScriptedDaemon {
    /// Daemon answering the commands listed in the script.
    pub fn interactive() -> Result<Self> {
        Self::with_script(INTERACTIVE_SCRIPT)
    }

    /// Daemon that exits before printing anything.
    pub fn crashing() -> Result<Self> {
        Self::with_script(CRASHING_SCRIPT)
    }

    fn with_script(body: &str) -> Result<Self> {
        let dir = tempfile::tempdir().context("create script dir")?;
        let path = dir.path().join("ksysguardd.sh");
        fs::write(&path, body).context("write daemon script")?;
        Ok(Self {
            command: format!("/bin/sh {}", path.display()),
            _dir: dir,
        })
    }

    /// Command line starting the daemon.
    pub fn command(&self) -> &str {
        &self.command
    }
}

/// Loopback TCP daemon serving one connection.
///
/// The connection is closed by the daemon when it receives `quit`.
pub struct NetworkDaemon {
    port: u16,
    handle: Option<JoinHandle<Result<()>>>,
}

impl NetworkDaemon {
    pub fn spawn() -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).context("bind fake daemon")?;
        let port = listener.local_addr().context("local addr")?.port();
        let handle = thread::spawn(move || Self::serve(&listener));
        Ok(Self {
            port,
            handle: Some(handle),
        })
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Waits for the connection to end and surfaces serving errors.
    pub fn finish(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow::anyhow!("fake daemon thread panicked"))?,
            None => Ok(()),
        }
    }

    fn serve(listener: &TcpListener) -> Result<()> {
        let (stream, _) = listener.accept().context("accept connection")?;
        let mut writer = stream.try_clone().context("clone stream")?;
        writer
            .write_all(b"ksysguardd 4.0.0\nksysguardd> ")
            .context("write banner")?;
        for line in BufReader::new(stream).lines() {
            let command = line.context("read command")?;
            let Some(answer) = Self::answer(&command) else {
                return Ok(());
            };
            writer.write_all(answer).context("write answer")?;
        }
        Ok(())
    }

    fn answer(command: &str) -> Option<&'static [u8]> {
        match command {
            "quit" => None,
            "cpu/load" => Some(b"3.2\nksysguardd> ".as_slice()),
            "notify" => Some(b"\x1bdisk almost full\x1bksysguardd> ".as_slice()),
            _ => Some(b"UNKNOWN COMMAND\nksysguardd> ".as_slice()),
        }
    }
}
