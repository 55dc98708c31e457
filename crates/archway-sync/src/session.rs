//! SSH session adapter
//!
//! Opens a command-execution session to the archive host using
//! pre-provisioned key-based authentication and runs the remote shell steps
//! of the protocol. Every step treats non-empty standard error as failure,
//! independent of the process exit code; that rule lives in
//! [`RemoteShell::exec_checked`].
//!
//! All of this is blocking by design and must run on a blocking task.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use archway_core::config::TargetConfig;
use archway_core::domain::SyncError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote command execution as the protocol steps see it.
///
/// Behind a trait so the directory-creation and handoff logic can be
/// exercised against a fake shell in tests.
pub trait RemoteShell {
    /// Runs one command; fails with [`SyncError::RemoteCommand`] as soon as
    /// the remote side writes anything to stderr. Returns stdout.
    fn exec_checked(&mut self, command: &str) -> Result<String, SyncError>;

    /// Probes whether `dir` is absent on the remote side. The probe is a
    /// plain `ls`; stderr output means the directory is not there.
    fn dir_absent(&mut self, dir: &str) -> Result<bool, SyncError>;
}

/// A live SSH session to the archive host.
pub struct RemoteSession {
    session: ssh2::Session,
    addr: String,
}

impl RemoteSession {
    /// Connects and authenticates with the keys under `~/.ssh`.
    pub fn connect(target: &TargetConfig) -> Result<Self, SyncError> {
        let addr = format!("{}:{}", target.host, target.port);
        let sock = addr
            .to_socket_addrs()
            .map_err(|e| connection_error(&addr, e.to_string()))?
            .next()
            .ok_or_else(|| connection_error(&addr, "address did not resolve".to_string()))?;

        let tcp = TcpStream::connect_timeout(&sock, CONNECT_TIMEOUT)
            .map_err(|e| connection_error(&addr, e.to_string()))?;
        let _ = tcp.set_read_timeout(Some(IO_TIMEOUT));
        let _ = tcp.set_write_timeout(Some(IO_TIMEOUT));

        let mut session = ssh2::Session::new()
            .map_err(|e| connection_error(&addr, e.to_string()))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| connection_error(&addr, format!("handshake failed: {e}")))?;

        authenticate(&mut session, &target.user, &addr)?;
        debug!(addr, user = %target.user, "ssh session established");
        Ok(Self { session, addr })
    }

    /// Runs a command and collects both output streams.
    fn run(&self, command: &str) -> Result<(String, String), SyncError> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| connection_error(&self.addr, e.to_string()))?;
        channel
            .exec(command)
            .map_err(|e| remote_error(command, e.to_string()))?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| remote_error(command, e.to_string()))?;
        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|e| remote_error(command, e.to_string()))?;
        let _ = channel.wait_close();
        Ok((stdout, stderr))
    }
}

impl RemoteShell for RemoteSession {
    fn exec_checked(&mut self, command: &str) -> Result<String, SyncError> {
        let (stdout, stderr) = self.run(command)?;
        checked(command, stdout, &stderr)
    }

    fn dir_absent(&mut self, dir: &str) -> Result<bool, SyncError> {
        let (_, stderr) = self.run(&format!("ls {dir}"))?;
        Ok(!stderr.trim().is_empty())
    }
}

/// Tries the usual key files in `~/.ssh`, in preference order.
fn authenticate(
    session: &mut ssh2::Session,
    username: &str,
    addr: &str,
) -> Result<(), SyncError> {
    if session.authenticated() {
        return Ok(());
    }
    if let Some(home) = dirs::home_dir() {
        for name in ["id_ed25519", "id_rsa", "id_ecdsa"] {
            let key = home.join(".ssh").join(name);
            if key.exists() {
                let _ = session.userauth_pubkey_file(username, None, &key, None);
                if session.authenticated() {
                    debug!(key = %key.display(), "authenticated with key file");
                    return Ok(());
                }
            }
        }
    }
    Err(connection_error(
        addr,
        format!("key authentication failed for user '{username}'"),
    ))
}

/// The failure rule for remote shell steps: anything on stderr fails the
/// step, no matter what the exit status said.
fn checked(command: &str, stdout: String, stderr: &str) -> Result<String, SyncError> {
    if !stderr.trim().is_empty() {
        return Err(remote_error(command, stderr.trim().to_string()));
    }
    Ok(stdout)
}

fn connection_error(addr: &str, message: String) -> SyncError {
    SyncError::Connection {
        host: addr.to_string(),
        message,
    }
}

fn remote_error(command: &str, stderr: String) -> SyncError {
    SyncError::RemoteCommand {
        command: command.to_string(),
        stderr,
    }
}
