//! Connection to the local host through `sh -c`.
use std::{
    fs,
    io::{self, Read},
    path::Path,
    process::{Child, Command, Stdio},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use super::{BackgroundCommand, Connection};
use crate::error::{TargetError, TargetResult};

/// How long a background command gets to exit after `SIGTERM`.
const TERM_GRACE: Duration = Duration::from_secs(2);

/// Runs commands on the machine executing the harness.
#[derive(Debug, Clone)]
pub struct LocalConnection {
    shell: String,
}

impl LocalConnection {
    /// Create a connection that uses `sh`.
    pub fn new() -> Self {
        Self::with_shell("sh")
    }

    /// Create a connection that uses the given shell.
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self { shell: shell.into() }
    }

    fn command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command).stdin(Stdio::null());
        cmd
    }
}

impl Default for LocalConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection for LocalConnection {
    fn execute(&self, command: &str) -> TargetResult<String> {
        let output = self.command(command).output()?;
        if !output.status.success() {
            return Err(TargetError::Command {
                command: command.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn background(&self, command: &str) -> TargetResult<Box<dyn BackgroundCommand>> {
        let mut cmd = self.command(command);
        cmd.stdout(Stdio::piped()).stderr(Stdio::null());

        // Own process group so terminate reaches the whole pipeline, not just the shell.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

        let mut child = cmd.spawn()?;
        let output = Arc::new(Mutex::new(Vec::new()));
        let reader = child.stdout.take().map(|stdout| {
            let output = output.clone();
            thread::spawn(move || read_stream(stdout, output))
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(pid = child.id(), command, "spawned background command");

        Ok(Box::new(LocalBackground { child, output, reader }))
    }

    fn pull(&self, source: &str, dest: &Path) -> TargetResult<()> {
        let source = Path::new(source);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if source.is_dir() {
            copy_dir(source, dest)?;
        } else {
            fs::copy(source, dest)?;
        }
        Ok(())
    }
}

fn read_stream<T: Read>(mut stream: T, output: Arc<Mutex<Vec<u8>>>) {
    let mut buffer = [0; 4096];
    loop {
        match stream.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => output.lock().extend_from_slice(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

fn copy_dir(source: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let to = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &to)?;
        } else {
            fs::copy(entry.path(), to)?;
        }
    }
    Ok(())
}

struct LocalBackground {
    child: Child,
    output: Arc<Mutex<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

impl LocalBackground {
    fn signal(&mut self, signal: &str) {
        cfg_if::cfg_if! {
            if #[cfg(unix)] {
                let group = format!("-{}", self.child.id());
                let sent = Command::new("kill")
                    .arg(format!("-{signal}"))
                    .arg("--")
                    .arg(&group)
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .is_ok_and(|s| s.success());
                if !sent && signal == "KILL" {
                    let _ = self.child.kill();
                }
            } else {
                let _ = signal;
                let _ = self.child.kill();
            }
        }
    }

    fn wait_for_exit(&mut self, timeout: Duration) -> io::Result<bool> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.child.try_wait()?.is_some() {
                return Ok(true);
            }
            thread::sleep(Duration::from_millis(10));
        }
        Ok(false)
    }
}

impl BackgroundCommand for LocalBackground {
    fn is_running(&mut self) -> TargetResult<bool> {
        Ok(self.child.try_wait()?.is_none())
    }

    fn terminate(mut self: Box<Self>) -> TargetResult<Vec<u8>> {
        if self.child.try_wait()?.is_none() {
            self.signal("TERM");
            if !self.wait_for_exit(TERM_GRACE)? {
                #[cfg(feature = "tracing")]
                tracing::warn!(pid = self.child.id(), "background command ignored SIGTERM");
                // The leader is not reaped yet, so its pgid still names this group.
                self.signal("KILL");
            }
        }
        self.child.wait()?;
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        Ok(std::mem::take(&mut *self.output.lock()))
    }
}

impl Drop for LocalBackground {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            self.signal("KILL");
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute() {
        let conn = LocalConnection::new();
        assert_eq!(conn.execute("echo hello").unwrap(), "hello\n");
    }

    #[test]
    fn test_execute_failure() {
        let conn = LocalConnection::new();
        let err = conn.execute("echo oops >&2; exit 3").unwrap_err();
        match err {
            TargetError::Command { command, stderr, .. } => {
                assert_eq!(command, "echo oops >&2; exit 3");
                assert_eq!(stderr, "oops");
            }
            e => panic!("unexpected error: {e:?}"),
        }
    }

    #[test]
    fn test_background_captures_output() {
        let conn = LocalConnection::new();
        let mut cmd = conn.background("echo ready; sleep 30").unwrap();
        assert!(cmd.is_running().unwrap());

        // give the shell a moment to write
        thread::sleep(Duration::from_millis(500));
        assert!(cmd.is_running().unwrap());

        let output = cmd.terminate().unwrap();
        assert_eq!(String::from_utf8_lossy(&output), "ready\n");
    }

    #[test]
    fn test_background_ignoring_term_is_killed() {
        let conn = LocalConnection::new();
        let cmd = conn.background("trap '' TERM; echo ready; sleep 30").unwrap();
        thread::sleep(Duration::from_millis(500));

        let started = Instant::now();
        let output = cmd.terminate().unwrap();

        assert_eq!(String::from_utf8_lossy(&output), "ready\n");
        assert!(started.elapsed() >= TERM_GRACE);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_background_finished_command() {
        let conn = LocalConnection::new();
        let mut cmd = conn.background("printf done").unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while cmd.is_running().unwrap() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(cmd.terminate().unwrap(), b"done");
    }

    #[test]
    fn test_pull_file_and_directory() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("logs/nested")).unwrap();
        fs::write(src.path().join("logs/a.log"), "a").unwrap();
        fs::write(src.path().join("logs/nested/b.log"), "b").unwrap();

        let conn = LocalConnection::new();
        let logs = src.path().join("logs");
        conn.pull(logs.to_str().unwrap(), &dst.path().join("out")).unwrap();
        assert_eq!(fs::read_to_string(dst.path().join("out/a.log")).unwrap(), "a");
        assert_eq!(fs::read_to_string(dst.path().join("out/nested/b.log")).unwrap(), "b");

        let file = src.path().join("logs/a.log");
        conn.pull(file.to_str().unwrap(), &dst.path().join("copy/a.log")).unwrap();
        assert_eq!(fs::read_to_string(dst.path().join("copy/a.log")).unwrap(), "a");
    }
}
