//! Shared helpers for black-box specs

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Output, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

/// Upper bound for anything a spec waits on
pub const SPEC_WAIT_MAX_MS: u64 = 10_000;

/// Poll `check` until it holds or `max_ms` elapses
pub fn wait_for(max_ms: u64, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(max_ms);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    check()
}

/// Isolated settings file and state directory
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    /// Sandbox with no accounts and autostart off
    pub fn empty() -> Self {
        Self::with_settings("")
    }

    /// Sandbox whose settings file is `extra` plus an isolated state dir
    pub fn with_settings(extra: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state");
        let text = format!(
            "state_dir = {:?}\nautostart = false\n{}",
            state.display().to_string(),
            extra
        );
        std::fs::write(dir.path().join("fieldhand.toml"), text).unwrap();
        Self { dir }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.dir.path().join("fieldhand.toml")
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.state_path().join("daemon.sock")
    }

    /// `fhd --config <sandbox settings>`
    pub fn fhd(&self) -> CliBuilder {
        let mut cmd = assert_cmd::Command::cargo_bin("fhd").unwrap();
        cmd.arg("--config").arg(self.settings_path());
        cmd.env_remove("FIELDHAND_CONFIG");
        cmd.timeout(Duration::from_millis(SPEC_WAIT_MAX_MS));
        CliBuilder { cmd }
    }

    /// Start `fhd run` and wait for its READY line
    pub fn start_daemon(&self) -> Daemon {
        let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("fhd"))
            .arg("--config")
            .arg(self.settings_path())
            .arg("run")
            .env_remove("FIELDHAND_CONFIG")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();

        let stdout = child.stdout.take().unwrap();
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if line.trim() == "READY" {
                    let _ = tx.send(());
                }
            }
        });
        if rx
            .recv_timeout(Duration::from_millis(SPEC_WAIT_MAX_MS))
            .is_err()
        {
            let _ = child.kill();
            panic!("daemon did not report READY");
        }
        Daemon { child }
    }

    pub fn read(&self, relative: impl AsRef<Path>) -> String {
        std::fs::read_to_string(self.dir.path().join(relative)).unwrap_or_default()
    }
}

/// A running daemon, killed on drop if still alive
pub struct Daemon {
    child: Child,
}

impl Daemon {
    /// Wait for the process to exit on its own
    pub fn wait_exit(&mut self) -> bool {
        wait_for(SPEC_WAIT_MAX_MS, || {
            matches!(self.child.try_wait(), Ok(Some(_)))
        })
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

pub struct CliBuilder {
    cmd: assert_cmd::Command,
}

impl CliBuilder {
    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    /// Run and require exit code 0
    pub fn passes(mut self) -> RunAssert {
        let output = self.cmd.output().unwrap();
        assert!(
            output.status.success(),
            "expected success, got {}\nstdout:\n{}\nstderr:\n{}",
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        RunAssert { output }
    }

    /// Run and require a non-zero exit
    pub fn fails(mut self) -> RunAssert {
        let output = self.cmd.output().unwrap();
        assert!(
            !output.status.success(),
            "expected failure\nstdout:\n{}",
            String::from_utf8_lossy(&output.stdout)
        );
        RunAssert { output }
    }
}

pub struct RunAssert {
    output: Output,
}

impl RunAssert {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    pub fn stdout_has(self, expected: &str) -> Self {
        let stdout = self.stdout();
        assert!(
            stdout.contains(expected),
            "stdout missing {:?}:\n{}",
            expected,
            stdout
        );
        self
    }

    pub fn stderr_has(self, expected: &str) -> Self {
        let stderr = self.stderr();
        assert!(
            stderr.contains(expected),
            "stderr missing {:?}:\n{}",
            expected,
            stderr
        );
        self
    }

    /// Parse stdout as the daemon's JSON response
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout()).unwrap()
    }
}
