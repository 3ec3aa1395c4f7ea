//! Bridge to the local `adb` tool.
//!
//! Farm devices are remoted over TCP; before a driver session can reach one,
//! the host machine has to attach to it with `adb connect <url>`, and detach
//! with `adb disconnect` during teardown. This module wraps those two
//! invocations. All methods are synchronous and execute shell commands, like
//! every other subprocess bridge in this crate.
//!
//! `adb connect` exits successfully even when the TCP connection is refused,
//! reporting the failure only in its output; the Windows socket error code
//! `(10060)` is the reliable marker for that case.

use std::process::Command;

use thiserror::Error;
use tracing::info;

const CONNECTION_REFUSED_MARKER: &str = "(10060)";

/// Errors that can occur when driving the `adb` tool.
#[derive(Error, Debug)]
pub enum AdbError {
    /// The adb process exited with a failure status.
    #[error("adb command failed: {0}")]
    CommandFailed(String),

    /// adb reported that the device endpoint refused the connection.
    #[error("adb could not reach the device at '{url}': {output}")]
    ConnectionRefused {
        /// The remote-connect URL that was being attached.
        url: String,
        /// Combined adb output containing the refusal marker.
        output: String,
    },

    /// An I/O error occurred while executing the command.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Returns true if adb output signals a refused device connection.
pub(crate) fn output_signals_refusal(output: &str) -> bool {
    output.contains(CONNECTION_REFUSED_MARKER)
}

/// Wrapper for `adb connect` / `adb disconnect`.
#[derive(Debug, Clone)]
pub struct AdbBridge {
    executable: String,
}

impl Default for AdbBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl AdbBridge {
    /// Creates a bridge using the `adb` binary from `PATH`.
    pub fn new() -> Self {
        Self {
            executable: "adb".to_string(),
        }
    }

    /// Creates a bridge using an explicit adb executable.
    pub fn with_executable(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Attach the host to a remoted device.
    ///
    /// # Errors
    ///
    /// - [`AdbError::ConnectionRefused`] if adb reports the endpoint refused
    ///   the connection
    /// - [`AdbError::CommandFailed`] if adb exits with a failure status
    /// - [`AdbError::Io`] if the command fails to execute
    pub fn connect(&self, url: &str) -> Result<String, AdbError> {
        info!(url, "attaching adb to remote device");
        let output = self.run(&["connect", url])?;
        if output_signals_refusal(&output) {
            return Err(AdbError::ConnectionRefused {
                url: url.to_string(),
                output,
            });
        }
        info!(url, "adb attached");
        Ok(output)
    }

    /// Detach the host from all remoted devices.
    pub fn disconnect(&self) -> Result<String, AdbError> {
        info!("detaching adb");
        self.run(&["disconnect"])
    }

    /// Runs adb with the given arguments, returning combined stdout/stderr.
    fn run(&self, args: &[&str]) -> Result<String, AdbError> {
        let output = Command::new(&self.executable).args(args).output()?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let combined = combined.trim().to_string();

        if !output.status.success() {
            return Err(AdbError::CommandFailed(combined));
        }
        Ok(combined)
    }
}
