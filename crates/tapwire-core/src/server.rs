//! Local driver-server process management.
//!
//! When a project runs against a locally hosted automation driver server,
//! tapwire can spawn and stop that process itself. The server executable is
//! named through an environment variable; a missing variable is fatal before
//! any connection attempt, so a misconfigured machine fails fast instead of
//! timing out against a server that was never started. If something already
//! listens on the configured port, the existing instance is reused.

use std::net::TcpListener;
use std::process::{Child, Command, Stdio};

use thiserror::Error;
use tracing::{info, warn};

use crate::config::DriverServerConfig;

/// Environment variable naming the driver-server executable.
pub const SERVER_EXECUTABLE_ENV: &str = "TAPWIRE_DRIVER_SERVER";

/// Errors that can occur while managing the driver-server process.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A required environment variable is unset or empty.
    #[error("environment variable '{0}' must name the driver-server executable")]
    MissingEnvironment(&'static str),

    /// The server process could not be spawned.
    #[error("failed to spawn driver server: {0}")]
    SpawnFailed(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Manages a locally spawned driver-server process.
pub struct DriverServer {
    config: DriverServerConfig,
    child: Option<Child>,
}

impl DriverServer {
    /// Creates a manager for the configured endpoint. Nothing is spawned
    /// until [`start`](Self::start).
    pub fn new(config: DriverServerConfig) -> Self {
        Self {
            config,
            child: None,
        }
    }

    /// Returns true when this manager owns a spawned process.
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Validates the environment and spawns the server unless one is
    /// already listening on the configured port.
    ///
    /// # Errors
    ///
    /// - [`ServerError::MissingEnvironment`] when the executable variable is unset
    /// - [`ServerError::SpawnFailed`] when the process cannot be started
    pub fn start(&mut self) -> Result<(), ServerError> {
        info!(
            host = %self.config.host,
            port = self.config.port,
            "starting driver server"
        );

        if !port_available(&self.config.host, self.config.port) {
            warn!(
                host = %self.config.host,
                port = self.config.port,
                "a driver server is already listening; reusing it"
            );
            return Ok(());
        }

        let executable = validate_environment()?;

        let mut command = Command::new(&executable);
        command
            .arg("--address")
            .arg(&self.config.host)
            .arg("--port")
            .arg(self.config.port.to_string());
        if let Some(base_path) = base_path_of(&self.config.url) {
            command.arg("--base-path").arg(base_path);
        }
        if !self.config.console_log {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let child = command
            .spawn()
            .map_err(|e| ServerError::SpawnFailed(format!("{executable}: {e}")))?;
        info!(pid = child.id(), "driver server spawned");
        self.child = Some(child);
        Ok(())
    }

    /// Stops the spawned server, if this manager owns one.
    pub fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            info!("driver server stopped");
        }
    }
}

impl Drop for DriverServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Resolves the server executable from the environment.
fn validate_environment() -> Result<String, ServerError> {
    match std::env::var(SERVER_EXECUTABLE_ENV) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ServerError::MissingEnvironment(SERVER_EXECUTABLE_ENV)),
    }
}

/// Returns true when nothing is bound to `host:port`.
fn port_available(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok()
}

/// Extracts the URL path to forward as the server's base path, if any.
fn base_path_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    let path = &rest[rest.find('/')?..];
    (path.len() > 1).then_some(path)
}
