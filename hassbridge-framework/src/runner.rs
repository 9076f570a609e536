//! Bridge runner for lifecycle management.

use std::fmt::Display;
use std::future::Future;

use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;

use hassbridge_common::{LoggingConfig, init_tracing};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::error::Result;

/// Bridge runner that supervises the modules of a bridge.
///
/// Handles:
/// - Logging initialization
/// - Module spawning, each on its own task with a shutdown receiver
/// - Graceful shutdown on Ctrl+C or SIGTERM
///
/// Modules are independent: one exiting (or panicking) does not stop the
/// others, and [`run`](Self::run) returns once every module has exited.
///
/// # Example
///
/// ```ignore
/// use hassbridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = BridgeArgs::parse_with_default("mybridge.json5");
///     let config = MyBridgeConfig::load(&args.config)?;
///
///     let mut runner = BridgeRunner::init("mybridge", &config, Some(&args))?;
///
///     runner.spawn_module("worker", |shutdown| my_module(shutdown));
///
///     runner.run().await
/// }
/// ```
pub struct BridgeRunner {
    /// Bridge name for logging.
    name: String,
    /// Bridge version.
    version: String,
    /// Shutdown broadcast shared by all modules.
    shutdown: watch::Sender<bool>,
    /// Supervised module tasks, each yielding its module name.
    tasks: JoinSet<String>,
}

impl BridgeRunner {
    /// Create a runner without touching the global logger.
    pub fn new(name: impl Into<String>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            shutdown,
            tasks: JoinSet::new(),
        }
    }

    /// Initialize logging from the config (with optional CLI override) and
    /// create a runner.
    pub fn init<C: BridgeConfig>(
        name: impl Into<String>,
        config: &C,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let mut log_config: LoggingConfig = config.logging().clone();
        if let Some(level) = args.and_then(|a| a.log_level.as_ref()) {
            log_config.level = level.clone();
        }

        init_tracing(&log_config)?;

        let runner = Self::new(name);
        tracing::info!(bridge = %runner.name, version = %runner.version, node_id = %config.node_id(), "Starting bridge");

        Ok(runner)
    }

    /// Number of modules currently supervised.
    pub fn module_count(&self) -> usize {
        self.tasks.len()
    }

    /// Get a new receiver for the shutdown signal.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Spawn a module.
    ///
    /// `module` receives the shutdown receiver and returns the module future.
    /// Errors and panics are logged with the module name and go no further.
    pub fn spawn_module<F, Fut, E>(&mut self, name: impl Into<String>, module: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let name = name.into();
        let future = module(self.shutdown.subscribe());

        tracing::info!(module = %name, "Starting module");

        self.tasks.spawn(async move {
            match tokio::spawn(future).await {
                Ok(Ok(())) => tracing::info!(module = %name, "Module stopped"),
                Ok(Err(e)) => tracing::error!(module = %name, error = %e, "Module failed"),
                Err(e) => tracing::error!(module = %name, error = %e, "Module panicked"),
            }
            name
        });
    }

    /// Run until Ctrl+C or SIGTERM, then wait for all modules to exit.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `signal` completes, then wait for all modules to exit.
    ///
    /// Returns early, without waiting for `signal`, if every module exits on
    /// its own.
    pub async fn run_until<S>(mut self, signal: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        if self.tasks.is_empty() {
            tracing::warn!(bridge = %self.name, "No modules enabled, nothing to run");
            return Ok(());
        }

        tracing::info!(
            bridge = %self.name,
            modules = self.tasks.len(),
            "Bridge running. Press Ctrl+C to stop."
        );

        tokio::pin!(signal);
        let mut signalled = false;

        while !self.tasks.is_empty() {
            tokio::select! {
                _ = &mut signal, if !signalled => {
                    signalled = true;
                    tracing::info!(bridge = %self.name, "Received shutdown signal");
                    self.shutdown.send_replace(true);
                }
                joined = self.tasks.join_next() => match joined {
                    Some(Ok(name)) => {
                        tracing::debug!(module = %name, remaining = self.tasks.len(), "Module exited");
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Supervisor task failed");
                    }
                    None => break,
                }
            }
        }

        tracing::info!(bridge = %self.name, "Goodbye!");

        Ok(())
    }
}

/// Wait for Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
