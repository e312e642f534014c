//! Platform Selector / Unified Adapter
//!
//! Picks exactly one concrete gateway implementation at construction time
//! and hides the choice behind a single surface, so upstream code never
//! branches on platform:
//!
//! - Desktop OS families get the real [`CommandGateway`] paired with that
//!   OS's executable resolver.
//! - Sandboxed environments (wasm targets, or an explicit configuration
//!   override) get a variant that short-circuits every command with a fixed
//!   "unsupported" result without resolving or spawning anything.

use std::sync::Arc;

use async_trait::async_trait;

use super::executor::{CommandGateway, CommandRequest, ExecutionResult, SENTINEL_EXIT_CODE};
use super::resolver::{ExecutableResolver, UnixResolver, WindowsResolver};
use crate::config::GatewayConfig;

/// Result text for environments where execution is categorically disallowed.
pub const UNSUPPORTED_ENVIRONMENT: &str = "execution is not supported in this environment";

/// The one method set every gateway variant provides.
#[async_trait]
pub trait Gateway: Send + Sync + std::fmt::Debug {
    /// Run one command through the gates to a terminal result.
    async fn execute(&self, request: CommandRequest) -> ExecutionResult;

    /// Whether the external tool can be located on this host.
    async fn check_availability(&self) -> bool;

    /// Tool version string, if the tool runs.
    async fn get_version(&self) -> Option<String>;

    /// Whether a signed-in session exists.
    async fn is_authenticated(&self) -> bool;

    /// Number of currently admitted commands.
    fn active_count(&self) -> usize;

    /// Force-complete every in-flight command.
    fn cancel_all(&self);
}

#[async_trait]
impl Gateway for CommandGateway {
    async fn execute(&self, request: CommandRequest) -> ExecutionResult {
        CommandGateway::execute(self, request).await
    }

    async fn check_availability(&self) -> bool {
        CommandGateway::check_availability(self)
    }

    async fn get_version(&self) -> Option<String> {
        CommandGateway::get_version(self).await
    }

    async fn is_authenticated(&self) -> bool {
        CommandGateway::is_authenticated(self).await
    }

    fn active_count(&self) -> usize {
        CommandGateway::active_count(self)
    }

    fn cancel_all(&self) {
        CommandGateway::cancel_all(self)
    }
}

/// Gateway variant for sandboxed environments. Every command completes
/// immediately with the same unsupported-environment result; nothing is ever
/// resolved or spawned.
#[derive(Debug, Default)]
pub struct NoExecGateway;

#[async_trait]
impl Gateway for NoExecGateway {
    async fn execute(&self, _request: CommandRequest) -> ExecutionResult {
        ExecutionResult {
            success: false,
            stdout: String::new(),
            stderr: UNSUPPORTED_ENVIRONMENT.to_string(),
            exit_code: SENTINEL_EXIT_CODE,
            duration_ms: 0,
        }
    }

    async fn check_availability(&self) -> bool {
        false
    }

    async fn get_version(&self) -> Option<String> {
        None
    }

    async fn is_authenticated(&self) -> bool {
        false
    }

    fn active_count(&self) -> usize {
        0
    }

    fn cancel_all(&self) {}
}

/// The unified adapter callers hold. The host-environment check happens
/// exactly once, in [`PlatformGateway::new`].
#[derive(Debug)]
pub struct PlatformGateway {
    inner: Box<dyn Gateway>,
}

impl PlatformGateway {
    /// Select the gateway variant for this host.
    pub fn new(config: GatewayConfig) -> Self {
        if config.sandboxed || cfg!(target_arch = "wasm32") {
            return Self {
                inner: Box::new(NoExecGateway),
            };
        }
        let resolver = default_resolver(&config.tool);
        Self {
            inner: Box::new(CommandGateway::new(config, resolver)),
        }
    }

    /// Build around an explicit resolver; used by tests and by hosts that
    /// pin the tool path in configuration.
    pub fn with_resolver(config: GatewayConfig, resolver: Arc<dyn ExecutableResolver>) -> Self {
        Self {
            inner: Box::new(CommandGateway::new(config, resolver)),
        }
    }

    pub async fn execute(&self, request: impl Into<CommandRequest>) -> ExecutionResult {
        self.inner.execute(request.into()).await
    }

    pub async fn check_availability(&self) -> bool {
        self.inner.check_availability().await
    }

    pub async fn get_version(&self) -> Option<String> {
        self.inner.get_version().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.is_authenticated().await
    }

    pub fn active_count(&self) -> usize {
        self.inner.active_count()
    }

    pub fn cancel_all(&self) {
        self.inner.cancel_all()
    }
}

fn default_resolver(tool: &str) -> Arc<dyn ExecutableResolver> {
    if cfg!(windows) {
        Arc::new(WindowsResolver::new(tool))
    } else {
        Arc::new(UnixResolver::new(tool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandboxed_config() -> GatewayConfig {
        GatewayConfig {
            sandboxed: true,
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_sandboxed_environment_short_circuits() {
        let adapter = PlatformGateway::new(sandboxed_config());
        let result = adapter.execute("az keyvault list").await;
        assert!(!result.success);
        assert_eq!(result.stderr, UNSUPPORTED_ENVIRONMENT);
        assert_eq!(result.exit_code, SENTINEL_EXIT_CODE);
        assert!(!adapter.check_availability().await);
        assert_eq!(adapter.get_version().await, None);
        assert!(!adapter.is_authenticated().await);
        assert_eq!(adapter.active_count(), 0);
    }

    #[tokio::test]
    async fn test_sandboxed_rejects_even_allow_listed_commands() {
        let adapter = PlatformGateway::new(sandboxed_config());
        // The same command a desktop host would accept.
        let result = adapter.execute("az account show").await;
        assert_eq!(result.stderr, UNSUPPORTED_ENVIRONMENT);
    }

    #[tokio::test]
    async fn test_desktop_adapter_runs_real_gateway() {
        use crate::gateway::resolver::FixedResolver;

        let config = GatewayConfig {
            tool: "echo".to_string(),
            allow_list: vec!["echo".to_string()],
            ..GatewayConfig::default()
        };
        let path = which::which("echo").expect("echo must exist");
        let adapter = PlatformGateway::with_resolver(config, Arc::new(FixedResolver::new(path)));
        let result = adapter.execute("echo adapter").await;
        assert!(result.success);
        assert!(result.stdout.contains("adapter"));
        assert!(adapter.check_availability().await);
    }
}
