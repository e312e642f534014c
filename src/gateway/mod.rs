//! Secure Command-Execution Gateway
//!
//! This module is the only path through which the VaultKeeper client runs
//! the external CLI tool. It enforces strict measures against command
//! injection and resource exhaustion.
//!
//! # Security Features
//!
//! - **Input Validation**: command strings are checked against dangerous
//!   patterns before anything else happens
//! - **Allow-Listing**: only configured command prefixes are ever executed
//! - **List Invocation**: processes are spawned from an argument vector,
//!   never through a shell
//! - **Admission Cap**: a bounded number of commands may be in flight
//! - **Timeout Enforcement**: every execution races a deadline
//! - **Output Redaction**: secret-bearing fields are scrubbed from stdout
//!   before it leaves the gateway
//!
//! # Architecture
//!
//! The module is organized into:
//! - `validator.rs`: gate-1 validation, field validators, escaping, redaction
//! - `executor.rs`: the gateway state machine and process execution
//! - `resolver.rs`: platform-specific executable discovery
//! - `platform.rs`: host-environment selection and the unified adapter
//! - `error.rs`: the closed failure taxonomy
//!
//! # Example
//!
//! ```no_run
//! use vaultkeeper_gateway::config::GatewayConfig;
//! use vaultkeeper_gateway::gateway::PlatformGateway;
//!
//! #[tokio::main]
//! async fn main() {
//!     let adapter = PlatformGateway::new(GatewayConfig::default());
//!     let result = adapter.execute("az keyvault list").await;
//!     if result.success {
//!         println!("{}", result.stdout);
//!     } else {
//!         eprintln!("{}", result.stderr);
//!     }
//! }
//! ```

mod error;
mod executor;
mod platform;
mod resolver;
mod validator;

pub use error::GatewayError;
pub use executor::{CommandGateway, CommandRequest, ExecutionResult, SENTINEL_EXIT_CODE};
pub use platform::{Gateway, NoExecGateway, PlatformGateway, UNSUPPORTED_ENVIRONMENT};
pub use resolver::{
    widened_search_path, ExecutableResolver, FixedResolver, UnixResolver, WindowsResolver,
};
pub use validator::{
    build_secret_set_command, build_secret_show_command, build_vault_create_command,
    escape_shell_argument, sanitize_output, truncate_for_log, validate_email, validate_json,
    validate_resource_group, validate_resource_name, validate_subscription_id, validate_url,
    CommandValidator, SafeCommand, ValidationError, LOG_TRUNCATE_LEN, REDACTION_TOKEN,
};
