//! Command Validation Module
//!
//! This module is the first gate of the command gateway. It judges a
//! candidate command string before anything is resolved or spawned, and it
//! provides the escaping/redaction helpers the rest of the crate builds on.
//!
//! # Security Principles
//!
//! 1. **Single Root**: Only commands whose root token is the configured CLI
//!    tool are accepted.
//! 2. **No Shell**: Commands are tokenized with a quote-aware splitter and
//!    executed as an argument list, never through a shell.
//! 3. **Dangerous Pattern Rejection**: Shell metacharacters, escape
//!    sequences, path traversal and flag-value injection shapes are rejected
//!    outright.
//! 4. **Structured Field Validation**: Helpers that build command strings
//!    from structured parameters validate each field first and single-quote
//!    every embedded value.

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;
use uuid::Uuid;

/// Token substituted for sensitive field values in sanitized output.
pub const REDACTION_TOKEN: &str = "[REDACTED]";

/// Maximum length of command/output text written to logs.
pub const LOG_TRUNCATE_LEN: usize = 500;

lazy_static! {
    // Order matters only for readability; every pattern maps to the same
    // rejection category.
    static ref SHELL_METACHARACTERS: Regex =
        Regex::new(r"[;&|$`(){}\[\]<>\\]").unwrap();
    static ref PATH_TRAVERSAL: Regex = Regex::new(r"\.\.[/\\]").unwrap();
    static ref FLAG_VALUE_INJECTION: Regex =
        Regex::new(r"--[A-Za-z0-9-]+=\S*[;&|$`]").unwrap();

    static ref RESOURCE_NAME: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
    static ref EMAIL: Regex =
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap();

    static ref SENSITIVE_FIELD: Regex = Regex::new(
        r#"("(?:value|password|connectionString|key|secret)"\s*:\s*)"(?:[^"\\]|\\.)*""#
    )
    .unwrap();
}

/// Error types for command and field validation
///
/// The reason set is closed: every rejection the validator can produce maps
/// to one of these variants, and the rendered messages are what callers
/// surface to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("command cannot be empty")]
    Empty,

    #[error("only {0} commands are allowed")]
    DisallowedRoot(String),

    #[error("command contains potentially dangerous characters")]
    DangerousPattern,

    #[error("{0}")]
    MalformedField(String),
}

/// A command that has passed gate-1 validation, carried as an argument
/// vector so values quoted by [`escape_shell_argument`] survive intact all
/// the way to process spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeCommand {
    /// Root token; always equal to the sanctioned tool name.
    pub program: String,

    /// Remaining tokens, with quoting already resolved.
    pub args: Vec<String>,
}

/// Command validator for the sanctioned external CLI tool
///
/// Pure: no I/O, no state beyond the configured tool name.
#[derive(Debug, Clone)]
pub struct CommandValidator {
    tool: String,
}

impl CommandValidator {
    /// Create a validator for the given tool name (e.g. `"az"`).
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }

    /// The sanctioned tool name.
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Validate a candidate command string.
    ///
    /// Rules are applied in order, first match wins:
    /// 1. Empty or whitespace-only text is rejected.
    /// 2. A root token other than the sanctioned tool is rejected.
    /// 3. Any dangerous pattern (shell metacharacters, backslash escapes,
    ///    `../` traversal, `--flag=value` with an embedded metacharacter)
    ///    is rejected.
    /// 4. Otherwise the command is tokenized and returned as a
    ///    [`SafeCommand`].
    ///
    /// # Example
    ///
    /// ```
    /// use vaultkeeper_gateway::gateway::CommandValidator;
    ///
    /// let validator = CommandValidator::new("az");
    /// assert!(validator.validate_command("az keyvault list").is_ok());
    /// assert!(validator.validate_command("rm -rf /").is_err());
    /// ```
    pub fn validate_command(&self, text: &str) -> Result<SafeCommand, ValidationError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty);
        }

        let root = trimmed.split_whitespace().next().unwrap_or_default();
        if root != self.tool {
            return Err(ValidationError::DisallowedRoot(self.tool.clone()));
        }

        if SHELL_METACHARACTERS.is_match(trimmed)
            || PATH_TRAVERSAL.is_match(trimmed)
            || FLAG_VALUE_INJECTION.is_match(trimmed)
        {
            return Err(ValidationError::DangerousPattern);
        }

        // Unbalanced quoting never yields a well-formed argument vector;
        // treat it the same as a metacharacter hit.
        let tokens =
            shell_words::split(trimmed).map_err(|_| ValidationError::DangerousPattern)?;
        match tokens.split_first() {
            Some((program, args)) => Ok(SafeCommand {
                program: program.clone(),
                args: args.to_vec(),
            }),
            None => Err(ValidationError::Empty),
        }
    }
}

/// Validate a vault or secret resource name.
///
/// Policy: 3-24 characters, letters/digits/hyphen/underscore only, and the
/// name may not start or end with a hyphen.
pub fn validate_resource_name(name: &str) -> Result<(), ValidationError> {
    if name.len() < 3 || name.len() > 24 {
        return Err(ValidationError::MalformedField(
            "resource name must be between 3 and 24 characters".to_string(),
        ));
    }
    if !RESOURCE_NAME.is_match(name) {
        return Err(ValidationError::MalformedField(
            "resource name may only contain letters, digits, hyphens and underscores"
                .to_string(),
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(ValidationError::MalformedField(
            "resource name may not start or end with a hyphen".to_string(),
        ));
    }
    Ok(())
}

/// Validate a resource group name: at most 90 characters, not ending in a
/// period.
pub fn validate_resource_group(group: &str) -> Result<(), ValidationError> {
    if group.is_empty() {
        return Err(ValidationError::MalformedField(
            "resource group cannot be empty".to_string(),
        ));
    }
    if group.len() > 90 {
        return Err(ValidationError::MalformedField(
            "resource group must be at most 90 characters".to_string(),
        ));
    }
    if group.ends_with('.') {
        return Err(ValidationError::MalformedField(
            "resource group may not end with a period".to_string(),
        ));
    }
    Ok(())
}

/// Validate a subscription ID.
///
/// Must match the canonical hyphen-grouped 8-4-4-4-12 hexadecimal form,
/// case-insensitive. The length check is what pins `Uuid::parse_str` to the
/// grouped form; the parser alone also accepts the 32-character simple form.
pub fn validate_subscription_id(id: &str) -> Result<(), ValidationError> {
    if id.len() == 36 && Uuid::parse_str(id).is_ok() {
        Ok(())
    } else {
        Err(ValidationError::MalformedField(
            "subscription ID must be a UUID in 8-4-4-4-12 form".to_string(),
        ))
    }
}

/// Validate that a string parses as a JSON value of any kind.
pub fn validate_json(text: &str) -> Result<(), ValidationError> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(|_| ())
        .map_err(|_| ValidationError::MalformedField("value is not valid JSON".to_string()))
}

/// Validate an email address syntactically.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if EMAIL.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::MalformedField(
            "invalid email address".to_string(),
        ))
    }
}

/// Validate a URL. Protocol-less and host-less strings are rejected.
pub fn validate_url(text: &str) -> Result<(), ValidationError> {
    match Url::parse(text) {
        Ok(url) if url.has_host() => Ok(()),
        _ => Err(ValidationError::MalformedField(
            "invalid URL: scheme and host are required".to_string(),
        )),
    }
}

/// Quote an argument so it reaches the external tool as one atomic value.
///
/// The argument is wrapped in single quotes and any embedded single quote is
/// replaced with the POSIX-safe `'"'"'` sequence. This is the mechanism that
/// lets structured values carry arbitrary content even though the command
/// line itself is rejected when it contains raw metacharacters.
///
/// # Example
///
/// ```
/// use vaultkeeper_gateway::gateway::escape_shell_argument;
///
/// assert_eq!(escape_shell_argument("it's"), r#"'it'"'"'s'"#);
/// ```
pub fn escape_shell_argument(text: &str) -> String {
    format!("'{}'", text.replace('\'', r#"'"'"'"#))
}

/// Redact sensitive field values in tool output.
///
/// Known sensitive keys (`value`, `password`, `connectionString`, `key`,
/// `secret`, case-sensitive as the tool emits them) inside JSON-like
/// structures have their quoted values replaced with [`REDACTION_TOKEN`].
/// The result is safe to show in the UI; it is *not* truncated.
pub fn sanitize_output(text: &str) -> String {
    SENSITIVE_FIELD
        .replace_all(text, format!("${{1}}\"{REDACTION_TOKEN}\""))
        .into_owned()
}

/// Truncate text for logging, at most [`LOG_TRUNCATE_LEN`] bytes, falling
/// back to the nearest character boundary. The logged copy of any command or
/// output goes through this after redaction; the copy returned to callers
/// does not.
pub fn truncate_for_log(text: &str) -> String {
    if text.len() <= LOG_TRUNCATE_LEN {
        return text.to_string();
    }
    let mut end = LOG_TRUNCATE_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Build a `keyvault secret set` command from structured parameters.
///
/// Fields are validated first; the secret value is single-quoted so it
/// survives tokenization as one argument regardless of content.
pub fn build_secret_set_command(
    tool: &str,
    vault: &str,
    name: &str,
    value: &str,
) -> Result<String, ValidationError> {
    validate_resource_name(vault)?;
    validate_resource_name(name)?;
    Ok(format!(
        "{tool} keyvault secret set --vault-name {vault} --name {name} --value {}",
        escape_shell_argument(value)
    ))
}

/// Build a `keyvault secret show` command from structured parameters.
pub fn build_secret_show_command(
    tool: &str,
    vault: &str,
    name: &str,
) -> Result<String, ValidationError> {
    validate_resource_name(vault)?;
    validate_resource_name(name)?;
    Ok(format!(
        "{tool} keyvault secret show --vault-name {vault} --name {name}"
    ))
}

/// Build a `keyvault create` command from structured parameters.
pub fn build_vault_create_command(
    tool: &str,
    name: &str,
    resource_group: &str,
    subscription: Option<&str>,
) -> Result<String, ValidationError> {
    validate_resource_name(name)?;
    validate_resource_group(resource_group)?;
    let mut command = format!(
        "{tool} keyvault create --name {name} --resource-group {}",
        escape_shell_argument(resource_group)
    );
    if let Some(subscription) = subscription {
        validate_subscription_id(subscription)?;
        command.push_str(&format!(" --subscription {subscription}"));
    }
    Ok(command)
}
