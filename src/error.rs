//! Bus Error Types
//!
//! Error taxonomy for the event bus. Handler failures are isolated and never
//! reach `emit` callers; configuration and activation failures abort only the
//! operation that discovered them.

use std::time::Duration;
use thiserror::Error;

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Result type returned by event handlers
pub type HandlerResult = Result<(), HandlerError>;

/// Errors raised by bus operations
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum BusError {
    /// Pattern is not a dot-delimited name or the `*` wildcard
    #[error("Invalid event pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Module descriptor failed validation
    #[error("Invalid module descriptor '{module}': {reason}")]
    InvalidDescriptor { module: String, reason: String },

    /// Module id already registered
    #[error("Module already registered: {module}")]
    DuplicateModule { module: String },

    /// Module id not registered
    #[error("Module not found: {module}")]
    ModuleNotFound { module: String },

    /// Dependency names a module that was never registered
    #[error("Module '{module}' depends on unknown module '{dependency}'")]
    UnknownDependency { module: String, dependency: String },

    /// Dependency graph contains a cycle
    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    /// Declared subscription names a handler missing from the handler table
    #[error("Module '{module}' subscribes '{pattern}' to unknown handler '{handler}'")]
    UnresolvedHandler { module: String, pattern: String, handler: String },

    /// Descriptor version is not compatible with this bus
    #[error("Module '{module}' targets descriptor version {found} but bus supports {supported}")]
    IncompatibleDescriptor { module: String, found: u32, supported: u32 },

    /// Subscription limit reached
    #[error("Subscription limit reached ({limit})")]
    SubscriptionLimit { limit: usize },

    /// Module activation callback failed
    #[error("Activation of module '{module}' failed: {message}")]
    ActivationFailed { module: String, message: String },

    /// Module deactivation callback failed (the module was still torn down)
    #[error("Deactivation of module '{module}' reported an error: {message}")]
    DeactivationFailed { module: String, message: String },

    /// Lifecycle operation started from inside another one on the same task
    #[error("Cannot {operation} from inside a module lifecycle callback")]
    LifecycleReentry { operation: &'static str },

    /// Graceful shutdown exceeded its bound
    #[error("Shutdown timed out after {timeout:?}; still active: {active:?}; in flight: {in_flight}")]
    ShutdownTimeout { timeout: Duration, active: Vec<String>, in_flight: usize },

    /// Waiting for quiescence exceeded its bound
    #[error("Bus did not become quiescent within {timeout:?}; in flight: {in_flight}")]
    QuiescenceTimeout { timeout: Duration, in_flight: usize },
}

impl BusError {
    /// Create an invalid pattern error
    pub fn invalid_pattern<P: Into<String>, R: Into<String>>(pattern: P, reason: R) -> Self {
        Self::InvalidPattern { pattern: pattern.into(), reason: reason.into() }
    }

    /// Create an invalid descriptor error
    pub fn invalid_descriptor<M: Into<String>, R: Into<String>>(module: M, reason: R) -> Self {
        Self::InvalidDescriptor { module: module.into(), reason: reason.into() }
    }

    /// Create a duplicate module error
    pub fn duplicate_module<S: Into<String>>(module: S) -> Self {
        Self::DuplicateModule { module: module.into() }
    }

    /// Create a module not found error
    pub fn module_not_found<S: Into<String>>(module: S) -> Self {
        Self::ModuleNotFound { module: module.into() }
    }

    /// Create an unknown dependency error
    pub fn unknown_dependency<M: Into<String>, D: Into<String>>(module: M, dependency: D) -> Self {
        Self::UnknownDependency { module: module.into(), dependency: dependency.into() }
    }

    /// Create a dependency cycle error
    pub fn dependency_cycle(path: Vec<String>) -> Self {
        Self::DependencyCycle { path }
    }

    /// Create an activation failed error
    pub fn activation_failed<M: Into<String>, S: Into<String>>(module: M, message: S) -> Self {
        Self::ActivationFailed { module: module.into(), message: message.into() }
    }

    /// Create a deactivation failed error
    pub fn deactivation_failed<M: Into<String>, S: Into<String>>(module: M, message: S) -> Self {
        Self::DeactivationFailed { module: module.into(), message: message.into() }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::InvalidPattern { .. } => "invalid_pattern",
            BusError::InvalidDescriptor { .. } => "invalid_descriptor",
            BusError::DuplicateModule { .. } => "duplicate_module",
            BusError::ModuleNotFound { .. } => "module_not_found",
            BusError::UnknownDependency { .. } => "unknown_dependency",
            BusError::DependencyCycle { .. } => "dependency_cycle",
            BusError::UnresolvedHandler { .. } => "unresolved_handler",
            BusError::IncompatibleDescriptor { .. } => "incompatible_descriptor",
            BusError::SubscriptionLimit { .. } => "subscription_limit",
            BusError::ActivationFailed { .. } => "activation_failed",
            BusError::DeactivationFailed { .. } => "deactivation_failed",
            BusError::LifecycleReentry { .. } => "lifecycle_reentry",
            BusError::ShutdownTimeout { .. } => "shutdown_timeout",
            BusError::QuiescenceTimeout { .. } => "quiescence_timeout",
        }
    }

    /// Check if error is a configuration issue
    pub fn is_configuration_error(&self) -> bool {
        matches!(self,
            BusError::InvalidPattern { .. } |
            BusError::InvalidDescriptor { .. } |
            BusError::DuplicateModule { .. } |
            BusError::ModuleNotFound { .. } |
            BusError::UnknownDependency { .. } |
            BusError::DependencyCycle { .. } |
            BusError::UnresolvedHandler { .. } |
            BusError::IncompatibleDescriptor { .. } |
            BusError::SubscriptionLimit { .. }
        )
    }

    /// Check if error came from a module lifecycle callback
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(self,
            BusError::ActivationFailed { .. } |
            BusError::DeactivationFailed { .. } |
            BusError::LifecycleReentry { .. }
        )
    }

    /// Check if error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self,
            BusError::ShutdownTimeout { .. } |
            BusError::QuiescenceTimeout { .. }
        )
    }
}

/// Errors returned by event handlers and module callbacks
#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    /// Handler could not process the event
    #[error("Handler failed: {message}")]
    Failed { message: String },

    /// Handler panicked while processing the event
    #[error("Handler panicked: {message}")]
    Panicked { message: String },

    /// Payload did not have the shape the handler expected
    #[error("Invalid payload: {message}")]
    InvalidPayload { message: String },
}

impl HandlerError {
    /// Create a handler failure
    pub fn failed<S: Into<String>>(message: S) -> Self {
        Self::Failed { message: message.into() }
    }

    /// Create a panic report
    pub fn panicked<S: Into<String>>(message: S) -> Self {
        Self::Panicked { message: message.into() }
    }

    /// Create an invalid payload error
    pub fn invalid_payload<S: Into<String>>(message: S) -> Self {
        Self::InvalidPayload { message: message.into() }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::invalid_payload(format!("JSON error: {}", err))
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::failed(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BusError::module_not_found("inventory");
        assert_eq!(error.to_string(), "Module not found: inventory");

        let cycle = BusError::dependency_cycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(cycle.to_string(), "Dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn test_error_classification() {
        let config_error = BusError::unknown_dependency("orders", "payments");
        assert!(config_error.is_configuration_error());
        assert!(!config_error.is_lifecycle_error());

        let reentry = BusError::LifecycleReentry { operation: "activate a module" };
        assert!(reentry.is_lifecycle_error());
        assert_eq!(reentry.to_string(), "Cannot activate a module from inside a module lifecycle callback");

        let activation = BusError::activation_failed("orders", "db offline");
        assert!(activation.is_lifecycle_error());
        assert!(!activation.is_configuration_error());

        let timeout = BusError::ShutdownTimeout {
            timeout: Duration::from_millis(10),
            active: vec!["orders".into()],
            in_flight: 2,
        };
        assert!(timeout.is_timeout());
        assert!(!timeout.is_lifecycle_error());
    }

    #[test]
    fn test_error_labels_are_distinct() {
        let errors = vec![
            BusError::invalid_pattern("a..b", "empty segment"),
            BusError::invalid_descriptor("", "empty id"),
            BusError::duplicate_module("a"),
            BusError::module_not_found("a"),
            BusError::unknown_dependency("a", "b"),
            BusError::dependency_cycle(vec![]),
            BusError::activation_failed("a", "boom"),
            BusError::deactivation_failed("a", "boom"),
            BusError::QuiescenceTimeout { timeout: Duration::ZERO, in_flight: 0 },
            BusError::LifecycleReentry { operation: "activate a module" },
        ];

        let labels: std::collections::HashSet<_> = errors.iter().map(|e| e.as_label()).collect();
        assert_eq!(labels.len(), errors.len());
    }

    #[test]
    fn test_handler_error_conversions() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let handler_error: HandlerError = json_error.into();
        assert!(matches!(handler_error, HandlerError::InvalidPayload { .. }));

        let any_error: HandlerError = anyhow::anyhow!("upstream unavailable").into();
        assert!(any_error.to_string().contains("upstream unavailable"));
    }
}
