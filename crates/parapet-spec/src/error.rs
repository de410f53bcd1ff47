use thiserror::Error;

/// Errors produced while registering annotations or resolving routes (E2001–E2004).
///
/// All of these are startup-time failures: an application that hits one
/// should refuse to serve rather than publish an incomplete document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// E2001: A schema used in an annotation has no title to reference it by.
    #[error("E2001: schema has no title ({context})")]
    MissingTitle { context: String },

    /// E2002: An annotated endpoint is not served by any route.
    #[error("E2002: endpoint '{endpoint}' ({method}) is not bound to any route")]
    UnresolvedEndpoint { endpoint: String, method: String },

    /// E2003: A documented route has no annotated endpoint.
    #[error("E2003: route '{rule}' points at endpoint '{endpoint}' which has no annotations")]
    UnmatchedRoute { rule: String, endpoint: String },

    /// E2004: A route template could not be parsed.
    #[error("E2004: malformed route template '{rule}': {reason}")]
    MalformedRule { rule: String, reason: String },
}
