//! Application configuration.

use clap::Args;

use parapet_spec::DocumentInfo;

pub const DEFAULT_OPENAPI_VERSION: &str = "3.0.2";
pub const DEFAULT_API_TITLE: &str = "Flask RESTAPI";
pub const DEFAULT_API_VERSION: &str = "0.1.0";
pub const DEFAULT_SPEC_URL: &str = "/api/spec.json";
pub const DEFAULT_SWAGGER_UI_URL: &str = "/docs";
pub const DEFAULT_SECRET_KEY: &str = "FlaskRESTAPIKey";
pub const DEFAULT_TOKEN_ALGORITHM: &str = "HS256";

/// Request bodies larger than this are rejected with 413 (1 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Settings for an [`Api`](crate::Api).
///
/// Every field can come from a flag or an environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ApiConfig {
    /// OpenAPI version written into the document.
    #[arg(long, env = "OPENAPI_VERSION", default_value = DEFAULT_OPENAPI_VERSION)]
    pub openapi_version: String,

    /// Document title.
    #[arg(long, env = "API_TITLE", default_value = DEFAULT_API_TITLE)]
    pub api_title: String,

    /// Document version.
    #[arg(long, env = "API_VERSION", default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    /// Where the JSON document is served.
    #[arg(long, env = "SPEC_URL", default_value = DEFAULT_SPEC_URL)]
    pub spec_url: String,

    /// Where the interactive reference is served.
    #[arg(long, env = "SWAGGER_UI_URL", default_value = DEFAULT_SWAGGER_UI_URL)]
    pub swagger_ui_url: String,

    /// Secret used to sign and verify bearer tokens.
    #[arg(
        long,
        env = "RESTAPI_SECRET_KEY",
        default_value = DEFAULT_SECRET_KEY,
        hide_env_values = true
    )]
    pub secret_key: String,

    /// Token signing algorithm (HS256, HS384 or HS512).
    #[arg(long, env = "RESTAPI_TOKEN_ALGORITHM", default_value = DEFAULT_TOKEN_ALGORITHM)]
    pub token_algorithm: String,

    /// Maximum request body size in bytes.
    #[arg(long, env = "RESTAPI_MAX_BODY_SIZE", default_value_t = DEFAULT_MAX_BODY_SIZE)]
    pub max_body_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            openapi_version: DEFAULT_OPENAPI_VERSION.to_string(),
            api_title: DEFAULT_API_TITLE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            spec_url: DEFAULT_SPEC_URL.to_string(),
            swagger_ui_url: DEFAULT_SWAGGER_UI_URL.to_string(),
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            token_algorithm: DEFAULT_TOKEN_ALGORITHM.to_string(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl ApiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_openapi_version(mut self, version: impl Into<String>) -> Self {
        self.openapi_version = version.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.api_title = title.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_spec_url(mut self, url: impl Into<String>) -> Self {
        self.spec_url = url.into();
        self
    }

    pub fn with_swagger_ui_url(mut self, url: impl Into<String>) -> Self {
        self.swagger_ui_url = url.into();
        self
    }

    pub fn with_secret_key(mut self, secret: impl Into<String>) -> Self {
        self.secret_key = secret.into();
        self
    }

    pub fn with_token_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.token_algorithm = algorithm.into();
        self
    }

    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Document metadata for the resolution pass.
    pub fn document_info(&self) -> DocumentInfo {
        DocumentInfo {
            openapi: self.openapi_version.clone(),
            title: self.api_title.clone(),
            version: self.api_version.clone(),
        }
    }
}
