//! Schema-validated request binding and OpenAPI documents for axum services.
//!
//! Operations are declared through an [`OperationBuilder`]: each annotation
//! (path, query, header, body, form, auth, response, tag...) contributes to
//! the OpenAPI document at definition time and adds a validation step to the
//! request pipeline. At startup [`Api::into_router`] reconciles the annotated
//! endpoints with the mounted routes, refuses to start on any mismatch, and
//! serves the document and an interactive reference next to the API.
//!
//! ```ignore
//! let mut api = Api::new(ApiConfig::default())?;
//! let op = api
//!     .operation("item", Method::GET)
//!     .path::<ItemPath>()
//!     .response::<Item>(200)
//!     .handle(show_item)?;
//! api.route("/items/<int:id>", op)?;
//! let router = api.into_router()?;
//! ```

pub mod api;
pub mod blueprint;
pub mod config;
pub mod demo;
mod docs;
pub mod error;
pub mod operation;
pub mod params;
mod pipeline;
pub mod reply;
pub mod scaffold;
pub mod token;

pub use api::Api;
pub use blueprint::Blueprint;
pub use config::ApiConfig;
pub use error::{ApiError, ApiException, ErrorTranslator};
pub use operation::{Operation, OperationBuilder};
pub use params::{Parameters, UploadedFile};
pub use reply::Reply;
pub use scaffold::{create_service, ScaffoldError};
pub use token::{Claims, TokenCodec, TokenError, DEFAULT_TOKEN_EXPIRY};

pub use parapet_spec::{Schema, SchemaDescriptor, SpecDocument, SpecError, Tag};
pub use parapet_validator::{FieldError, Validate, ValidationErrors};
