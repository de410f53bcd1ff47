//! OpenAPI document aggregation for annotated HTTP handlers.
//!
//! Handlers contribute schema annotations (parameters, bodies, responses,
//! tags, auth) to a [`Registry`] keyed by logical endpoint name and method.
//! At startup the registry is resolved against the host router's URL table
//! into a single [`SpecDocument`].

pub mod error;
pub mod model;
pub mod path;
pub mod registry;
pub mod resolve;
pub mod schema;

pub use error::SpecError;
pub use model::{
    Components, ExternalDocs, Info, MediaType, Operation, Parameter, ParameterLocation,
    RequestBody, Response, SchemaRef, SecurityScheme, SpecDocument, Tag,
};
pub use path::{join_rule, normalize_path, normalize_rule, rewrite_rule};
pub use registry::{derive_endpoint_name, BlueprintRemap, EndpointKey, Registry};
pub use resolve::{DocumentInfo, RouteTable, UrlRoute};
pub use schema::{Schema, SchemaDescriptor};
