//! # routeguard-api: Contract Validation for Axum
//!
//! Validates every routed request against the schemas declared for its
//! operation, and every response against the schema declared for its
//! status code. Violations never reach the handler or the client
//! unreported.
//!
//! ## Components
//!
//! | Module            | Role                                                    |
//! |-------------------|---------------------------------------------------------|
//! | [`repository`]    | Operation schema table: compiled validators per operation |
//! | [`context`]       | Resolves `(slot or status, operation)` to an artifact   |
//! | [`interceptor`]   | Before/after phases, framework-agnostic                 |
//! | [`middleware`]    | axum adapter for the interceptor                        |
//! | [`handler`]       | Translates exceptions into client-facing errors         |
//! | [`module`]        | Bootstrap: builds the immutable validation module       |
//! | [`openapi`]       | Derives route schemas from an OpenAPI 3 document        |
//!
//! ## Request Lifecycle
//!
//! ```text
//! TraceLayer → validation_middleware (before) → Handler → validation_middleware (after)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let module = ValidationModule::builder()
//!     .config(ValidationConfig::from_env()?)
//!     .route(RouteDescriptor::new("POST", "/cats"), schemas)
//!     .build()?;
//! let app = module.install(Router::new().route("/cats", post(create_cat)));
//! ```

pub mod config;
pub mod context;
pub mod demo;
pub mod error;
pub mod extractors;
pub mod handler;
pub mod interceptor;
pub mod middleware;
pub mod module;
pub mod openapi;
pub mod repository;

pub use config::ValidationConfig;
pub use context::ValidationContext;
pub use error::{AppError, BootstrapError, ValidationError, ValidationException, ValidationPhase};
pub use extractors::{ValidatedBody, ValidatedHeaders, ValidatedParams, ValidatedQuery, ValidatedRequest};
pub use handler::{LoggingErrorHandler, RejectingErrorHandler, ValidationErrorHandler};
pub use interceptor::{
    AxumTransport, RequestData, RequestReport, ResponseOutcome, TransportAdapter,
    ValidationInterceptor,
};
pub use module::{ValidationModule, ValidationModuleBuilder};
pub use repository::{LoadOptions, OperationValidators, ResponseSlot, SchemaRepository, StatusKey};
