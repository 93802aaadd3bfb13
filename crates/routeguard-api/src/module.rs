//! # Validation Module
//!
//! Bootstrap entry point. [`ValidationModuleBuilder::build`] runs once at
//! startup:
//!
//! 1. Checks that the transport can honor fast serialization.
//! 2. Freezes and compiles the schema registry.
//! 3. Applies the operation identity to the declared routes and merges
//!    them with any explicit schema table.
//! 4. Compiles every per-operation schema into the repository.
//!
//! Any failure is a [`BootstrapError`] and the server must not start. The
//! resulting [`ValidationModule`] is immutable and shared as an `Arc`.

use std::sync::Arc;

use axum::Router;
use routeguard_core::{
    LoadError, MethodPathIdentity, OperationId, OperationIdentity, OperationSchemas,
    RouteDescriptor, RouteTable, SchemaTable,
};
use routeguard_schema::{SchemaCompiler, SchemaRegistry};
use serde_json::Value;

use crate::config::ValidationConfig;
use crate::context::ValidationContext;
use crate::error::BootstrapError;
use crate::handler::{RejectingErrorHandler, ValidationErrorHandler};
use crate::interceptor::{AxumTransport, TransportAdapter, ValidationInterceptor};
use crate::middleware::validation_middleware;
use crate::openapi;
use crate::repository::{LoadOptions, SchemaRepository};

/// Everything the middleware needs, built once at bootstrap.
pub struct ValidationModule {
    config: ValidationConfig,
    identity: Arc<dyn OperationIdentity>,
    interceptor: ValidationInterceptor,
}

impl ValidationModule {
    pub fn builder() -> ValidationModuleBuilder {
        ValidationModuleBuilder::default()
    }

    /// Operation id of a routed request, per the configured identity.
    pub fn operation_id(&self, route: &RouteDescriptor) -> OperationId {
        self.identity.operation_id(route)
    }

    pub fn interceptor(&self) -> &ValidationInterceptor {
        &self.interceptor
    }

    pub fn context(&self) -> &ValidationContext {
        self.interceptor.context()
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Wrap every route registered on `router` so far with the validation
    /// middleware. Routes added afterwards are not validated.
    pub fn install<S>(self: &Arc<Self>, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.route_layer(axum::middleware::from_fn_with_state(
            Arc::clone(self),
            validation_middleware,
        ))
    }
}

impl std::fmt::Debug for ValidationModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationModule")
            .field("config", &self.config)
            .field("operations", &self.context().repository().operation_ids())
            .finish_non_exhaustive()
    }
}

/// Collects the bootstrap inputs of a [`ValidationModule`].
#[derive(Default)]
pub struct ValidationModuleBuilder {
    config: ValidationConfig,
    identity: Option<Arc<dyn OperationIdentity>>,
    error_handler: Option<Arc<dyn ValidationErrorHandler>>,
    transport: Option<Arc<dyn TransportAdapter>>,
    registry: SchemaRegistry,
    routes: RouteTable,
    table: SchemaTable,
}

impl ValidationModuleBuilder {
    pub fn config(mut self, config: ValidationConfig) -> Self {
        self.config = config;
        self
    }

    /// Operation identity shared by route declaration and request lookup.
    /// Defaults to [`MethodPathIdentity`].
    pub fn identity(mut self, identity: impl OperationIdentity + 'static) -> Self {
        self.identity = Some(Arc::new(identity));
        self
    }

    /// Defaults to [`RejectingErrorHandler`].
    pub fn error_handler(mut self, handler: impl ValidationErrorHandler + 'static) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Defaults to [`AxumTransport`].
    pub fn transport(mut self, transport: impl TransportAdapter + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Replace the schema registry.
    pub fn registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Declare and define registry schemas in place.
    pub fn registry_mut(&mut self) -> &mut SchemaRegistry {
        &mut self.registry
    }

    /// Declare the schemas of one route.
    pub fn route(mut self, route: RouteDescriptor, schemas: OperationSchemas) -> Self {
        self.routes.push(route, schemas);
        self
    }

    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.routes.0.extend(routes.0);
        self
    }

    /// Add declarations already keyed by operation id. These win over
    /// route declarations resolving to the same id.
    pub fn table(mut self, table: SchemaTable) -> Self {
        for (id, schemas) in table.0 {
            self.table.insert(id, schemas);
        }
        self
    }

    /// Declare every operation of an OpenAPI 3 document, registering its
    /// component schemas.
    pub fn openapi(mut self, document: &Value) -> Result<Self, LoadError> {
        let routes = openapi::explore(document, &mut self.registry)?;
        self.routes.0.extend(routes.0);
        Ok(self)
    }

    pub fn build(self) -> Result<Arc<ValidationModule>, BootstrapError> {
        let transport: Arc<dyn TransportAdapter> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(AxumTransport),
        };
        if self.config.fast_serialization && !transport.supports_content_type_override() {
            return Err(BootstrapError::UnsupportedTransport {
                transport: transport.name(),
            });
        }

        let compiler = SchemaCompiler::new(self.config.compiler_options(), self.registry)?;

        let identity: Arc<dyn OperationIdentity> = match self.identity {
            Some(identity) => identity,
            None => Arc::new(MethodPathIdentity),
        };
        let mut table = self.routes.into_schema_table(identity.as_ref());
        for (id, schemas) in self.table.0 {
            table.insert(id, schemas);
        }

        let mut repository = SchemaRepository::new(compiler);
        repository.load(
            &table,
            LoadOptions {
                fast_serialization: self.config.fast_serialization,
            },
        )?;

        tracing::info!(
            operations = repository.len(),
            transport = transport.name(),
            fast_serialization = self.config.fast_serialization,
            strict = self.config.strict,
            "validation module ready"
        );

        let error_handler: Arc<dyn ValidationErrorHandler> = match self.error_handler {
            Some(handler) => handler,
            None => Arc::new(RejectingErrorHandler),
        };
        Ok(Arc::new(ValidationModule {
            config: self.config,
            identity,
            interceptor: ValidationInterceptor::new(ValidationContext::new(repository), error_handler),
        }))
    }
}
