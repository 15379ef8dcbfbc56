//! Registration callbacks through which a service plugs into the runtime.

use grpc_core::TraceContextInterceptor;
use observability::BoxError;
use std::sync::Arc;
use tonic::service::RoutesBuilder;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::Channel;

/// Channel handed to the gateway callback: a lazily connected channel to the
/// service's own RPC listener that propagates the caller's trace context.
pub type GatewayChannel = InterceptedService<Channel, TraceContextInterceptor>;

/// Adds the service's RPC handlers. Invoked once per run, after the RPC
/// listener is bound and before it serves.
pub type RpcRegisterFn = Arc<dyn Fn(&mut RoutesBuilder) -> Result<(), BoxError> + Send + Sync>;

/// Adds HTTP routes translating to RPC calls over the given channel. Invoked
/// once per run, before the gateway listener is bound.
pub type GatewayRegisterFn =
    Arc<dyn Fn(axum::Router, GatewayChannel) -> Result<axum::Router, BoxError> + Send + Sync>;

/// Caller-supplied teardown run when the server stops.
pub(crate) type ShutdownHook = Arc<dyn Fn() -> Result<(), BoxError> + Send + Sync>;
