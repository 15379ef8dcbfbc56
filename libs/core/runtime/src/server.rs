//! The service orchestrator.
//!
//! A run moves through telemetry bootstrap, binding and serving, and ends on
//! the first terminal event: either listener task finishing, or the caller's
//! shutdown future resolving. Surviving tasks are aborted and awaited, then
//! the shutdown chain is drained exactly once.

use crate::config::ServiceConfig;
use crate::error::RunError;
use crate::gateway::Gateway;
use crate::register::{GatewayChannel, GatewayRegisterFn, RpcRegisterFn, ShutdownHook};
use crate::signal::shutdown_signal;
use core_config::Environment;
use core_config::tracing::init_tracing_with_layer;
use grpc_core::server::{health_service, make_rpc_span, mark_serving};
use grpc_core::{
    JwksResolver, JwtAuthInterceptor, RegisteredClaims, ServerSecurity, SharedInterceptor,
};
use observability::{BoxError, ShutdownChain, ShutdownError, ShutdownFailure, Telemetry};
use opentelemetry_sdk::trace::SdkTracer;
use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::service::{InterceptorLayer, Routes, RoutesBuilder};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// A gRPC service plus its HTTP gateway, run as one unit.
///
/// # Example
/// ```ignore
/// use service_runtime::{Server, ServiceConfig};
/// use core_config::FromEnv;
///
/// let server = Server::new(ServiceConfig::from_env()?)
///     .register_rpc(|routes| {
///         routes.add_service(OrdersServer::new(OrdersService::default()));
///         Ok(())
///     })
///     .register_gateway(|router, channel| {
///         Ok(router.route("/orders", get(list_orders)).with_state(OrdersClient::new(channel)))
///     });
///
/// server.run_until_signal().await?;
/// ```
pub struct Server {
    config: ServiceConfig,
    rpc_register: Option<RpcRegisterFn>,
    gateway_register: Option<GatewayRegisterFn>,
    authenticator: Option<SharedInterceptor>,
    shutdown_hooks: Vec<(String, ShutdownHook)>,
    telemetry: RwLock<Option<Telemetry>>,
}

/// RPC listener bound and ready to serve.
struct BoundRpc {
    listener: TcpListener,
    local_addr: SocketAddr,
    routes: Routes,
    security: Option<ServerSecurity>,
    interceptor: SharedInterceptor,
}

impl Server {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            rpc_register: None,
            gateway_register: None,
            authenticator: None,
            shutdown_hooks: Vec::new(),
            telemetry: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Set the callback that adds RPC handlers.
    pub fn register_rpc<F>(mut self, register: F) -> Self
    where
        F: Fn(&mut RoutesBuilder) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.rpc_register = Some(Arc::new(register));
        self
    }

    /// Set the callback that adds gateway routes.
    pub fn register_gateway<F>(mut self, register: F) -> Self
    where
        F: Fn(axum::Router, GatewayChannel) -> Result<axum::Router, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.gateway_register = Some(Arc::new(register));
        self
    }

    /// Authenticate RPC calls with `interceptor` instead of the key sets in
    /// `jwk_urls`.
    pub fn with_authenticator<I>(mut self, interceptor: I) -> Self
    where
        I: tonic::service::Interceptor + Clone + Send + Sync + 'static,
    {
        self.authenticator = Some(SharedInterceptor::new(interceptor));
        self
    }

    /// Add a teardown step run on every exit path, before the telemetry
    /// pipelines are flushed.
    pub fn on_shutdown<F>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.shutdown_hooks.push((name.into(), Arc::new(hook)));
        self
    }

    /// Telemetry handles of the current or last run.
    pub fn telemetry(&self) -> Option<Telemetry> {
        self.telemetry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Tracer from the current run's pipeline, if tracing is exported.
    pub fn tracer(&self, name: impl Into<Cow<'static, str>>) -> Option<SdkTracer> {
        self.telemetry().and_then(|t| t.tracer(name))
    }

    /// Run until SIGINT or SIGTERM.
    pub async fn run_until_signal(&self) -> Result<(), RunError> {
        self.run(shutdown_signal()).await
    }

    /// Run until a listener stops or `shutdown` resolves.
    ///
    /// Returns `Ok(())` only when a listener finished cleanly, or when the
    /// RPC listener is disabled. Cancellation through `shutdown` yields
    /// [`RunError::Cancelled`]. Shutdown failures are never dropped: they are
    /// returned alone or together with the error that ended the run.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), RunError>
    where
        F: Future<Output = ()> + Send,
    {
        let mut chain = ShutdownChain::new();
        for (name, hook) in &self.shutdown_hooks {
            let hook = hook.clone();
            chain.push(name.clone(), move || hook());
        }

        let outcome = self.run_inner(shutdown, &mut chain).await;
        if let Err(e) = &outcome {
            if !e.is_cancelled() {
                error!(error = %e, "Service stopped with error");
            }
        }

        RunError::combine(outcome, drain(chain).await)
    }

    async fn run_inner<F>(&self, shutdown: F, chain: &mut ShutdownChain) -> Result<(), RunError>
    where
        F: Future<Output = ()> + Send,
    {
        self.init_telemetry(chain)?;

        if self.config.rpc.disabled {
            info!("RPC listener disabled, nothing to serve");
            return Ok(());
        }

        let rpc = self.bind_rpc().await?;
        let rpc_local_addr = rpc.local_addr;
        let mut tasks = JoinSet::new();
        let mut names = HashMap::new();

        let handle = tasks.spawn(serve_rpc(self.config.service_name.clone(), rpc));
        names.insert(handle.id(), "rpc");

        if self.config.gateway.endpoint.disabled {
            debug!("HTTP gateway disabled");
        } else {
            let gateway = Gateway {
                service_name: self.config.service_name.clone(),
                config: self.config.gateway.clone(),
                rpc_tls: self.config.rpc.tls.clone(),
                rpc_address: self.config.rpc.address.clone(),
                rpc_local_addr,
                register: self.gateway_register.clone(),
            };
            let handle = tasks.spawn(gateway.serve());
            names.insert(handle.id(), "gateway");
        }

        tokio::pin!(shutdown);
        let outcome = tokio::select! {
            Some(joined) = tasks.join_next_with_id() => match joined {
                Ok((id, result)) => {
                    info!(component = names.get(&id).copied().unwrap_or("task"), "Listener stopped");
                    result
                }
                Err(e) => Err(RunError::Task {
                    component: names.get(&e.id()).copied().unwrap_or("task"),
                    source: e,
                }),
            },
            () = &mut shutdown => {
                info!("Shutdown requested");
                Err(RunError::Cancelled)
            }
        };

        tasks.shutdown().await;
        outcome
    }

    fn init_telemetry(&self, chain: &mut ShutdownChain) -> Result<(), RunError> {
        let mut bootstrap = ShutdownChain::new();
        let telemetry = Telemetry::init(
            &self.config.telemetry,
            &self.config.service_name,
            &mut bootstrap,
        )?;
        chain.append(&mut bootstrap);

        let layer = telemetry.tracing_layer();
        let bridged = layer.is_some();
        if !init_tracing_with_layer(&Environment::from_env(), layer) && bridged {
            warn!("Tracing subscriber already installed, telemetry layer not mounted");
        }

        *self
            .telemetry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(telemetry);
        Ok(())
    }

    async fn bind_rpc(&self) -> Result<BoundRpc, RunError> {
        let address = self.config.rpc.address.trim();
        if address.is_empty() {
            return Err(RunError::Config("rpc address is empty".to_string()));
        }

        let security = ServerSecurity::from_config(&self.config.rpc.tls)?;
        let interceptor = self.interceptor().await?;

        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| RunError::Bind {
                addr: address.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| RunError::Bind {
            addr: address.to_string(),
            source,
        })?;

        let (health_reporter, health) = health_service();
        let mut routes = RoutesBuilder::default();
        routes.add_service(health);

        if let Some(register) = &self.rpc_register {
            register(&mut routes).map_err(|source| RunError::Registration {
                component: "rpc",
                source,
            })?;
        }
        mark_serving(&health_reporter, &[self.config.service_name.as_str()]).await;

        Ok(BoundRpc {
            listener,
            local_addr,
            routes: routes.routes(),
            security,
            interceptor,
        })
    }

    async fn interceptor(&self) -> Result<SharedInterceptor, RunError> {
        if let Some(authenticator) = &self.authenticator {
            return Ok(authenticator.clone());
        }

        if self.config.jwk_urls.is_empty() {
            return Ok(SharedInterceptor::pass_through());
        }

        let keys = JwksResolver::fetch(&self.config.jwk_urls, self.config.auth.refresh_interval())
            .await?;
        let auth = JwtAuthInterceptor::<RegisteredClaims>::new(Arc::new(keys), self.config.auth.clone());
        Ok(SharedInterceptor::new(auth))
    }
}

async fn serve_rpc(service_name: String, rpc: BoundRpc) -> Result<(), RunError> {
    let mut builder = tonic::transport::Server::builder();
    let tls = match rpc.security {
        Some(security) => {
            let mode = if security.is_mutual() { "mutual" } else { "server" };
            builder = builder
                .tls_config(security.into_inner())
                .map_err(|e| RunError::Config(format!("invalid RPC TLS configuration: {e}")))?;
            mode
        }
        None => "disabled",
    };

    info!(
        addr = %rpc.local_addr,
        service = %service_name,
        tls,
        authenticated = !rpc.interceptor.is_pass_through(),
        "gRPC server starting"
    );

    builder
        .layer(TraceLayer::new_for_grpc().make_span_with(make_rpc_span))
        .layer(InterceptorLayer::new(rpc.interceptor))
        .add_routes(rpc.routes)
        .serve_with_incoming(TcpListenerStream::new(rpc.listener))
        .await
        .map_err(|e| RunError::Serve {
            component: "rpc",
            source: Box::new(e),
        })
}

/// Drain the chain off the async runtime; provider shutdown blocks on
/// exporter flushes.
async fn drain(mut chain: ShutdownChain) -> Result<(), ShutdownError> {
    match tokio::task::spawn_blocking(move || chain.shutdown()).await {
        Ok(result) => result,
        Err(e) => Err(ShutdownError {
            failures: vec![ShutdownFailure {
                component: "shutdown chain".to_string(),
                message: e.to_string(),
            }],
        }),
    }
}
