//! The connection pipeline: authorize, resolve, compile, install, register, and the way back.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::catalog::{Catalog, StudentCode};
use crate::controller::{Controller, ControllerError};
use crate::flow::{self, CompileError};
use crate::install::{InstallError, Installer};
use crate::network::types::{AttachmentPoint, Endpoint, ValidationError};
use crate::network::{EndpointResolver, PathResolver, ResolveError, RouteError};
use crate::opts::PipelineOpts;
use crate::policy;
use crate::registry::{Connection, ConnectionRegistry, Handler, RegistryError};
use crate::request::{ConnectRequest, NotFoundError};

/// Grants and revokes access through a controller.
///
/// A `Pipeline` can be shared between threads. The registry lock is only held for bookkeeping,
/// never across a remote call.
#[derive(Debug)]
pub struct Pipeline<C> {
    controller: C,
    registry: Mutex<ConnectionRegistry>,
    opts: PipelineOpts,
}

impl<C: Controller + Sync> Pipeline<C> {
    pub fn new(controller: C, opts: PipelineOpts) -> Self {
        let registry = match opts.seed {
            Some(seed) => ConnectionRegistry::with_seed(seed),
            None => ConnectionRegistry::new(),
        };
        Self {
            controller,
            registry: Mutex::new(registry),
            opts,
        }
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn opts(&self) -> &PipelineOpts {
        &self.opts
    }

    /// Connects a student to a service.
    ///
    /// This function returns an error if the request names something the catalog does not have,
    /// if no course in session grants the access, or if the controller cannot locate the hosts,
    /// route between them or take all of the rules. On error no connection is registered and no
    /// rules are left installed, except those reported in [`InstallError::leaked`].
    pub fn connect(
        &self,
        catalog: &Catalog,
        request: &ConnectRequest,
    ) -> Result<Connection, Error> {
        let req = request.validate(catalog)?;
        let (student, server, service) = (req.student, req.server, req.service);

        let course = policy::authorizing_course(
            student.code,
            &server.name,
            &service.name,
            catalog.courses(),
        )
        .ok_or_else(|| Error::AuthorizationDenied {
            student: student.code,
            server: server.name.clone(),
            service: service.name.clone(),
        })?;
        log::debug!(
            "student {} authorized for {}/{} by course {}",
            student.code,
            server.name,
            service.name,
            course.code
        );

        let resolver = EndpointResolver::new(&self.controller);
        let src = resolver.resolve_by_mac(student.mac)?;
        let dst = resolver.resolve_by_ip(server.ip)?;
        log::debug!("endpoints resolved: {src} -> {dst}");

        let hops = PathResolver::new(&self.controller).resolve(&src, &dst)?;
        log::debug!("path resolved: {} hops", hops.len());

        let handler = self.registry.lock().allocate();
        let rules = match flow::compile(&handler, &hops, student.mac, server.ip, service) {
            Ok(rules) => rules,
            Err(e) => {
                self.registry.lock().abandon(&handler);
                return Err(e.into());
            }
        };
        log::debug!("{handler}: compiled {} rules", rules.len());

        let installer = Installer::new(&self.controller, self.opts.install_mode);
        let flows = match installer.install(&rules) {
            Ok(flows) => flows,
            Err(e) => {
                self.registry.lock().abandon(&handler);
                return Err(e.into());
            }
        };

        let created_at = Utc::now();
        let connection = Connection {
            handler,
            student: student.code,
            server: server.name.clone(),
            service: service.name.clone(),
            flows,
            created_at,
            // A lifetime past the end of representable time never expires.
            expires_at: self
                .opts
                .ttl
                .and_then(|ttl| created_at.checked_add_signed(ttl)),
        };
        let connection = self.registry.lock().create(connection)?.clone();
        log::info!(
            "{}: student {} connected to {}/{} ({} rules)",
            connection.handler,
            connection.student,
            connection.server,
            connection.service,
            connection.flows.len()
        );
        Ok(connection)
    }

    /// Tears a connection down. See [`disconnect_until`](Self::disconnect_until).
    pub fn disconnect(&self, handler: &Handler) -> Result<Teardown, Error> {
        self.disconnect_until(handler, &AtomicBool::new(false))
    }

    /// Tears a connection down unless `cancel` is set before the connection is unregistered.
    ///
    /// Once unregistered, every rule the connection owns is deleted, whatever happens to
    /// `cancel`. If some deletes fail the connection stays unregistered and
    /// [`Error::PartialTeardown`] lists the rules left behind.
    pub fn disconnect_until(
        &self,
        handler: &Handler,
        cancel: &AtomicBool,
    ) -> Result<Teardown, Error> {
        let connection = {
            let mut registry = self.registry.lock();
            if cancel.load(Ordering::SeqCst) {
                log::debug!("{handler}: teardown cancelled");
                return Err(Error::Cancelled(handler.clone()));
            }
            registry.remove(handler).map_err(|e| match e {
                RegistryError::UnknownHandler(h) => Error::NotFound(NotFoundError::Handler(h)),
                e => Error::Registry(e),
            })?
        };

        let installer = Installer::new(&self.controller, self.opts.install_mode);
        let report = installer.delete(&connection.flows);
        if !report.is_complete() {
            for (name, e) in &report.failed {
                log::error!("{handler}: rule {name} was not removed: {e}");
            }
            return Err(Error::PartialTeardown {
                handler: handler.clone(),
                deleted: report.deleted,
                failed: report.failed,
            });
        }
        log::info!("{handler}: torn down ({} rules)", report.deleted.len());
        Ok(Teardown {
            connection,
            deleted: report.deleted,
        })
    }

    /// Returns live connections in creation order.
    pub fn list(&self) -> Vec<Connection> {
        self.registry.lock().list()
    }

    /// Tears down every connection that has expired by `now`.
    pub fn expire(
        &self,
        now: DateTime<Utc>,
        cancel: &AtomicBool,
    ) -> Vec<(Handler, Result<Teardown, Error>)> {
        let expired = self.registry.lock().expired(now);
        expired
            .into_iter()
            .map(|handler| {
                log::info!("{handler}: expired");
                let res = self.disconnect_until(&handler, cancel);
                (handler, res)
            })
            .collect()
    }
}

/// A completed teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teardown {
    /// The connection as it was registered.
    pub connection: Connection,
    /// Rules deleted, in deletion order.
    pub deleted: Vec<String>,
}

/// Pipeline error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A malformed identifier.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A name the catalog or the registry does not know.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// No course in session grants the access.
    #[error("student {student} may not reach {service} on {server}")]
    AuthorizationDenied {
        student: StudentCode,
        server: String,
        service: String,
    },

    /// A host is missing from the controller's device inventory.
    #[error("cannot locate {0} on the fabric")]
    EndpointUnresolved(Endpoint),

    /// The controller could not be reached or refused a request.
    #[error("controller unavailable: {0}")]
    ControllerUnavailable(#[source] ControllerError),

    /// The controller returned no usable path.
    #[error("no route from {src} to {dst}")]
    RouteUnavailable {
        src: AttachmentPoint,
        dst: AttachmentPoint,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Install(#[from] InstallError),

    /// The connection is gone, but some of its rules are still on the controller.
    #[error("teardown of {handler} left {} rules on the controller", .failed.len())]
    PartialTeardown {
        handler: Handler,
        deleted: Vec<String>,
        failed: Vec<(String, ControllerError)>,
    },

    /// The teardown was cancelled before it started.
    #[error("teardown of {0} was cancelled")]
    Cancelled(Handler),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl Error {
    /// A short, stable name for the kind of error.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::AuthorizationDenied { .. } => "authorization_denied",
            Error::EndpointUnresolved(_) => "endpoint_unresolved",
            Error::ControllerUnavailable(_) => "controller_unavailable",
            Error::RouteUnavailable { .. } => "route_unavailable",
            Error::Compile(_) => "compile",
            Error::Install(_) => "install",
            Error::PartialTeardown { .. } => "partial_teardown",
            Error::Cancelled(_) => "cancelled",
            Error::Registry(_) => "registry",
        }
    }
}

impl From<ResolveError> for Error {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::NotFound(endpoint) => Error::EndpointUnresolved(endpoint),
            ResolveError::Controller(e) => Error::ControllerUnavailable(e),
        }
    }
}

impl From<RouteError> for Error {
    fn from(e: RouteError) -> Self {
        match e {
            RouteError::Unavailable { src, dst } => Error::RouteUnavailable { src, dst },
            RouteError::Controller(e) => Error::ControllerUnavailable(e),
        }
    }
}
