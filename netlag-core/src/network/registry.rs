//! Single install point for the application's transports.
//!
//! Application code performs requests through a [`TransportRegistry`]
//! instead of holding transports directly. An [`Interceptor`] can wrap the
//! installed transports; the returned [`RestoreHandle`] puts the exact
//! originals back.

use std::sync::Arc;

use parking_lot::RwLock;

use super::{HttpRequest, HttpResponse, HttpTransport, RequestFactory, RequestObject, TransportError};

/// Wraps installed transports with replacements.
pub trait Interceptor {
    /// Returns the transport to install in place of `original`.
    fn intercept_transport(&self, original: Arc<dyn HttpTransport>) -> Arc<dyn HttpTransport>;

    /// Returns the request factory to install in place of `original`.
    fn intercept_requests(&self, original: Arc<dyn RequestFactory>) -> Arc<dyn RequestFactory>;
}

#[derive(Clone)]
struct InstalledTransports {
    transport: Arc<dyn HttpTransport>,
    requests: Arc<dyn RequestFactory>,
}

/// Cloneable handle to the currently installed transports.
#[derive(Clone)]
pub struct TransportRegistry {
    installed: Arc<RwLock<InstalledTransports>>,
}

impl TransportRegistry {
    /// Creates a registry with the given fetch transport and request factory.
    pub fn new(transport: Arc<dyn HttpTransport>, requests: Arc<dyn RequestFactory>) -> Self {
        Self {
            installed: Arc::new(RwLock::new(InstalledTransports {
                transport,
                requests,
            })),
        }
    }

    /// Currently installed fetch transport.
    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::clone(&self.installed.read().transport)
    }

    /// Currently installed request factory.
    pub fn request_factory(&self) -> Arc<dyn RequestFactory> {
        Arc::clone(&self.installed.read().requests)
    }

    /// Performs a request through the installed fetch transport.
    ///
    /// # Errors
    ///
    /// - `TransportError` - Whatever the installed transport returns
    pub async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let transport = self.transport();
        transport.fetch(request).await
    }

    /// Creates a request object from the installed factory.
    pub fn create_request(&self) -> Box<dyn RequestObject> {
        self.request_factory().create()
    }

    /// Replaces the installed transports with the interceptor's wrappers.
    ///
    /// The currently installed transports become the originals captured by
    /// the returned handle.
    pub fn install(&self, interceptor: &dyn Interceptor) -> RestoreHandle {
        let mut installed = self.installed.write();
        let originals = installed.clone();

        installed.transport = interceptor.intercept_transport(Arc::clone(&originals.transport));
        installed.requests = interceptor.intercept_requests(Arc::clone(&originals.requests));

        RestoreHandle {
            registry: self.clone(),
            originals,
        }
    }
}

/// Captured originals of an [`TransportRegistry::install`] call.
#[must_use = "dropping the handle leaves the interceptor installed with no way to restore"]
pub struct RestoreHandle {
    registry: TransportRegistry,
    originals: InstalledTransports,
}

impl RestoreHandle {
    /// Original fetch transport captured at install time.
    pub fn original_transport(&self) -> &Arc<dyn HttpTransport> {
        &self.originals.transport
    }

    /// Original request factory captured at install time.
    pub fn original_request_factory(&self) -> &Arc<dyn RequestFactory> {
        &self.originals.requests
    }

    /// Reinstalls the originals.
    pub fn restore(self) {
        *self.registry.installed.write() = self.originals;
    }
}
