//! Endpoints and connection factories.
//!
//! An [`Endpoint`] names what an initiator should pair with: a specific
//! acceptor or a [`Listener`], which creates a fresh acceptor per connection.
//! Its [`ConnectionFactory`] builds the initiator.
//!
//! # Example
//!
//! ```ignore
//! use message_endpoint::{Endpoint, PairedConnectionFactory, CountedFailure, LifecycleLocation};
//!
//! let factory = PairedConnectionFactory::builder()
//!     .max_connections(1)
//!     .error_policy(CountedFailure::once(LifecycleLocation::Send).recoverable(true))
//!     .build();
//!
//! let endpoint = Endpoint::new(listener.clone(), Arc::new(factory));
//! let connection = endpoint.connect()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::fault::{ErrorPolicy, NoFailure};
use crate::options::TransportOptions;
use crate::protocol::ProtocolType;

use super::connection::{Connection, Role};
use super::listener::Listener;
use super::registry::ConnectionRegistry;

// ============================================================================
// Types
// ============================================================================

/// Produces a fresh policy instance for each connection.
type PolicyTemplate = Arc<dyn Fn() -> Box<dyn ErrorPolicy> + Send + Sync>;

/// Hook invoked with every connection a factory creates.
pub type ConnectionCreatedHook = Arc<dyn Fn(&Connection) + Send + Sync>;

// ============================================================================
// EndpointTarget
// ============================================================================

/// What an initiator pairs with.
#[derive(Debug, Clone)]
pub enum EndpointTarget {
    /// A specific acceptor.
    Acceptor(Connection),
    /// A listener; each initiator gets its own acceptor.
    Listener(Listener),
}

impl From<Connection> for EndpointTarget {
    fn from(connection: Connection) -> Self {
        Self::Acceptor(connection)
    }
}

impl From<Listener> for EndpointTarget {
    fn from(listener: Listener) -> Self {
        Self::Listener(listener)
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// Identity and factory binding for initiator connections.
#[derive(Clone)]
pub struct Endpoint {
    id: String,
    target: EndpointTarget,
    protocol: ProtocolType,
    factory: Arc<dyn ConnectionFactory>,
}

impl Endpoint {
    /// Creates an endpoint with a random id and the default protocol.
    #[must_use]
    pub fn new(target: impl Into<EndpointTarget>, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            target: target.into(),
            protocol: ProtocolType::default(),
            factory,
        }
    }

    /// Sets the endpoint id.
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the protocol kind.
    #[inline]
    #[must_use]
    pub fn with_protocol(mut self, protocol: ProtocolType) -> Self {
        self.protocol = protocol;
        self
    }

    /// Returns the endpoint id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the target.
    #[inline]
    #[must_use]
    pub fn target(&self) -> &EndpointTarget {
        &self.target
    }

    /// Returns the protocol kind.
    #[inline]
    #[must_use]
    pub fn protocol(&self) -> ProtocolType {
        self.protocol
    }

    /// Creates an initiator through the endpoint's factory.
    ///
    /// # Errors
    ///
    /// Whatever the factory returns; see [`PairedConnectionFactory`].
    pub fn connect(&self) -> Result<Connection> {
        self.factory.create_connection(self)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionFactory
// ============================================================================

/// Builds initiator connections for endpoints.
pub trait ConnectionFactory: Send + Sync {
    /// Creates an initiator paired with the endpoint's target.
    ///
    /// # Errors
    ///
    /// Implementation-defined; failures are hard preconditions, not transport
    /// errors.
    fn create_connection(&self, endpoint: &Endpoint) -> Result<Connection>;
}

// ============================================================================
// PairedConnectionFactory
// ============================================================================

/// Factory creating in-process initiators.
///
/// Every initiator gets a fresh copy of the configured error policy, so fault
/// counters never leak between connections.
pub struct PairedConnectionFactory {
    max_connections: Option<usize>,
    policy: PolicyTemplate,
    registry: Option<ConnectionRegistry>,
    on_created: Option<ConnectionCreatedHook>,
    created: AtomicUsize,
}

impl PairedConnectionFactory {
    /// Creates a factory with no cap and no faults.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> PairedConnectionFactoryBuilder {
        PairedConnectionFactoryBuilder::new()
    }

    /// Creates a factory from serialized options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the options are inconsistent.
    pub fn from_options(options: &TransportOptions) -> Result<Self> {
        options.validate()?;

        let mut builder = Self::builder();
        if let Some(max) = options.max_connections {
            builder = builder.max_connections(max);
        }
        if let Some(fault) = &options.fault {
            builder = builder.error_policy(fault.policy());
        }
        Ok(builder.build())
    }

    /// Returns the number of connections created so far.
    #[inline]
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    /// Reserves a slot under the cap.
    fn reserve(&self) -> Result<usize> {
        let max = self.max_connections;
        self.created
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| match max {
                Some(limit) if count >= limit => None,
                _ => Some(count + 1),
            })
            .map(|previous| previous + 1)
            .map_err(|count| Error::too_many_connections(max.unwrap_or(count), count + 1))
    }
}

impl Default for PairedConnectionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionFactory for PairedConnectionFactory {
    fn create_connection(&self, endpoint: &Endpoint) -> Result<Connection> {
        let number = self.reserve()?;

        let acceptor = match endpoint.target() {
            EndpointTarget::Acceptor(acceptor) if acceptor.role() == Role::Acceptor => {
                acceptor.clone()
            }
            EndpointTarget::Acceptor(other) => {
                self.created.fetch_sub(1, Ordering::AcqRel);
                return Err(Error::config(format!(
                    "endpoint {} targets {}, which is not an acceptor",
                    endpoint.id(),
                    other.id()
                )));
            }
            EndpointTarget::Listener(listener) => listener.acceptor(),
        };

        let name = format!("{}-initiator-{number}", endpoint.id());
        let connection = Connection::initiator(name, acceptor, (self.policy)());

        debug!(
            connection = %connection.id(),
            endpoint = endpoint.id(),
            protocol = %endpoint.protocol(),
            number,
            "Created initiator"
        );

        if let Some(registry) = &self.registry {
            registry.register(&connection);
        }
        if let Some(hook) = &self.on_created {
            hook(&connection);
        }

        Ok(connection)
    }
}

impl fmt::Debug for PairedConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairedConnectionFactory")
            .field("max_connections", &self.max_connections)
            .field("policy", &(self.policy)())
            .field("created", &self.created())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PairedConnectionFactoryBuilder
// ============================================================================

/// Builder for [`PairedConnectionFactory`].
#[derive(Clone)]
pub struct PairedConnectionFactoryBuilder {
    max_connections: Option<usize>,
    policy: PolicyTemplate,
    registry: Option<ConnectionRegistry>,
    on_created: Option<ConnectionCreatedHook>,
}

impl PairedConnectionFactoryBuilder {
    /// Creates a builder with no cap and no faults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_connections: None,
            policy: Arc::new(|| Box::new(NoFailure) as Box<dyn ErrorPolicy>),
            registry: None,
            on_created: None,
        }
    }

    /// Caps the number of connections; the next one fails with
    /// [`Error::TooManyConnections`].
    #[inline]
    #[must_use]
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Sets the policy each initiator starts from.
    #[must_use]
    pub fn error_policy<P>(mut self, policy: P) -> Self
    where
        P: ErrorPolicy + Clone + Sync + 'static,
    {
        self.policy = Arc::new(move || Box::new(policy.clone()) as Box<dyn ErrorPolicy>);
        self
    }

    /// Records every initiator in `registry`.
    #[inline]
    #[must_use]
    pub fn registry(mut self, registry: ConnectionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Invokes `hook` with every initiator created.
    #[must_use]
    pub fn on_connection_created<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Connection) + Send + Sync + 'static,
    {
        self.on_created = Some(Arc::new(hook));
        self
    }

    /// Builds the factory.
    #[must_use]
    pub fn build(self) -> PairedConnectionFactory {
        PairedConnectionFactory {
            max_connections: self.max_connections,
            policy: self.policy,
            registry: self.registry,
            on_created: self.on_created,
            created: AtomicUsize::new(0),
        }
    }
}

impl Default for PairedConnectionFactoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PairedConnectionFactoryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairedConnectionFactoryBuilder")
            .field("max_connections", &self.max_connections)
            .field("registry", &self.registry.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::fault::{CountedFailure, LifecycleLocation};
    use crate::options::FaultSpec;

    #[tokio::test]
    async fn test_connect_pairs_with_acceptor() {
        let acceptor = Connection::acceptor("server");
        let endpoint = Endpoint::new(acceptor.clone(), Arc::new(PairedConnectionFactory::new()))
            .with_id("ep");

        let connection = endpoint.connect().expect("connection");
        assert_eq!(connection.role(), Role::Initiator);
        assert_eq!(connection.peer_id(), Some(acceptor.id()));
        assert!(connection.name().starts_with("ep-initiator-"));
    }

    #[tokio::test]
    async fn test_max_connections_enforced() {
        let factory = Arc::new(PairedConnectionFactory::builder().max_connections(1).build());
        let endpoint = Endpoint::new(Connection::acceptor("server"), factory.clone());

        assert!(endpoint.connect().is_ok());
        let second = endpoint.connect();
        assert!(matches!(
            second,
            Err(Error::TooManyConnections { limit: 1, attempted: 2 })
        ));
        assert_eq!(factory.created(), 1);
    }

    #[tokio::test]
    async fn test_initiator_target_rejected() {
        let factory = Arc::new(PairedConnectionFactory::new());
        let acceptor = Connection::acceptor("server");
        let initiator = Endpoint::new(acceptor, factory.clone()).connect().expect("initiator");

        let result = Endpoint::new(initiator, factory.clone()).connect();
        assert!(matches!(result, Err(Error::Config { .. })));
        assert_eq!(factory.created(), 1);
    }

    #[tokio::test]
    async fn test_hook_and_registry_see_connections() {
        let registry = ConnectionRegistry::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);

        let factory = PairedConnectionFactory::builder()
            .registry(registry.clone())
            .on_connection_created(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        let endpoint = Endpoint::new(Connection::acceptor("server"), Arc::new(factory));
        let _first = endpoint.connect().expect("first");
        let _second = endpoint.connect().expect("second");

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_from_options_applies_fault() {
        let options = TransportOptions::new()
            .with_max_connections(3)
            .with_fault(FaultSpec::always(LifecycleLocation::Connect));
        let factory = PairedConnectionFactory::from_options(&options).expect("factory");

        let endpoint = Endpoint::new(Connection::acceptor("server"), Arc::new(factory));
        let connection = endpoint.connect().expect("connection");

        let (sink, _events) = crate::transport::sink::ChannelSink::attach(&connection);
        let result = connection.open_async(sink).await;
        assert!(matches!(result, Err(Error::Connect { .. })));
    }

    #[test]
    fn test_policy_template_clones_fresh_instances() {
        let builder = PairedConnectionFactory::builder()
            .error_policy(CountedFailure::once(LifecycleLocation::Send));

        let mut first = (builder.policy)();
        first.make_error(LifecycleLocation::Send);
        assert!(!first.should_fail(LifecycleLocation::Send));

        let second = (builder.policy)();
        assert!(second.should_fail(LifecycleLocation::Send));
    }
}
