//! Declarative resource trait

use crate::error::CloudError;
use crate::state::ResourceState;
use async_trait::async_trait;

/// Error type of a [`Resource`].
///
/// A create can fail after the remote object already exists (ordered and
/// discovered, but a later step never finished). Such errors carry the
/// object's state so that it can still be recorded.
pub trait ResourceError: std::error::Error + From<CloudError> + Send + Sync + 'static {
    /// State of an object left behind by the failed operation
    fn partial_state(&self) -> Option<&ResourceState> {
        None
    }
}

impl ResourceError for CloudError {}

/// A remote object type managed through create/read/update/delete/exists.
///
/// Implementations receive already-validated typed specs and hand back the
/// [`ResourceState`] to persist. The remote API session is owned by the
/// implementation and passed in at construction time.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Desired configuration of one object
    type Spec: Send + Sync;

    /// Provider error type; must be able to carry core errors
    type Error: ResourceError;

    /// Resource type name (e.g., "global-ip", "dns-zone")
    fn resource_type(&self) -> &'static str;

    /// Create the object and wait until it is usable
    async fn create(&self, spec: &Self::Spec) -> Result<ResourceState, Self::Error>;

    /// Read the current remote state, `None` when the object is gone
    async fn read(&self, id: &str) -> Result<Option<ResourceState>, Self::Error>;

    /// Reconcile an existing object towards `spec`
    async fn update(&self, id: &str, spec: &Self::Spec) -> Result<ResourceState, Self::Error>;

    async fn delete(&self, id: &str) -> Result<(), Self::Error>;

    /// Whether the object exists; "not found" is `Ok(false)`, never an error
    async fn exists(&self, id: &str) -> Result<bool, Self::Error>;
}

/// Update `id` when it still exists remotely, otherwise create a fresh object.
pub async fn ensure<R: Resource + ?Sized>(
    resource: &R,
    id: Option<&str>,
    spec: &R::Spec,
) -> Result<ResourceState, R::Error> {
    if let Some(id) = id {
        if resource.exists(id).await? {
            tracing::info!("Updating {} {}", resource.resource_type(), id);
            return resource.update(id, spec).await;
        }
        tracing::info!(
            "{} {} no longer exists, creating a replacement",
            resource.resource_type(),
            id
        );
    }

    tracing::info!("Creating {}", resource.resource_type());
    resource.create(spec).await
}
