//! hoist-registry library - Artifact Store and Manifest Service, exposed for testing.

pub mod error;
pub mod manifest;
pub mod routes;
pub mod server;
pub mod store;

pub use error::RegistryError;
pub use manifest::ManifestService;
pub use store::ArtifactStore;
