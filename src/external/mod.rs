//! Outbound collaborators.
//!
//! Each collaborator is a trait so the coordinator can run against production
//! clients or the mocks defined alongside them.

pub mod blob;
pub mod geocode;
pub mod identity;

pub use blob::{BlobStore, BlobStoreConfig, HttpBlobStore, MockBlobStore, StoredBlob, Upload};
pub use geocode::{Geocoder, MockGeocoder, NominatimConfig, NominatimGeocoder};
pub use identity::{IdentityDirectory, InMemoryDirectory};
