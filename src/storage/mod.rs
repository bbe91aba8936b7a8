mod metadata;
mod store;

pub use metadata::{round_score, MetadataRecord};
pub use store::{ArtifactStore, SavedArtifacts, StorageError};
