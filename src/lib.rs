//! Facade crate for the addrmerge address conflation engine.
//!
//! This crate re-exports the core domain types and exposes the SQLite feature
//! store behind a feature flag.

#![forbid(unsafe_code)]

pub use addrmerge_core::{
    AddressKey, AddressRecord, AreaOfInterest, AreaOfInterestError, ChangesetSink, Conflation,
    ExistingFeature, FeatureKind, FeatureRef, FeatureStore, ImportBatch, ImportBatchError,
    MatchOptions, MatchOptionsError, MatchOutcome, ModificationRecord, RelationMember,
    SpatialIndex, Structure, TagSanitizer, Tags, conflate, merge_tags,
};

#[cfg(feature = "store-sqlite")]
pub use addrmerge_core::{FEATURE_SCHEMA, SqliteFeatureStore, SqliteFeatureStoreError};
