//! Key lifecycle management
//!
//! Keys move through `active → deprecated → (revoked | deleted)`. The
//! [`KeyLifecycleManager`] owns every key and its metadata; the
//! [`RotationScheduler`] drives periodic rotation and cleanup sweeps.

pub mod manager;
pub mod metadata;
pub mod scheduler;

pub use manager::{key_age, KeyLifecycleManager, RECORD_PREFIX};
pub use metadata::{
    CleanupReport, KeyFailure, KeyHandle, KeyHealthStatus, KeyMetadata, KeyStatus, RotatedKey,
    RotationReport,
};
pub use scheduler::{RotationScheduler, SweepReport};
