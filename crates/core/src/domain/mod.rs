// Domain Layer - Pure business logic and entities

pub mod bda;
pub mod error;
pub mod filename;
pub mod freq;
pub mod mapping;
pub mod observation;
pub mod queue;
pub mod telescope;

// Re-exports
pub use bda::{BdaConfig, BdaTier, TierCounts};
pub use error::DomainError;
pub use filename::{FileKind, FileTriplet, RawFileName};
pub use freq::FreqSetup;
pub use observation::{ObservationPlan, ObservationSpec};
pub use queue::{QueueKey, Stage, StageConfig};
pub use telescope::CmInfo;
