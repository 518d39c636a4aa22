// Application Layer - Use Cases and Services

pub mod convert;
pub mod dispatcher;
pub mod mapping;
pub mod observation;
pub mod recovery;
pub mod upload;

// Re-exports
pub use convert::ConversionService;
pub use dispatcher::{shutdown_channel, Dispatcher, ShutdownSender, ShutdownToken, StageJob};
pub use mapping::MappingService;
pub use observation::ObservationService;
pub use recovery::RecoveryService;
pub use upload::{UploadConfig, UploadService};
