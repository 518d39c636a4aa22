// Port Layer - Interfaces for external dependencies

pub mod archive;
pub mod control_bus;
pub mod converter;
pub mod file_queue;
pub mod observatory_db;
pub mod state;
pub mod time_provider;

// Re-exports
pub use archive::ArchiveClient;
pub use control_bus::{gateway_channel, ControlBus};
pub use converter::{ConversionContext, ConversionReport, Converter};
pub use file_queue::FileQueue;
pub use observatory_db::{FileRecord, ObservationRecord, ObservatoryDb};
pub use state::TelescopeState;
pub use time_provider::TimeProvider;
