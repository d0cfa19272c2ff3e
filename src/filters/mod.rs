//! Reference filters shipped with the engine.
//!
//! - [`SignalSource`]: synthetic cosine samples, useful for wiring tests
//! - [`Passthrough`]: forwards records unchanged
//! - [`FileSink`] / [`FileSource`]: record queues to disk and replay them

mod file_sink;
mod file_source;
mod passthrough;
mod signal_source;

pub use file_sink::{
    header_path, schema_path, FileSink, DEFAULT_MAX_FILE_SIZE, FILE_SINK_PORTS,
};
pub use file_source::FileSource;
pub use passthrough::{Passthrough, PASSTHROUGH_PORTS};
pub use signal_source::SignalSource;
