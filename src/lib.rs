//! # dataflow-rs: real-time dataflow engine
//!
//! Build sensor/actuator processing pipelines out of independently scheduled
//! filters connected by typed, shared queues.
//!
//! ## Architecture
//!
//! - **Schema**: [`schema::Message`] trees of typed [`schema::DataNode`]s describe
//!   one record; binding assigns every leaf its region inside a queue slot
//! - **Queue**: fixed-capacity ring with one writer and many readers; the data
//!   path is lock-free and never blocks (`WouldBlock` is the back-pressure signal)
//! - **Filter**: lifecycle wrapper (`Closed -> Opened -> Configured -> Running`)
//!   around a [`filter::FilterPlugin`], with a reflective [`settings::Settings`] registry
//! - **Pipeline**: connects filter ports, orders them, and time-slices their jobs
//!   across worker threads
//! - **Communication**: crossbeam channels carry worker events
//!
//! ## Example
//!
//! ```ignore
//! use dataflow_rs::filters::{FileSink, SignalSource};
//! use dataflow_rs::{Filter, Pipeline};
//!
//! let mut pipeline = Pipeline::new();
//! let source = pipeline.add(Filter::new("sensor", SignalSource::new())?)?;
//! let sink = pipeline.add(Filter::new("rec", FileSink::new())?)?;
//! pipeline.connect(source, 0, sink, 0)?;
//!
//! pipeline.run()?;
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! pipeline.halt();
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod filters;
pub mod logging;
pub mod pipeline;
pub mod queue;
pub mod schema;
pub mod settings;
pub mod types;

// Re-export commonly used types
pub use config::{FilterRegistry, PipelineConfig};
pub use error::{EngineError, Result, ResultExt};
pub use filter::{
    ExecutionModel, Filter, FilterContext, FilterPlugin, FilterState, JobStatus, PortLimits,
    SinkQueueSettings, SourceQueueSettings,
};
pub use pipeline::{FilterId, Pipeline, PipelineEvent, StopHandle, WorkerId};
pub use queue::{Queue, QueueError, QueueKind, QueueReader, QueueWriter};
pub use schema::{DataNode, Message, SchemaNode};
pub use settings::{Setting, SettingOptions, Settings};
pub use types::{Element, ElementType, PixelFormat};
