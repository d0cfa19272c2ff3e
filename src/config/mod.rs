//! Pipeline configuration documents
//!
//! A pipeline document lists filters (each a settings record as produced by
//! [`Filter::save_settings`](crate::filter::Filter::save_settings)), the
//! connections between them and, optionally, which worker thread runs which
//! filter:
//!
//! ```json
//! {
//!   "version": 1,
//!   "filters": [
//!     { "name": "sensor", "type": "SignalSource", "filter_settings": { "frequency": 2.0 } },
//!     { "name": "rec", "type": "FileSink", "filter_settings": { "path": "/tmp/rec" } }
//!   ],
//!   "connections": [
//!     { "producer": "sensor", "producer_port": 0, "consumer": "rec", "consumer_port": 0 }
//!   ],
//!   "threads": [ { "id": 0, "filters": ["sensor", "rec"] } ]
//! }
//! ```
//!
//! Documents are JSON, or TOML when the file extension is `.toml`.
//!
//! # Example
//!
//! ```ignore
//! use dataflow_rs::config::{FilterRegistry, PipelineConfig};
//!
//! let config = PipelineConfig::load("pipeline.json")?;
//! let mut pipeline = config.build(&FilterRegistry::with_builtins())?;
//! pipeline.run()?;
//! ```

pub mod registry;

pub use registry::{FilterKindInfo, FilterRegistry};

use crate::error::{EngineError, Result, ResultExt};
use crate::pipeline::{FilterId, Pipeline, WorkerId};
use crate::settings::{read_document, write_document};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Current pipeline document version
pub const PIPELINE_CONFIG_VERSION: u32 = 1;

// ==================== Documents ====================

/// One filter: its name, registered type and settings record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub type_name: String,

    /// `filter_settings`, `device_settings`, `queue_settings` and flat keys.
    #[serde(flatten)]
    pub record: Map<String, Value>,
}

impl FilterConfig {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            record: Map::new(),
        }
    }

    /// Set `filter_settings.<key>`.
    pub fn with_setting(mut self, key: &str, value: impl Into<Value>) -> Self {
        let section = self
            .record
            .entry("filter_settings")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(obj) = section.as_object_mut() {
            obj.insert(key.to_string(), value.into());
        }
        self
    }

    /// The record as [`Filter::load_settings`](crate::filter::Filter::load_settings) expects it.
    pub fn to_record(&self) -> Value {
        let mut record = self.record.clone();
        record.insert("name".into(), Value::String(self.name.clone()));
        record.insert("type".into(), Value::String(self.type_name.clone()));
        Value::Object(record)
    }

    fn from_record(record: Value) -> Result<Self> {
        serde_json::from_value(record)
            .map_err(|e| EngineError::Config(format!("Invalid filter record: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub producer: String,
    #[serde(default)]
    pub producer_port: usize,
    pub consumer: String,
    #[serde(default)]
    pub consumer_port: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadConfig {
    pub id: u32,
    pub filters: Vec<String>,
}

/// Complete pipeline document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub filters: Vec<FilterConfig>,

    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,

    /// Empty means one thread per filter.
    #[serde(default)]
    pub threads: Vec<ThreadConfig>,
}

fn default_version() -> u32 {
    PIPELINE_CONFIG_VERSION
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            version: PIPELINE_CONFIG_VERSION,
            filters: Vec::new(),
            connections: Vec::new(),
            threads: Vec::new(),
        }
    }
}

// ==================== Load / Save ====================

impl PipelineConfig {
    /// Load a pipeline document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let doc = read_document(path).map_err(|e| {
            EngineError::Config(format!("Failed to read pipeline file {:?}: {}", path, e))
        })?;
        Self::from_value(doc).with_context(|| format!("Loading {:?}", path))
    }

    /// Save the document, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let doc = serde_json::to_value(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize pipeline: {}", e)))?;
        write_document(path, &doc).map_err(|e| {
            EngineError::Config(format!("Failed to write pipeline file {:?}: {}", path, e))
        })
    }

    pub fn from_value(doc: Value) -> Result<Self> {
        let config: Self = serde_json::from_value(doc)
            .map_err(|e| EngineError::Config(format!("Failed to parse pipeline: {}", e)))?;
        if config.version > PIPELINE_CONFIG_VERSION {
            tracing::warn!(
                "Pipeline document version {} is newer than supported version {}",
                config.version,
                PIPELINE_CONFIG_VERSION
            );
        }
        Ok(config)
    }

    // ==================== Build / Snapshot ====================

    /// Create, configure, connect and assign every filter.
    ///
    /// The returned pipeline is not running yet.
    pub fn build(&self, registry: &FilterRegistry) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new();

        for fc in &self.filters {
            let mut filter = registry
                .create(&fc.type_name, fc.name.clone())
                .with_context(|| format!("Creating filter '{}'", fc.name))?;
            let applied = filter.load_settings(&fc.to_record());
            tracing::debug!("Filter '{}': applied {} settings", fc.name, applied);
            pipeline
                .add(filter)
                .with_context(|| format!("Adding filter '{}'", fc.name))?;
        }

        for c in &self.connections {
            pipeline
                .connect_by_name(&c.producer, c.producer_port, &c.consumer, c.consumer_port)
                .with_context(|| {
                    format!(
                        "Connecting '{}':{} -> '{}':{}",
                        c.producer, c.producer_port, c.consumer, c.consumer_port
                    )
                })?;
        }

        for thread in &self.threads {
            for name in &thread.filters {
                pipeline
                    .id_of(name)
                    .and_then(|id| pipeline.assign_task(WorkerId(thread.id), id))
                    .with_context(|| format!("Assigning '{}' to thread {}", name, thread.id))?;
            }
        }

        tracing::info!(
            "Built pipeline: {} filters, {} connections",
            pipeline.len(),
            pipeline.graph().len()
        );
        Ok(pipeline)
    }

    /// Document describing `pipeline` as it is now, settings included.
    pub fn snapshot(pipeline: &Pipeline) -> Result<Self> {
        let mut filters = Vec::with_capacity(pipeline.len());
        for id in pipeline.ids() {
            if let Some(filter) = pipeline.filter(id) {
                filters.push(FilterConfig::from_record(filter.lock().save_settings())?);
            }
        }

        let name = |id: FilterId| pipeline.filter_name(id).unwrap_or_default().to_string();
        let connections = pipeline
            .graph()
            .edges()
            .iter()
            .map(|e| ConnectionConfig {
                producer: name(e.producer),
                producer_port: e.producer_port,
                consumer: name(e.consumer),
                consumer_port: e.consumer_port,
            })
            .collect();
        let threads = pipeline
            .assignments()
            .iter()
            .map(|(worker, ids)| ThreadConfig {
                id: worker.0,
                filters: ids.iter().map(|&id| name(id)).collect(),
            })
            .collect();

        Ok(Self {
            version: PIPELINE_CONFIG_VERSION,
            filters,
            connections,
            threads,
        })
    }
}
