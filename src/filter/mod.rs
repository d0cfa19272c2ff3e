//! Filter lifecycle.
//!
//! [`Filter`] wraps a [`FilterPlugin`] with the state machine
//!
//! ```text
//! Closed --open--> Opened --set--> Configured --start--> Running
//! Closed <-close-- Opened <-reset- Configured <--stop--- Running
//! ```
//!
//! A failed forward transition leaves the state unchanged. `job` runs only
//! while `Running`; anywhere else it returns [`FilterError::InvalidState`].
//! Sink queues exist from `set` until `reset`; source readers are bound by
//! the pipeline while `Opened` and dropped on `reset`.

pub mod error;
pub mod plugin;
pub mod port;
pub mod state;

pub use error::{FilterError, FilterResult};
pub use plugin::{FilterContext, FilterPlugin};
pub use port::{PortLimits, SinkPort, SinkQueueSettings, SourcePort, SourceQueueSettings};
pub use state::{ExecutionModel, FilterState, JobStatus};

use crate::queue::Queue;
use crate::settings::{Setting, SettingKind, SettingOptions, SettingValue, Settings};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Back-off after an idle job unless the `timeout` setting says otherwise.
pub const DEFAULT_TIMEOUT_US: u64 = 1_000;

/// Name of the standard back-off setting every filter carries.
pub const TIMEOUT_SETTING: &str = "timeout";

/// Per-sink queue sizing as it appears in a filter record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkQueueRecord {
    pub id: usize,
    #[serde(flatten)]
    pub settings: SinkQueueSettings,
}

/// Per-source read window as it appears in a filter record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceQueueRecord {
    pub id: usize,
    #[serde(flatten)]
    pub settings: SourceQueueSettings,
}

/// `queue_settings` section of a filter record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettingsRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sources: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sinks: Option<usize>,
    #[serde(default)]
    pub sink_queues: Vec<SinkQueueRecord>,
    #[serde(default)]
    pub source_queues: Vec<SourceQueueRecord>,
}

pub struct Filter {
    name: String,
    state: FilterState,
    sinks: Vec<SinkPort>,
    sources: Vec<SourcePort>,
    settings: Settings,
    timeout: Setting<u64>,
    device_config: Option<Value>,
    plugin: Box<dyn FilterPlugin>,
}

impl Filter {
    pub fn new(name: impl Into<String>, plugin: impl FilterPlugin + 'static) -> FilterResult<Self> {
        Self::from_boxed(name, Box::new(plugin))
    }

    pub fn from_boxed(
        name: impl Into<String>,
        mut plugin: Box<dyn FilterPlugin>,
    ) -> FilterResult<Self> {
        let limits = plugin.port_limits();
        let timeout = Setting::new(DEFAULT_TIMEOUT_US);
        let mut settings = Settings::new();
        settings.add_setting(
            TIMEOUT_SETTING,
            &timeout,
            SettingOptions::default().describe("back-off after an idle job, in microseconds"),
        )?;
        plugin.register_settings(&mut settings)?;

        Ok(Self {
            name: name.into(),
            state: FilterState::Closed,
            sinks: (0..limits.max_sinks).map(|_| SinkPort::default()).collect(),
            sources: (0..limits.max_sources).map(|_| SourcePort::default()).collect(),
            settings,
            timeout,
            device_config: None,
            plugin,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.plugin.type_name()
    }

    pub fn execution_model(&self) -> ExecutionModel {
        self.plugin.execution_model()
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn port_limits(&self) -> PortLimits {
        PortLimits::new(self.sources.len(), self.sinks.len())
    }

    /// Resize the port tables. Only while `Closed`.
    pub fn set_port_limits(&mut self, limits: PortLimits) -> FilterResult<()> {
        self.expect_state("resize ports", FilterState::Closed)?;
        self.sinks.resize_with(limits.max_sinks, SinkPort::default);
        self.sources
            .resize_with(limits.max_sources, SourcePort::default);
        Ok(())
    }

    /// Size the queue that sink `port` will create. Not while it exists.
    pub fn set_sink_queue_settings(
        &mut self,
        port: usize,
        settings: SinkQueueSettings,
    ) -> FilterResult<()> {
        if self.state > FilterState::Opened {
            return Err(self.invalid_state("change queue settings"));
        }
        let max = self.sinks.len();
        let sink = self
            .sinks
            .get_mut(port)
            .ok_or_else(|| FilterError::PortOutOfRange {
                filter: self.name.clone(),
                direction: "sink",
                port,
                max,
            })?;
        sink.settings = settings;
        Ok(())
    }

    pub fn sink_queue_settings(&self, port: usize) -> Option<SinkQueueSettings> {
        self.sinks.get(port).map(SinkPort::settings)
    }

    /// Read window of source `port`, applied when the pipeline binds it.
    pub fn set_source_queue_settings(
        &mut self,
        port: usize,
        settings: SourceQueueSettings,
    ) -> FilterResult<()> {
        if self.state > FilterState::Opened {
            return Err(self.invalid_state("change queue settings"));
        }
        let max = self.sources.len();
        let source = self
            .sources
            .get_mut(port)
            .ok_or_else(|| FilterError::PortOutOfRange {
                filter: self.name.clone(),
                direction: "source",
                port,
                max,
            })?;
        source.settings = settings;
        Ok(())
    }

    pub fn source_queue_settings(&self, port: usize) -> Option<SourceQueueSettings> {
        self.sources.get(port).map(SourcePort::settings)
    }

    /// Back-off the scheduler applies after an idle job.
    pub fn timeout(&self) -> Duration {
        Duration::from_micros(self.timeout.get())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Write a setting, honouring read-only and state-gated access.
    pub fn set_setting<T: SettingValue>(&self, name: &str, value: T) -> FilterResult<()> {
        Ok(self.settings.set_value_in(name, value, self.state)?)
    }

    pub fn setting<T: SettingValue>(&self, name: &str) -> Option<T> {
        self.settings.value(name)
    }

    pub fn run_command(&mut self, name: &str) -> FilterResult<i32> {
        Ok(self.settings.run_command(name)?)
    }

    /// Queue created behind sink `port`, present between `set` and `reset`.
    pub fn sink_queue(&self, port: usize) -> Option<Arc<Queue>> {
        self.sinks.get(port)?.queue().cloned()
    }

    pub fn source_upstream(&self, port: usize) -> Option<&str> {
        self.sources.get(port)?.upstream()
    }

    /// Attach a reader on `queue` to source `port`. Only while `Opened`.
    pub fn bind_source(
        &mut self,
        port: usize,
        queue: &Arc<Queue>,
        upstream: impl Into<String>,
    ) -> FilterResult<()> {
        self.expect_state("bind source", FilterState::Opened)?;
        let max = self.sources.len();
        let source = self
            .sources
            .get_mut(port)
            .ok_or_else(|| FilterError::PortOutOfRange {
                filter: self.name.clone(),
                direction: "source",
                port,
                max,
            })?;
        if source.is_bound() {
            return Err(FilterError::PortInUse {
                filter: self.name.clone(),
                direction: "source",
                port,
            });
        }
        let mut reader = queue.attach_reader()?;
        source.settings.apply(&mut reader)?;
        source.reader = Some(reader);
        source.upstream = Some(upstream.into());
        Ok(())
    }

    // ── Lifecycle ──

    pub fn open(&mut self) -> FilterResult<()> {
        self.expect_state("open", FilterState::Closed)?;
        let (plugin, mut ctx) = self.split();
        if let Err(source) = plugin.on_open(&mut ctx) {
            self.settings.remove_kind(SettingKind::Device);
            return Err(self.hook_error("open", source));
        }
        self.transition(FilterState::Opened);

        if let Some(device) = &self.device_config {
            let applied = self
                .settings
                .load(&serde_json::json!({ "device_settings": device }));
            tracing::debug!("Filter '{}': applied {} device settings", self.name, applied);
        }
        Ok(())
    }

    pub fn set(&mut self) -> FilterResult<()> {
        self.expect_state("set", FilterState::Opened)?;
        if self.plugin.requires_sources() && !self.sources.iter().any(SourcePort::is_bound) {
            return Err(FilterError::MissingSource {
                filter: self.name.clone(),
            });
        }
        let (plugin, mut ctx) = self.split();
        if let Err(source) = plugin.on_set(&mut ctx) {
            self.sinks.iter_mut().for_each(SinkPort::clear);
            return Err(self.hook_error("set", source));
        }
        self.transition(FilterState::Configured);
        Ok(())
    }

    pub fn start(&mut self) -> FilterResult<()> {
        self.expect_state("start", FilterState::Configured)?;
        let (plugin, mut ctx) = self.split();
        if let Err(source) = plugin.on_start(&mut ctx) {
            return Err(self.hook_error("start", source));
        }
        self.transition(FilterState::Running);
        Ok(())
    }

    /// One bounded unit of work. Fails with `InvalidState` unless `Running`.
    pub fn job(&mut self) -> FilterResult<JobStatus> {
        if self.state != FilterState::Running {
            return Err(self.invalid_state("run job"));
        }
        let (plugin, mut ctx) = self.split();
        Ok(plugin.job(&mut ctx))
    }

    pub fn stop(&mut self) -> FilterResult<()> {
        self.expect_state("stop", FilterState::Running)?;
        self.do_stop();
        Ok(())
    }

    pub fn reset(&mut self) -> FilterResult<()> {
        self.expect_state("reset", FilterState::Configured)?;
        self.do_reset();
        Ok(())
    }

    pub fn close(&mut self) -> FilterResult<()> {
        self.expect_state("close", FilterState::Opened)?;
        self.do_close();
        Ok(())
    }

    /// Walk down from any state to `Closed`.
    pub fn shutdown(&mut self) {
        loop {
            match self.state {
                FilterState::Running => self.do_stop(),
                FilterState::Configured => self.do_reset(),
                FilterState::Opened => self.do_close(),
                FilterState::Closed => break,
            }
        }
    }

    fn do_stop(&mut self) {
        let (plugin, mut ctx) = self.split();
        plugin.on_stop(&mut ctx);
        self.transition(FilterState::Configured);
    }

    fn do_reset(&mut self) {
        let (plugin, mut ctx) = self.split();
        plugin.on_reset(&mut ctx);
        self.sinks.iter_mut().for_each(SinkPort::clear);
        self.sources.iter_mut().for_each(SourcePort::clear);
        self.transition(FilterState::Opened);
    }

    fn do_close(&mut self) {
        let (plugin, mut ctx) = self.split();
        plugin.on_close(&mut ctx);
        let removed = self.settings.remove_kind(SettingKind::Device);
        if removed > 0 {
            tracing::debug!("Filter '{}': removed {} device settings", self.name, removed);
        }
        self.transition(FilterState::Closed);
    }

    // ── Settings documents ──

    /// Apply a filter record: `queue_settings`, `filter_settings`,
    /// `device_settings` and flat setting keys. Unknown keys are ignored.
    ///
    /// Device settings are kept and re-applied on every `open`.
    pub fn load_settings(&mut self, record: &Value) -> usize {
        if let Some(queue) = record.get("queue_settings") {
            match serde_json::from_value::<QueueSettingsRecord>(queue.clone()) {
                Ok(queue) => self.apply_queue_settings(&queue),
                Err(e) => tracing::warn!("Filter '{}': bad queue_settings: {}", self.name, e),
            }
        }
        if let Some(device) = record.get("device_settings") {
            self.device_config = Some(device.clone());
        }
        self.settings.load(record)
    }

    fn apply_queue_settings(&mut self, queue: &QueueSettingsRecord) {
        if queue.max_sources.is_some() || queue.max_sinks.is_some() {
            let current = self.port_limits();
            let limits = PortLimits::new(
                queue.max_sources.unwrap_or(current.max_sources),
                queue.max_sinks.unwrap_or(current.max_sinks),
            );
            if let Err(e) = self.set_port_limits(limits) {
                tracing::warn!("Filter '{}': {}", self.name, e);
            }
        }
        for record in &queue.sink_queues {
            if let Err(e) = self.set_sink_queue_settings(record.id, record.settings) {
                tracing::warn!("Filter '{}': skipping sink queue settings: {}", self.name, e);
            }
        }
        for record in &queue.source_queues {
            if let Err(e) = self.set_source_queue_settings(record.id, record.settings) {
                tracing::warn!("Filter '{}': skipping source queue settings: {}", self.name, e);
            }
        }
    }

    /// Snapshot of this filter as a record [`Filter::load_settings`] accepts.
    pub fn save_settings(&self) -> Value {
        let mut record = self.settings.save();
        let queue = QueueSettingsRecord {
            max_sources: Some(self.sources.len()),
            max_sinks: Some(self.sinks.len()),
            sink_queues: self
                .sinks
                .iter()
                .enumerate()
                .map(|(id, s)| SinkQueueRecord {
                    id,
                    settings: s.settings,
                })
                .collect(),
            source_queues: self
                .sources
                .iter()
                .enumerate()
                .map(|(id, s)| SourceQueueRecord {
                    id,
                    settings: s.settings,
                })
                .collect(),
        };
        if let Some(obj) = record.as_object_mut() {
            obj.insert("name".into(), Value::String(self.name.clone()));
            obj.insert("type".into(), Value::String(self.type_name().to_string()));
            obj.insert(
                "queue_settings".into(),
                serde_json::to_value(queue).unwrap_or(Value::Null),
            );
        }
        record
    }

    // ── Helpers ──

    fn split(&mut self) -> (&mut dyn FilterPlugin, FilterContext<'_>) {
        (
            self.plugin.as_mut(),
            FilterContext {
                name: &self.name,
                state: self.state,
                sinks: &mut self.sinks,
                sources: &mut self.sources,
                settings: &mut self.settings,
            },
        )
    }

    fn transition(&mut self, to: FilterState) {
        tracing::info!("Filter '{}': {} -> {}", self.name, self.state, to);
        self.state = to;
    }

    fn invalid_state(&self, op: &'static str) -> FilterError {
        FilterError::InvalidState {
            filter: self.name.clone(),
            op,
            state: self.state,
        }
    }

    fn expect_state(&self, op: &'static str, expected: FilterState) -> FilterResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid_state(op))
        }
    }

    fn hook_error(&self, op: &'static str, source: anyhow::Error) -> FilterError {
        let err = match source.downcast::<FilterError>() {
            Ok(err) => err,
            Err(source) => FilterError::Hook {
                filter: self.name.clone(),
                op,
                source,
            },
        };
        tracing::warn!("Filter '{}': {} failed: {}", self.name, op, err);
        err
    }
}

impl Drop for Filter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("name", &self.name)
            .field("type", &self.type_name())
            .field("state", &self.state)
            .field("sources", &self.sources.len())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueError;
    use crate::schema::{DataNode, Message};
    use crate::settings::SettingsResult;
    use serde_json::json;

    /// Writes an incrementing counter to sink 0.
    struct Counter {
        next: i32,
        fail_open: bool,
        port: Setting<String>,
    }

    impl Counter {
        fn new() -> Self {
            Self {
                next: 0,
                fail_open: false,
                port: Setting::new("none".into()),
            }
        }
    }

    impl FilterPlugin for Counter {
        fn type_name(&self) -> &'static str {
            "Counter"
        }

        fn port_limits(&self) -> PortLimits {
            PortLimits::source_only(1)
        }

        fn register_settings(&mut self, settings: &mut Settings) -> SettingsResult<()> {
            settings.add_command("noop", "does nothing", || 0)
        }

        fn on_open(&mut self, ctx: &mut FilterContext<'_>) -> anyhow::Result<()> {
            ctx.settings_mut()
                .add_setting("port", &self.port, SettingOptions::device())?;
            if self.fail_open {
                anyhow::bail!("device unavailable");
            }
            Ok(())
        }

        fn on_set(&mut self, ctx: &mut FilterContext<'_>) -> anyhow::Result<()> {
            ctx.create_sink_queue(0, Message::new().with(DataNode::scalar::<i32>("n")))?;
            Ok(())
        }

        fn job(&mut self, ctx: &mut FilterContext<'_>) -> JobStatus {
            let Some(writer) = ctx.writer(0) else {
                return JobStatus::Failed("no writer".into());
            };
            match writer.try_push(&self.next.to_le_bytes()) {
                Ok(_) => {
                    self.next += 1;
                    JobStatus::Progress
                }
                Err(_) => JobStatus::Idle,
            }
        }
    }

    /// Requires one source; creates nothing.
    struct Drain;

    impl FilterPlugin for Drain {
        fn type_name(&self) -> &'static str {
            "Drain"
        }

        fn port_limits(&self) -> PortLimits {
            PortLimits::sink_only(1)
        }

        fn on_set(&mut self, _ctx: &mut FilterContext<'_>) -> anyhow::Result<()> {
            Ok(())
        }

        fn job(&mut self, ctx: &mut FilterContext<'_>) -> JobStatus {
            let mut buf = Vec::new();
            match ctx.reader(0).map(|r| r.try_pop_into(&mut buf)) {
                Some(Ok(_)) => JobStatus::Progress,
                _ => JobStatus::Idle,
            }
        }
    }

    #[test]
    fn test_forward_and_reverse_lifecycle() {
        let mut filter = Filter::new("counter", Counter::new()).unwrap();
        assert_eq!(filter.state(), FilterState::Closed);
        filter.open().unwrap();
        filter.set().unwrap();
        assert!(filter.sink_queue(0).is_some());
        filter.start().unwrap();
        assert_eq!(filter.job().unwrap(), JobStatus::Progress);
        filter.stop().unwrap();
        filter.reset().unwrap();
        assert!(filter.sink_queue(0).is_none());
        filter.close().unwrap();
        assert_eq!(filter.state(), FilterState::Closed);
    }

    #[test]
    fn test_job_outside_running_fails() {
        let mut filter = Filter::new("counter", Counter::new()).unwrap();
        for step in 0..3 {
            let err = filter.job().unwrap_err();
            assert!(matches!(err, FilterError::InvalidState { op: "run job", .. }));
            match step {
                0 => filter.open().unwrap(),
                1 => filter.set().unwrap(),
                _ => {}
            }
        }
    }

    #[test]
    fn test_set_twice_fails_without_reallocating() {
        let mut filter = Filter::new("counter", Counter::new()).unwrap();
        filter.open().unwrap();
        filter.set().unwrap();
        let queue = filter.sink_queue(0).unwrap();
        assert!(matches!(
            filter.set(),
            Err(FilterError::InvalidState { op: "set", .. })
        ));
        assert!(Arc::ptr_eq(&queue, &filter.sink_queue(0).unwrap()));
    }

    #[test]
    fn test_start_stop_cycles_without_reset() {
        let mut filter = Filter::new("counter", Counter::new()).unwrap();
        filter.open().unwrap();
        filter.set().unwrap();
        for _ in 0..3 {
            filter.start().unwrap();
            filter.job().unwrap();
            filter.stop().unwrap();
        }
        assert_eq!(filter.sink_queue(0).unwrap().written(), 3);
    }

    #[test]
    fn test_failed_open_keeps_state_and_drops_device_settings() {
        let mut plugin = Counter::new();
        plugin.fail_open = true;
        let mut filter = Filter::new("counter", plugin).unwrap();
        let err = filter.open().unwrap_err();
        assert!(err.to_string().contains("device unavailable"));
        assert_eq!(filter.state(), FilterState::Closed);
        assert!(!filter.settings().contains("port"));
    }

    #[test]
    fn test_device_settings_live_between_open_and_close() {
        let mut filter = Filter::new("counter", Counter::new()).unwrap();
        filter.load_settings(&json!({ "device_settings": { "port": "COM3" } }));
        assert!(!filter.settings().contains("port"));

        filter.open().unwrap();
        assert_eq!(filter.setting::<String>("port").as_deref(), Some("COM3"));
        filter.close().unwrap();
        assert!(!filter.settings().contains("port"));
    }

    #[test]
    fn test_set_requires_source() {
        let mut drain = Filter::new("drain", Drain).unwrap();
        drain.open().unwrap();
        assert!(matches!(drain.set(), Err(FilterError::MissingSource { .. })));
        assert_eq!(drain.state(), FilterState::Opened);
    }

    #[test]
    fn test_bind_source_and_drain() {
        let mut counter = Filter::new("counter", Counter::new()).unwrap();
        let mut drain = Filter::new("drain", Drain).unwrap();
        counter.open().unwrap();
        drain.open().unwrap();
        counter.set().unwrap();

        let queue = counter.sink_queue(0).unwrap();
        drain.bind_source(0, &queue, "counter").unwrap();
        assert!(matches!(
            drain.bind_source(0, &queue, "counter"),
            Err(FilterError::PortInUse { .. })
        ));
        assert!(matches!(
            drain.bind_source(1, &queue, "counter"),
            Err(FilterError::PortOutOfRange { .. })
        ));
        assert_eq!(drain.source_upstream(0), Some("counter"));

        drain.set().unwrap();
        counter.start().unwrap();
        drain.start().unwrap();
        counter.job().unwrap();
        assert_eq!(drain.job().unwrap(), JobStatus::Progress);
        assert_eq!(drain.job().unwrap(), JobStatus::Idle);

        drain.shutdown();
        assert_eq!(queue.active_readers(), 0);
    }

    #[test]
    fn test_timeout_setting_and_gating() {
        let filter = Filter::new("counter", Counter::new()).unwrap();
        assert_eq!(filter.timeout(), Duration::from_micros(DEFAULT_TIMEOUT_US));
        filter.set_setting(TIMEOUT_SETTING, 250u64).unwrap();
        assert_eq!(filter.timeout(), Duration::from_micros(250));
    }

    #[test]
    fn test_load_queue_settings() {
        let mut filter = Filter::new("counter", Counter::new()).unwrap();
        filter.load_settings(&json!({
            "queue_settings": {
                "sink_queues": [
                    { "id": 0, "length": 3, "max_readers": 2 },
                    { "id": 4, "length": 8 }
                ]
            },
            "filter_settings": { "timeout": 500 }
        }));
        assert_eq!(
            filter.sink_queue_settings(0),
            Some(SinkQueueSettings {
                length: 3,
                max_readers: 2,
                ..SinkQueueSettings::default()
            })
        );
        assert_eq!(filter.timeout(), Duration::from_micros(500));

        filter.open().unwrap();
        filter.set().unwrap();
        assert_eq!(filter.sink_queue(0).unwrap().capacity(), 3);
    }

    #[test]
    fn test_save_settings_record() {
        let filter = Filter::new("counter", Counter::new()).unwrap();
        let record = filter.save_settings();
        assert_eq!(record["name"], json!("counter"));
        assert_eq!(record["type"], json!("Counter"));
        assert_eq!(record["queue_settings"]["max_sinks"], json!(1));
        assert_eq!(record["filter_settings"]["timeout"]["value"], json!(1000));
        assert!(record["filter_commands"].get("noop").is_some());
    }

    #[test]
    fn test_source_window_applied_on_bind() {
        let mut counter = Filter::new("counter", Counter::new()).unwrap();
        let mut drain = Filter::new("drain", Drain).unwrap();
        drain.load_settings(&json!({
            "queue_settings": {
                "source_queues": [{ "id": 0, "batch": 3, "new_per_batch": 2 }]
            }
        }));
        assert_eq!(
            drain.source_queue_settings(0),
            Some(SourceQueueSettings::window(3, 2))
        );

        counter.open().unwrap();
        drain.open().unwrap();
        counter.set().unwrap();
        let queue = counter.sink_queue(0).unwrap();
        drain.bind_source(0, &queue, "counter").unwrap();

        let record = drain.save_settings();
        assert_eq!(
            record["queue_settings"]["source_queues"][0]["new_per_batch"],
            json!(2)
        );
        drop(drain);
        assert_eq!(queue.active_readers(), 0);
    }

    #[test]
    fn test_oversized_source_window_fails_bind() {
        let mut counter = Filter::new("counter", Counter::new()).unwrap();
        let mut drain = Filter::new("drain", Drain).unwrap();
        drain
            .set_source_queue_settings(0, SourceQueueSettings::window(11, 1))
            .unwrap();
        counter.open().unwrap();
        drain.open().unwrap();
        counter.set().unwrap();

        let queue = counter.sink_queue(0).unwrap();
        assert!(matches!(
            drain.bind_source(0, &queue, "counter"),
            Err(FilterError::Queue(QueueError::InvalidBatch { count: 11, .. }))
        ));
        assert!(drain.source_upstream(0).is_none());
        assert_eq!(queue.active_readers(), 0);
    }

    #[test]
    fn test_shutdown_from_running() {
        let mut filter = Filter::new("counter", Counter::new()).unwrap();
        filter.open().unwrap();
        filter.set().unwrap();
        filter.start().unwrap();
        filter.shutdown();
        assert_eq!(filter.state(), FilterState::Closed);
    }
}
