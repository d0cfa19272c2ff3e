//! Synthetic cosine source.

use crate::filter::{FilterContext, FilterPlugin, JobStatus, PortLimits};
use crate::queue::QueueError;
use crate::schema::{DataNode, Message};
use crate::settings::{Setting, SettingOptions, Settings, SettingsResult};
use std::time::{Duration, Instant};

/// Step applied by the frequency commands.
const FREQUENCY_STEP: f64 = 10.0;

/// Emits `{ value: f64, tick: i32 }` with `value = amplitude * cos(frequency * tick)`.
pub struct SignalSource {
    frequency: Setting<f64>,
    amplitude: Setting<f64>,
    rate_hz: Setting<f64>,
    tick: i32,
    last_emit: Option<Instant>,
    nodes: Option<(DataNode, DataNode)>,
}

impl Default for SignalSource {
    fn default() -> Self {
        Self {
            frequency: Setting::new(2.0),
            amplitude: Setting::new(10.0),
            rate_hz: Setting::new(0.0),
            tick: 0,
            last_emit: None,
            nodes: None,
        }
    }
}

impl SignalSource {
    pub const TYPE_NAME: &'static str = "SignalSource";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema() -> Message {
        Message::new()
            .with(DataNode::scalar::<f64>("value").with_description("Sample value"))
            .with(DataNode::scalar::<i32>("tick").with_description("Sample counter"))
    }

    fn sample(&self, tick: i32) -> f64 {
        self.amplitude.get() * (self.frequency.get() * f64::from(tick)).cos()
    }

    /// Time between samples; `None` when `rate_hz` is zero, negative or not
    /// finite. Rates too low to represent wait forever.
    fn period(&self) -> Option<Duration> {
        let rate = self.rate_hz.get();
        if !rate.is_finite() || rate <= 0.0 {
            return None;
        }
        Some(Duration::try_from_secs_f64(rate.recip()).unwrap_or(Duration::MAX))
    }

    fn due(&mut self) -> bool {
        let Some(period) = self.period() else {
            return true;
        };
        let now = Instant::now();
        match self.last_emit {
            Some(last) if now.saturating_duration_since(last) < period => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }
}

impl FilterPlugin for SignalSource {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn port_limits(&self) -> PortLimits {
        PortLimits::source_only(1)
    }

    fn register_settings(&mut self, settings: &mut Settings) -> SettingsResult<()> {
        settings.add_setting(
            "frequency",
            &self.frequency,
            SettingOptions::default().describe("Angular step per sample, in radians"),
        )?;
        settings.add_setting(
            "amplitude",
            &self.amplitude,
            SettingOptions::default().describe("Peak value of the signal"),
        )?;
        settings.add_setting(
            "rate_hz",
            &self.rate_hz,
            SettingOptions::default()
                .describe("Samples per second; 0 or non-finite emits as fast as possible"),
        )?;

        let frequency = self.frequency.clone();
        settings.add_command("increase_frequency", "Raise frequency by 10", move || {
            frequency.update(|f| *f += FREQUENCY_STEP);
            0
        })?;
        let frequency = self.frequency.clone();
        settings.add_command("decrease_frequency", "Lower frequency by 10", move || {
            frequency.update(|f| *f -= FREQUENCY_STEP);
            0
        })?;
        Ok(())
    }

    fn on_set(&mut self, ctx: &mut FilterContext<'_>) -> anyhow::Result<()> {
        ctx.create_sink_queue(0, Self::schema())?;
        Ok(())
    }

    fn on_start(&mut self, ctx: &mut FilterContext<'_>) -> anyhow::Result<()> {
        let schema = ctx
            .sink_schema(0)
            .ok_or_else(|| anyhow::anyhow!("sink queue 0 was not created"))?;
        self.nodes = Some((
            schema.require_field("value")?.clone(),
            schema.require_field("tick")?.clone(),
        ));
        self.last_emit = None;
        Ok(())
    }

    fn job(&mut self, ctx: &mut FilterContext<'_>) -> JobStatus {
        if !self.due() {
            return JobStatus::Idle;
        }
        let tick = self.tick.wrapping_add(1);
        let value = self.sample(tick);
        let (Some((value_node, tick_node)), Some(writer)) = (&self.nodes, ctx.writer(0)) else {
            return JobStatus::Failed("not started".into());
        };

        match writer.start_write() {
            Ok(mut slot) => {
                value_node.set(slot.data_mut(), 0, value);
                tick_node.set(slot.data_mut(), 0, tick);
                slot.end_write();
                self.tick = tick;
                JobStatus::Progress
            }
            Err(QueueError::WouldBlock) => {
                // Retry the same sample next time.
                self.last_emit = None;
                JobStatus::Idle
            }
            Err(e) => JobStatus::Failed(e.to_string()),
        }
    }

    fn on_reset(&mut self, _ctx: &mut FilterContext<'_>) {
        self.nodes = None;
        self.tick = 0;
    }
}
