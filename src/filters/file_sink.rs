//! Records raw queue contents to disk.
//!
//! Each connected source port gets its own data file
//! `<path>/<timestamp>_<filter>_q<port>_dat.bin` holding the slot bytes of
//! every record back to back, a `.json` file with the queue schema next to it,
//! and, when the queue carries headers, a parallel `_hdr.bin` file.
//! A data file that would grow past `max_file_size` is closed and recording
//! continues in `..._dat_<n>.bin`.
//!
//! Every `start` begins a new recording. The timestamp has millisecond
//! resolution and gets a `-<n>` suffix when files of that name already
//! exist; files are only ever created, never truncated.
//!
//! Sources read in windows as configured by their source queue settings.
//! Only the records a window adds are written, so overlapping windows never
//! duplicate data. A write error ends the recording of that source: the
//! failed record is cut from the data file and later records are dropped.

use crate::filter::{FilterContext, FilterPlugin, JobStatus, PortLimits};
use crate::queue::QueueError;
use crate::schema::Message;
use crate::settings::{Setting, SettingOptions, Settings, SettingsResult};
use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const FILE_SINK_PORTS: usize = 10;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 500_000_000;

/// File name stem shared by the data, header and schema files of one part.
fn part_stem(timestamp: &str, filter: &str, port: usize, part: u32) -> String {
    if part == 0 {
        format!("{}_{}_q{}_dat", timestamp, filter, port)
    } else {
        format!("{}_{}_q{}_dat_{}", timestamp, filter, port, part)
    }
}

/// Header file belonging to a data file: `x_dat.bin` -> `x_hdr.bin`.
pub fn header_path(data_file: &Path) -> PathBuf {
    let name = data_file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let name = match name.rfind("_dat") {
        Some(at) => format!("{}_hdr{}", &name[..at], &name[at + 4..]),
        None => format!("{}_hdr", name),
    };
    data_file.with_file_name(name)
}

pub fn schema_path(data_file: &Path) -> PathBuf {
    data_file.with_extension("json")
}

/// `base`, or `base-<n>` with the smallest `n` whose first part is free for
/// every port.
fn unique_stamp(dir: &Path, base: &str, filter: &str, ports: &[usize]) -> String {
    let taken = |stamp: &str| {
        ports
            .iter()
            .any(|&port| dir.join(format!("{}.bin", part_stem(stamp, filter, port, 0))).exists())
    };
    let mut stamp = base.to_string();
    let mut n = 0u32;
    while taken(&stamp) {
        n += 1;
        stamp = format!("{}-{}", base, n);
    }
    stamp
}

fn create_new(path: &Path) -> anyhow::Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("Failed to create {:?}", path))
}

struct Recording {
    port: usize,
    dir: PathBuf,
    timestamp: String,
    schema: Message,
    part: u32,
    data: BufWriter<File>,
    header: Option<BufWriter<File>>,
    bytes: u64,
    failed: bool,
}

impl Recording {
    fn open(
        dir: &Path,
        timestamp: &str,
        filter: &str,
        port: usize,
        schema: Message,
    ) -> anyhow::Result<Self> {
        let (data, header) = Self::create_part(dir, timestamp, filter, port, 0, &schema)?;
        Ok(Self {
            port,
            dir: dir.to_path_buf(),
            timestamp: timestamp.to_string(),
            schema,
            part: 0,
            data,
            header,
            bytes: 0,
            failed: false,
        })
    }

    fn create_part(
        dir: &Path,
        timestamp: &str,
        filter: &str,
        port: usize,
        part: u32,
        schema: &Message,
    ) -> anyhow::Result<(BufWriter<File>, Option<BufWriter<File>>)> {
        let data_path = dir.join(format!("{}.bin", part_stem(timestamp, filter, port, part)));
        let data = create_new(&data_path)?;

        let schema_file = schema_path(&data_path);
        let json = serde_json::to_string_pretty(schema)?;
        std::fs::write(&schema_file, json)
            .with_context(|| format!("Failed to write schema {:?}", schema_file))?;

        let header = match schema.header() {
            Some(_) => {
                let file = create_new(&header_path(&data_path))?;
                Some(BufWriter::new(file))
            }
            None => None,
        };
        tracing::debug!("Recording to {:?}", data_path);
        Ok((BufWriter::new(data), header))
    }

    fn rotate(&mut self, filter: &str) -> anyhow::Result<()> {
        self.flush()?;
        self.part += 1;
        let (data, header) = Self::create_part(
            &self.dir,
            &self.timestamp,
            filter,
            self.port,
            self.part,
            &self.schema,
        )?;
        self.data = data;
        self.header = header;
        self.bytes = 0;
        Ok(())
    }

    /// Append one record. On error the data file is cut back to the last
    /// complete record so it stays aligned with the header file.
    fn write(&mut self, data: &[u8], header: &[u8]) -> std::io::Result<()> {
        let written = self.data.write_all(data).and_then(|()| match self.header.as_mut() {
            Some(h) => h.write_all(header),
            None => Ok(()),
        });
        if let Err(e) = written {
            let bytes = self.bytes;
            if let Err(cut) = self
                .data
                .flush()
                .and_then(|()| self.data.get_ref().set_len(bytes))
            {
                tracing::warn!("Failed to cut partial record from data file: {}", cut);
            }
            return Err(e);
        }
        self.bytes += data.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.data.flush()?;
        if let Some(h) = self.header.as_mut() {
            h.flush()?;
        }
        Ok(())
    }
}

/// Sink writing each connected source to its own set of files.
pub struct FileSink {
    path: Setting<String>,
    max_file_size: Setting<u64>,
    records_written: Setting<u64>,
    records_dropped: Setting<u64>,
    recordings: Vec<Recording>,
}

impl Default for FileSink {
    fn default() -> Self {
        Self {
            path: Setting::new(".".to_string()),
            max_file_size: Setting::new(DEFAULT_MAX_FILE_SIZE),
            records_written: Setting::new(0),
            records_dropped: Setting::new(0),
            recordings: Vec::new(),
        }
    }
}

impl FileSink {
    pub const TYPE_NAME: &'static str = "FileSink";

    pub fn new() -> Self {
        Self::default()
    }

    /// Record the next window of one source. `Ok(false)` when none is ready.
    fn record_window(&mut self, ctx: &mut FilterContext<'_>, index: usize) -> anyhow::Result<bool> {
        let limit = self.max_file_size.get();
        let name = ctx.name().to_string();
        let recording = &mut self.recordings[index];
        let Some(reader) = ctx.reader(recording.port) else {
            return Ok(false);
        };
        let window = match reader.start_read_batch() {
            Ok(window) => window,
            Err(QueueError::WouldBlock) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let fresh = window.fresh();
        let count = fresh.len() as u64;
        if recording.failed {
            window.end_read();
            self.records_dropped.update(|n| *n += count);
            return Ok(true);
        }

        let mut written = 0u64;
        let mut outcome = Ok(());
        for i in fresh {
            let len = window.data(i).len() as u64;
            if limit > 0 && recording.bytes > 0 && recording.bytes + len > limit {
                if let Err(e) = recording.rotate(&name) {
                    outcome = Err(e);
                    break;
                }
            }
            if let Err(e) = recording.write(window.data(i), window.header(i)) {
                outcome = Err(e.into());
                break;
            }
            written += 1;
        }
        // The window is consumed either way; a retry would write it twice.
        window.end_read();
        self.records_written.update(|n| *n += written);

        if let Err(e) = outcome {
            recording.failed = true;
            self.records_dropped.update(|n| *n += count - written);
            tracing::error!(
                "FileSink '{}': recording of source {} stopped: {:#}",
                name,
                recording.port,
                e
            );
            return Err(e.context(format!("recording of source {} stopped", recording.port)));
        }
        Ok(true)
    }
}

impl FilterPlugin for FileSink {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn port_limits(&self) -> PortLimits {
        PortLimits::sink_only(FILE_SINK_PORTS)
    }

    fn register_settings(&mut self, settings: &mut Settings) -> SettingsResult<()> {
        settings.add_setting(
            "path",
            &self.path,
            SettingOptions::default().describe("Directory receiving the recordings"),
        )?;
        settings.add_setting(
            "max_file_size",
            &self.max_file_size,
            SettingOptions::default().describe("Bytes per data file before rotating; 0 disables"),
        )?;
        settings.add_setting(
            "records_written",
            &self.records_written,
            SettingOptions::default()
                .read_only()
                .describe("Records recorded since start"),
        )?;
        settings.add_setting(
            "records_dropped",
            &self.records_dropped,
            SettingOptions::default()
                .read_only()
                .describe("Records lost to write errors since start"),
        )
    }

    fn on_set(&mut self, _ctx: &mut FilterContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_start(&mut self, ctx: &mut FilterContext<'_>) -> anyhow::Result<()> {
        let dir = PathBuf::from(self.path.get());
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;
        let ports = ctx.connected_sources();
        let now = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        let timestamp = unique_stamp(&dir, &now, ctx.name(), &ports);

        let mut recordings = Vec::new();
        for port in ports {
            let schema = ctx
                .source_schema(port)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("source port {} lost its queue", port))?;
            recordings.push(Recording::open(&dir, &timestamp, ctx.name(), port, schema)?);
        }
        tracing::info!(
            "FileSink '{}': recording {} queues into {:?}",
            ctx.name(),
            recordings.len(),
            dir
        );
        self.recordings = recordings;
        self.records_written.set(0);
        self.records_dropped.set(0);
        Ok(())
    }

    fn job(&mut self, ctx: &mut FilterContext<'_>) -> JobStatus {
        let mut status = JobStatus::Idle;
        for index in 0..self.recordings.len() {
            match self.record_window(ctx, index) {
                Ok(true) => status = JobStatus::Progress,
                Ok(false) => {}
                Err(e) => return JobStatus::Failed(format!("{:#}", e)),
            }
        }
        status
    }

    fn on_stop(&mut self, ctx: &mut FilterContext<'_>) {
        for recording in &mut self.recordings {
            if let Err(e) = recording.flush() {
                tracing::warn!("FileSink '{}': flush failed: {}", ctx.name(), e);
            }
        }
    }

    fn on_reset(&mut self, _ctx: &mut FilterContext<'_>) {
        self.recordings.clear();
    }
}
