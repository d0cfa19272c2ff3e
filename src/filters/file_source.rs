//! Replays a recording made by [`FileSink`](super::FileSink).

use super::file_sink::{header_path, schema_path};
use crate::filter::{FilterContext, FilterPlugin, JobStatus, PortLimits};
use crate::queue::QueueError;
use crate::schema::Message;
use crate::settings::{Setting, SettingOptions, Settings, SettingsResult};
use anyhow::Context;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek};
use std::path::{Path, PathBuf};

struct Playback {
    data: BufReader<File>,
    header: Option<BufReader<File>>,
}

impl Playback {
    fn open(data_file: &Path, with_header: bool) -> anyhow::Result<Self> {
        let data = File::open(data_file)
            .with_context(|| format!("Failed to open recording {:?}", data_file))?;
        let header = if with_header {
            let path = header_path(data_file);
            let file = File::open(&path)
                .with_context(|| format!("Failed to open header recording {:?}", path))?;
            Some(BufReader::new(file))
        } else {
            None
        };
        Ok(Self {
            data: BufReader::new(data),
            header,
        })
    }

    fn rewind(&mut self) -> std::io::Result<()> {
        self.data.rewind()?;
        if let Some(h) = self.header.as_mut() {
            h.rewind()?;
        }
        Ok(())
    }

    /// Fill one record. `Ok(false)` at a clean or truncated end of file.
    fn read_record(&mut self, data: &mut [u8], header: &mut [u8]) -> std::io::Result<bool> {
        if let Err(e) = self.data.read_exact(data) {
            return match e.kind() {
                ErrorKind::UnexpectedEof => Ok(false),
                _ => Err(e),
            };
        }
        if let Some(h) = self.header.as_mut() {
            if let Err(e) = h.read_exact(header) {
                return match e.kind() {
                    ErrorKind::UnexpectedEof => Ok(false),
                    _ => Err(e),
                };
            }
        }
        Ok(true)
    }
}

/// Source publishing the records of one data file on sink 0.
///
/// The queue schema comes from the `.json` file next to `data_file`. At the
/// end of the file the source either idles or, with `loop` set, starts over.
/// Each job publishes up to the sink's write `batch` records at once; a
/// short final batch publishes whatever the file still held.
pub struct FileSource {
    data_file: Setting<String>,
    looping: Setting<bool>,
    playback: Option<Playback>,
    header_buf: Vec<u8>,
    finished: bool,
}

impl Default for FileSource {
    fn default() -> Self {
        Self {
            data_file: Setting::new(String::new()),
            looping: Setting::new(false),
            playback: None,
            header_buf: Vec::new(),
            finished: false,
        }
    }
}

impl FileSource {
    pub const TYPE_NAME: &'static str = "FileSource";

    pub fn new() -> Self {
        Self::default()
    }

    /// Schema recorded next to `data_file`.
    pub fn read_schema(data_file: &Path) -> anyhow::Result<Message> {
        let path = schema_path(data_file);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read schema {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse schema {:?}", path))
    }

    fn data_path(&self) -> anyhow::Result<PathBuf> {
        let file = self.data_file.get();
        if file.is_empty() {
            anyhow::bail!("data_file is not set");
        }
        Ok(PathBuf::from(file))
    }
}

impl FilterPlugin for FileSource {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn port_limits(&self) -> PortLimits {
        PortLimits::source_only(1)
    }

    fn register_settings(&mut self, settings: &mut Settings) -> SettingsResult<()> {
        settings.add_setting(
            "data_file",
            &self.data_file,
            SettingOptions::default().describe("Recorded .bin file to replay"),
        )?;
        settings.add_setting(
            "loop",
            &self.looping,
            SettingOptions::default().describe("Restart from the beginning at end of file"),
        )
    }

    fn on_set(&mut self, ctx: &mut FilterContext<'_>) -> anyhow::Result<()> {
        let path = self.data_path()?;
        let schema = Self::read_schema(&path)?;
        let with_header = schema.header().is_some();
        let playback = Playback::open(&path, with_header)?;
        ctx.create_sink_queue(0, schema)?;
        self.playback = Some(playback);
        Ok(())
    }

    fn on_start(&mut self, _ctx: &mut FilterContext<'_>) -> anyhow::Result<()> {
        if let Some(playback) = self.playback.as_mut() {
            playback.rewind()?;
        }
        self.finished = false;
        Ok(())
    }

    fn job(&mut self, ctx: &mut FilterContext<'_>) -> JobStatus {
        if self.finished {
            return JobStatus::Idle;
        }
        let batch = ctx.sink_settings(0).map_or(1, |s| s.batch);
        let (Some(playback), Some(writer)) = (self.playback.as_mut(), ctx.writer(0)) else {
            return JobStatus::Failed("not configured".into());
        };
        let mut records = match writer.start_write_batch(batch) {
            Ok(records) => records,
            Err(QueueError::WouldBlock) => return JobStatus::Idle,
            Err(e) => return JobStatus::Failed(e.to_string()),
        };

        let header = &mut self.header_buf;
        header.resize(records.header_mut(0).len(), 0);
        let mut filled = 0;
        let mut failure = None;
        while filled < records.len() {
            let mut read = playback.read_record(records.data_mut(filled), header);
            if matches!(read, Ok(false)) && self.looping.get() {
                read = playback
                    .rewind()
                    .and_then(|()| playback.read_record(records.data_mut(filled), header));
            }
            match read {
                Ok(true) => {
                    records.header_mut(filled).copy_from_slice(header);
                    filled += 1;
                }
                Ok(false) => {
                    self.finished = true;
                    break;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        records.end_write_first(filled);

        if let Some(e) = failure {
            return JobStatus::Failed(e.to_string());
        }
        if self.finished {
            tracing::info!("FileSource '{}': end of recording", ctx.name());
        }
        if filled > 0 {
            JobStatus::Progress
        } else {
            JobStatus::Idle
        }
    }

    fn on_reset(&mut self, _ctx: &mut FilterContext<'_>) {
        self.playback = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, FilterError};

    #[test]
    fn test_set_requires_data_file() {
        let mut filter = Filter::new("replay", FileSource::new()).unwrap();
        filter.open().unwrap();
        let err = filter.set().unwrap_err();
        assert!(matches!(err, FilterError::Hook { op: "set", .. }));
        assert!(err.to_string().contains("set"));
        assert!(filter.sink_queue(0).is_none());
    }

    #[test]
    fn test_missing_schema_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("rec_q0_dat.bin");
        std::fs::write(&data, [0u8; 4]).unwrap();

        let err = FileSource::read_schema(&data).unwrap_err();
        assert!(format!("{:#}", err).contains("rec_q0_dat.json"));
    }
}
