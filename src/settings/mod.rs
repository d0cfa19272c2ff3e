//! Named, typed reflection table over a filter's own state.
//!
//! Entries alias storage the filter already holds ([`Setting<T>`] handles),
//! so reads and writes through the registry are seen by the filter's job
//! without any copy step. Commands are zero-argument actions returning an
//! integer status.
//!
//! # Document shape
//!
//! [`Settings::save`] produces
//!
//! ```json
//! {
//!   "filter_settings": { "frequency": { "value": 1.0, "type": "f64", "access": "rw", "description": "" } },
//!   "device_settings": { ... },
//!   "filter_commands": { "reset_counter": { "description": "" } }
//! }
//! ```
//!
//! and [`Settings::load`] accepts that document, or the same sections with
//! bare values, or a flat `{ name: value }` map.

mod entry;
mod error;

pub use entry::{Access, Setting, SettingKind, SettingOptions, SettingValue};
pub use error::{SettingsError, SettingsResult};

use crate::filter::FilterState;
use entry::{short_type_name, Binding};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

const COMMANDS_SECTION: &str = "filter_commands";

struct SettingEntry {
    name: String,
    options: SettingOptions,
    binding: Box<dyn Binding>,
}

struct CommandEntry {
    name: String,
    description: String,
    action: Box<dyn FnMut() -> i32 + Send>,
}

/// Introspection record for one entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingInfo {
    pub name: String,
    pub type_tag: &'static str,
    pub kind: SettingKind,
    pub access: Access,
    pub description: String,
}

impl Serialize for SettingKind {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.section())
    }
}

impl Serialize for Access {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.label())
    }
}

/// Settings and commands of one filter.
#[derive(Default)]
pub struct Settings {
    entries: Vec<SettingEntry>,
    commands: Vec<CommandEntry>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registration ──

    /// Register `handle` under `name`. The registry keeps an alias, not a copy.
    pub fn add_setting<T: SettingValue>(
        &mut self,
        name: impl Into<String>,
        handle: &Setting<T>,
        options: SettingOptions,
    ) -> SettingsResult<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(SettingsError::Duplicate(name));
        }
        self.entries.push(SettingEntry {
            name,
            options,
            binding: Box::new(handle.clone()),
        });
        Ok(())
    }

    pub fn add_command(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        action: impl FnMut() -> i32 + Send + 'static,
    ) -> SettingsResult<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(SettingsError::Duplicate(name));
        }
        self.commands.push(CommandEntry {
            name,
            description: description.into(),
            action: Box::new(action),
        });
        Ok(())
    }

    /// Remove every entry of `kind`. Returns how many were removed.
    pub fn remove_kind(&mut self, kind: SettingKind) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.options.kind != kind);
        before - self.entries.len()
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len() + self.commands.len();
        self.entries.retain(|e| e.name != name);
        self.commands.retain(|c| c.name != name);
        before != self.entries.len() + self.commands.len()
    }

    // ── Lookup ──

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some() || self.commands.iter().any(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|c| c.name.as_str())
    }

    pub fn info(&self) -> Vec<SettingInfo> {
        self.entries
            .iter()
            .map(|e| SettingInfo {
                name: e.name.clone(),
                type_tag: e.binding.type_tag(),
                kind: e.options.kind,
                access: e.options.access,
                description: e.options.description.clone(),
            })
            .collect()
    }

    fn entry(&self, name: &str) -> Option<&SettingEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Typed handle to the entry's storage, if `name` exists and holds `T`.
    pub fn handle<T: SettingValue>(&self, name: &str) -> Option<Setting<T>> {
        self.entry(name)?
            .binding
            .as_any()
            .downcast_ref::<Setting<T>>()
            .cloned()
    }

    /// Current value, if `name` exists and holds `T`. Never fails loudly.
    pub fn value<T: SettingValue>(&self, name: &str) -> Option<T> {
        self.handle::<T>(name).map(|h| h.get())
    }

    // ── Writes ──

    /// Write through the alias. Read-only and unknown entries are rejected.
    pub fn set_value<T: SettingValue>(&self, name: &str, value: T) -> SettingsResult<()> {
        let entry = self.writable_entry(name)?;
        Self::typed(entry)?.set(value);
        Ok(())
    }

    /// Like [`Settings::set_value`], also enforcing state-gated access.
    pub fn set_value_in<T: SettingValue>(
        &self,
        name: &str,
        value: T,
        state: FilterState,
    ) -> SettingsResult<()> {
        let entry = self.writable_entry(name)?;
        if !entry.options.access.permits(state) {
            return Err(SettingsError::NotPermitted {
                name: name.to_string(),
                state,
            });
        }
        Self::typed(entry)?.set(value);
        Ok(())
    }

    /// Parse a JSON value into a single entry.
    pub fn set_json(&self, name: &str, value: &Value) -> SettingsResult<()> {
        let entry = self.writable_entry(name)?;
        entry.binding.load_json(name, unwrap_annotated(value))
    }

    fn writable_entry(&self, name: &str) -> SettingsResult<&SettingEntry> {
        let entry = self
            .entry(name)
            .ok_or_else(|| SettingsError::NotFound(name.to_string()))?;
        if !entry.options.access.is_writable() {
            return Err(SettingsError::ReadOnly(name.to_string()));
        }
        Ok(entry)
    }

    fn typed<T: SettingValue>(entry: &SettingEntry) -> SettingsResult<&Setting<T>> {
        entry
            .binding
            .as_any()
            .downcast_ref::<Setting<T>>()
            .ok_or_else(|| SettingsError::TypeMismatch {
                name: entry.name.clone(),
                expected: entry.binding.type_tag(),
                requested: short_type_name::<T>(),
            })
    }

    // ── Commands ──

    pub fn run_command(&mut self, name: &str) -> SettingsResult<i32> {
        let command = self
            .commands
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| SettingsError::NotFound(name.to_string()))?;
        tracing::debug!("Running command '{}'", name);
        Ok((command.action)())
    }

    // ── Documents ──

    /// Apply every recognised setting found in `config`.
    ///
    /// Looks in `filter_settings`, `device_settings` and at top-level keys.
    /// Unknown names are ignored. Values that fail to parse are ignored and
    /// the previous value is kept. Returns the number of entries updated.
    pub fn load(&self, config: &Value) -> usize {
        let Some(root) = config.as_object() else {
            return 0;
        };
        let mut applied = 0;
        let sections = [SettingKind::Filter.section(), SettingKind::Device.section()];
        for section in sections {
            if let Some(values) = root.get(section).and_then(Value::as_object) {
                applied += self.load_map(values);
            }
        }
        let flat: Map<String, Value> = root
            .iter()
            .filter(|(k, _)| !sections.contains(&k.as_str()) && k.as_str() != COMMANDS_SECTION)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        applied + self.load_map(&flat)
    }

    fn load_map(&self, values: &Map<String, Value>) -> usize {
        let mut applied = 0;
        for (name, value) in values {
            // Configuration is authoritative, so read-only entries load too.
            let Some(entry) = self.entry(name) else {
                tracing::trace!("Ignoring unknown setting '{}'", name);
                continue;
            };
            match entry.binding.load_json(name, unwrap_annotated(value)) {
                Ok(()) => applied += 1,
                Err(e) => tracing::warn!("Ignoring setting '{}': {}", name, e),
            }
        }
        applied
    }

    /// Snapshot every entry with its description and type.
    pub fn save(&self) -> Value {
        let mut filter = Map::new();
        let mut device = Map::new();
        for entry in &self.entries {
            let value = match entry.binding.to_json() {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("Skipping setting '{}' on save: {}", entry.name, e);
                    continue;
                }
            };
            let record = serde_json::json!({
                "value": value,
                "type": entry.binding.type_tag(),
                "access": entry.options.access.label(),
                "description": entry.options.description,
            });
            match entry.options.kind {
                SettingKind::Filter => filter.insert(entry.name.clone(), record),
                SettingKind::Device => device.insert(entry.name.clone(), record),
            };
        }
        let commands: Map<String, Value> = self
            .commands
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    serde_json::json!({ "description": c.description }),
                )
            })
            .collect();

        let mut doc = Map::new();
        doc.insert(SettingKind::Filter.section().to_string(), Value::Object(filter));
        if !device.is_empty() {
            doc.insert(SettingKind::Device.section().to_string(), Value::Object(device));
        }
        if !commands.is_empty() {
            doc.insert(COMMANDS_SECTION.to_string(), Value::Object(commands));
        }
        Value::Object(doc)
    }

    /// Write [`Settings::save`] to `path` (TOML for `.toml`, JSON otherwise).
    pub fn persist(&self, path: impl AsRef<Path>) -> SettingsResult<()> {
        write_document(path.as_ref(), &self.save())
    }

    /// Read a document written by [`Settings::persist`] and [`Settings::load`] it.
    pub fn restore(&self, path: impl AsRef<Path>) -> SettingsResult<usize> {
        let doc = read_document(path.as_ref())?;
        Ok(self.load(&doc))
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("entries", &self.names().collect::<Vec<_>>())
            .field("commands", &self.command_names().collect::<Vec<_>>())
            .finish()
    }
}

/// Accept both `value` and `{ "value": value, "type": ... }`.
fn unwrap_annotated(value: &Value) -> &Value {
    match value.as_object() {
        Some(obj) if obj.contains_key("value") && obj.contains_key("type") => &obj["value"],
        _ => value,
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
}

/// Serialize a structured document as JSON or TOML depending on extension.
pub(crate) fn write_document(path: &Path, doc: &Value) -> SettingsResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let content = if is_toml(path) {
        toml::to_string_pretty(doc).map_err(|e| SettingsError::Parse(e.to_string()))?
    } else {
        serde_json::to_string_pretty(doc).map_err(|e| SettingsError::Parse(e.to_string()))?
    };
    std::fs::write(path, content)?;
    Ok(())
}

pub(crate) fn read_document(path: &Path) -> SettingsResult<Value> {
    let content = std::fs::read_to_string(path)?;
    if is_toml(path) {
        toml::from_str(&content).map_err(|e| SettingsError::Parse(e.to_string()))
    } else {
        serde_json::from_str(&content).map_err(|e| SettingsError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn registry() -> (Settings, Setting<i32>, Setting<f64>) {
        let count = Setting::new(3);
        let gain = Setting::new(1.5);
        let mut settings = Settings::new();
        settings
            .add_setting("count", &count, SettingOptions::default().describe("items"))
            .unwrap();
        settings
            .add_setting("gain", &gain, SettingOptions::default().read_only())
            .unwrap();
        (settings, count, gain)
    }

    #[test]
    fn test_value_reads_through_alias() {
        let (settings, count, _) = registry();
        count.set(11);
        assert_eq!(settings.value::<i32>("count"), Some(11));
    }

    #[test]
    fn test_value_wrong_type_or_missing_is_none() {
        let (settings, _, _) = registry();
        assert_eq!(settings.value::<f64>("count"), None);
        assert_eq!(settings.value::<i32>("missing"), None);
    }

    #[test]
    fn test_set_value_writes_alias() {
        let (settings, count, _) = registry();
        settings.set_value("count", 8).unwrap();
        assert_eq!(count.get(), 8);
    }

    #[test]
    fn test_set_value_rejections() {
        let (settings, _, gain) = registry();
        assert!(matches!(
            settings.set_value("gain", 2.0),
            Err(SettingsError::ReadOnly(_))
        ));
        assert_eq!(gain.get(), 1.5);
        assert!(matches!(
            settings.set_value("nope", 1),
            Err(SettingsError::NotFound(_))
        ));
        assert!(matches!(
            settings.set_value("count", "text".to_string()),
            Err(SettingsError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_state_gated_write() {
        let limit = Setting::new(10u32);
        let mut settings = Settings::new();
        settings
            .add_setting(
                "limit",
                &limit,
                SettingOptions::default().writable_when(&[FilterState::Closed]),
            )
            .unwrap();
        assert!(settings.set_value_in("limit", 5u32, FilterState::Closed).is_ok());
        assert!(matches!(
            settings.set_value_in("limit", 6u32, FilterState::Running),
            Err(SettingsError::NotPermitted { .. })
        ));
        assert_eq!(limit.get(), 5);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let (mut settings, count, _) = registry();
        assert!(matches!(
            settings.add_setting("count", &count, SettingOptions::default()),
            Err(SettingsError::Duplicate(_))
        ));
        assert!(settings.add_command("count", "", || 0).is_err());
    }

    #[test]
    fn test_load_ignores_unknown_and_mismatched() {
        let (settings, count, gain) = registry();
        let applied = settings.load(&json!({
            "filter_settings": { "count": "not-a-number", "unknown": 1 },
            "gain": 4.0,
        }));
        assert_eq!(applied, 1);
        assert_eq!(count.get(), 3);
        assert_eq!(gain.get(), 4.0);
    }

    #[test]
    fn test_save_load_round_trip() {
        let (settings, count, gain) = registry();
        count.set(42);
        gain.set(0.25);
        let doc = settings.save();
        assert_eq!(doc["filter_settings"]["count"]["value"], json!(42));
        assert_eq!(doc["filter_settings"]["count"]["description"], json!("items"));
        assert_eq!(doc["filter_settings"]["gain"]["access"], json!("r"));

        let (fresh, fresh_count, fresh_gain) = registry();
        assert_eq!(fresh.load(&doc), 2);
        assert_eq!(fresh_count.get(), 42);
        assert_eq!(fresh_gain.get(), 0.25);
    }

    #[test]
    fn test_remove_device_entries() {
        let (mut settings, _, _) = registry();
        let port = Setting::new("COM1".to_string());
        settings
            .add_setting("port", &port, SettingOptions::device())
            .unwrap();
        assert!(settings.save().get("device_settings").is_some());
        assert_eq!(settings.remove_kind(SettingKind::Device), 1);
        assert!(!settings.contains("port"));
        assert_eq!(settings.len(), 2);
    }

    #[test]
    fn test_run_command() {
        let calls = Arc::new(AtomicI32::new(0));
        let counter = Arc::clone(&calls);
        let mut settings = Settings::new();
        settings
            .add_command("bump", "increment", move || {
                counter.fetch_add(1, Ordering::SeqCst) + 1
            })
            .unwrap();
        assert_eq!(settings.run_command("bump").unwrap(), 1);
        assert_eq!(settings.run_command("bump").unwrap(), 2);
        assert!(matches!(
            settings.run_command("missing"),
            Err(SettingsError::NotFound(_))
        ));
        assert!(settings.save()["filter_commands"].get("bump").is_some());
    }

    #[test]
    fn test_persist_restore_json_and_toml() {
        let dir = tempfile::tempdir().unwrap();
        for file in ["settings.json", "settings.toml"] {
            let (settings, count, _) = registry();
            count.set(77);
            let path = dir.path().join(file);
            settings.persist(&path).unwrap();

            let (fresh, fresh_count, _) = registry();
            assert_eq!(fresh.restore(&path).unwrap(), 2);
            assert_eq!(fresh_count.get(), 77);
        }
    }
}
