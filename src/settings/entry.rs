//! Shared setting storage and the type-erased binding behind each entry.

use crate::filter::FilterState;
use crate::settings::{SettingsError, SettingsResult};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;

/// Values a setting can hold.
pub trait SettingValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> SettingValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Shared handle to a filter-owned value.
///
/// The filter keeps one clone and registers another with its [`Settings`];
/// writes through either are seen by both. No value is copied at registration.
///
/// [`Settings`]: crate::settings::Settings
#[derive(Debug, Default)]
pub struct Setting<T>(Arc<RwLock<T>>);

impl<T> Clone for Setting<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Clone> Setting<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    pub fn get(&self) -> T {
        self.0.read().clone()
    }

    pub fn set(&self, value: T) {
        *self.0.write() = value;
    }

    /// Mutate in place under the write lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.write())
    }

    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, T> {
        self.0.read()
    }

    /// True if both handles alias the same storage.
    pub fn same_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Which lifetime an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKind {
    /// Registered at construction, lives as long as the filter.
    Filter,
    /// Registered during `open`, removed on `close`.
    Device,
}

impl SettingKind {
    pub(crate) fn section(&self) -> &'static str {
        match self {
            SettingKind::Filter => "filter_settings",
            SettingKind::Device => "device_settings",
        }
    }
}

/// Who may write an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
    /// Writable only while the filter is in one of the listed states.
    WriteWhen(&'static [FilterState]),
}

impl Access {
    pub fn is_writable(&self) -> bool {
        !matches!(self, Access::ReadOnly)
    }

    pub fn permits(&self, state: FilterState) -> bool {
        match self {
            Access::ReadWrite => true,
            Access::ReadOnly => false,
            Access::WriteWhen(states) => states.contains(&state),
        }
    }

    pub(crate) fn label(&self) -> String {
        match self {
            Access::ReadWrite => "rw".to_string(),
            Access::ReadOnly => "r".to_string(),
            Access::WriteWhen(states) => {
                let states: Vec<String> = states.iter().map(|s| s.to_string()).collect();
                format!("rw@{}", states.join("|"))
            }
        }
    }
}

/// Registration options for [`Settings::add_setting`](crate::settings::Settings::add_setting).
#[derive(Debug, Clone)]
pub struct SettingOptions {
    pub kind: SettingKind,
    pub access: Access,
    pub description: String,
}

impl Default for SettingOptions {
    fn default() -> Self {
        Self {
            kind: SettingKind::Filter,
            access: Access::ReadWrite,
            description: String::new(),
        }
    }
}

impl SettingOptions {
    pub fn device() -> Self {
        Self {
            kind: SettingKind::Device,
            ..Self::default()
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn read_only(mut self) -> Self {
        self.access = Access::ReadOnly;
        self
    }

    pub fn writable_when(mut self, states: &'static [FilterState]) -> Self {
        self.access = Access::WriteWhen(states);
        self
    }
}

/// Type-erased view of a [`Setting<T>`].
pub(crate) trait Binding: Send + Sync {
    fn type_tag(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn to_json(&self) -> SettingsResult<Value>;
    /// Parse `value` and store it. On error the stored value is untouched.
    fn load_json(&self, name: &str, value: &Value) -> SettingsResult<()>;
}

pub(crate) fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    // Keep generic arguments readable: only strip the leading path.
    match full.find('<') {
        Some(generic) => {
            let head = &full[..generic];
            let start = head.rfind("::").map_or(0, |i| i + 2);
            &full[start..]
        }
        None => full.rsplit("::").next().unwrap_or(full),
    }
}

impl<T: SettingValue> Binding for Setting<T> {
    fn type_tag(&self) -> &'static str {
        short_type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_json(&self) -> SettingsResult<Value> {
        serde_json::to_value(&*self.read()).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    fn load_json(&self, name: &str, value: &Value) -> SettingsResult<()> {
        let parsed = match serde_json::from_value::<T>(value.clone()) {
            Ok(v) => v,
            // Config documents often quote scalars: "10", "true", "2.5".
            Err(first) => match value.as_str().map(serde_json::from_str::<T>) {
                Some(Ok(v)) => v,
                _ => {
                    return Err(SettingsError::InvalidValue {
                        name: name.to_string(),
                        message: first.to_string(),
                    })
                }
            },
        };
        self.set(parsed);
        Ok(())
    }
}
