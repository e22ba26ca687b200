//! Workflow environment and persisted settings.
//!
//! Alfred hands workflow configuration to scripts as environment variables.
//! [`Settings`] merges those with an optional `settings.yaml` in the workflow's
//! data directory and decodes the result into any `Deserialize` struct.

use serde::de::{self, value, DeserializeOwned, IntoDeserializer, Visitor};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File name of the persisted settings inside the data directory.
pub const SETTINGS_FILE: &str = "settings.yaml";

/// Bundle id used when running outside Alfred.
pub const DEFAULT_BUNDLE_ID: &str = "alfred-utils";

/// Flat key/value settings store.
#[derive(Debug, Clone, Default)]
pub struct Settings {
  values: BTreeMap<String, String>,
  path: Option<PathBuf>,
}

impl Settings {
  /// Load settings for a workflow.
  ///
  /// Merge order (later wins):
  /// 1. `<data_dir>/settings.yaml`, if present
  /// 2. process environment variables
  pub fn load(data_dir: &Path) -> Result<Self> {
    let path = data_dir.join(SETTINGS_FILE);
    let mut settings = if path.exists() {
      Self::load_from_path(&path)?
    } else {
      Self {
        values: BTreeMap::new(),
        path: Some(path),
      }
    };
    settings.extend(std::env::vars());
    Ok(settings)
  }

  /// Settings built from the process environment only.
  pub fn from_env() -> Self {
    Self::from_pairs(std::env::vars())
  }

  /// Settings built from explicit key/value pairs.
  pub fn from_pairs<I, K, V>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let mut settings = Self::default();
    settings.extend(pairs);
    settings
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).map_err(|source| Error::SettingsRead {
      path: path.to_path_buf(),
      source,
    })?;

    let raw: BTreeMap<String, serde_yaml::Value> =
      serde_yaml::from_str(&contents).map_err(|source| Error::SettingsParse {
        path: path.to_path_buf(),
        source,
      })?;

    let values = raw
      .into_iter()
      .filter_map(|(k, v)| flatten_yaml(&v).map(|v| (normalize_key(&k), v)))
      .collect();

    Ok(Self {
      values,
      path: Some(path.to_path_buf()),
    })
  }

  /// Overlay key/value pairs onto the current settings.
  pub fn extend<I, K, V>(&mut self, pairs: I)
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    for (k, v) in pairs {
      self.values.insert(normalize_key(&k.into()), v.into());
    }
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.values.get(&normalize_key(key)).map(String::as_str)
  }

  /// Set a value and persist it to the settings file.
  ///
  /// Only keys written through `set` end up in the file; environment values
  /// are never copied into it.
  pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
    let key = normalize_key(key);
    self.values.insert(key.clone(), value.to_string());

    let Some(path) = self.path.clone() else {
      return Ok(());
    };

    let mut persisted: BTreeMap<String, String> = if path.exists() {
      let contents = std::fs::read_to_string(&path).map_err(|source| Error::SettingsRead {
        path: path.clone(),
        source,
      })?;
      let raw: BTreeMap<String, serde_yaml::Value> =
        serde_yaml::from_str(&contents).map_err(|source| Error::SettingsParse {
          path: path.clone(),
          source,
        })?;
      raw
        .into_iter()
        .filter_map(|(k, v)| flatten_yaml(&v).map(|v| (normalize_key(&k), v)))
        .collect()
    } else {
      BTreeMap::new()
    };
    persisted.insert(key, value.to_string());

    let contents = encode_settings(&path, &persisted)?;

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|source| Error::SettingsWrite {
        path: path.clone(),
        source,
      })?;
    }
    std::fs::write(&path, contents).map_err(|source| Error::SettingsWrite { path, source })
  }

  /// Decode the settings into a caller-supplied structure.
  ///
  /// Field names are matched against lower-cased keys, so `API_KEY` fills
  /// `api_key`. Unknown keys are ignored unless the target denies them.
  pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
    let deserializer = value::MapDeserializer::<_, value::Error>::new(
      self
        .values
        .iter()
        .map(|(k, v)| (k.as_str(), SettingValue(v.as_str()))),
    );
    Ok(T::deserialize(deserializer)?)
  }
}

fn encode_settings<T: serde::Serialize + ?Sized>(path: &Path, values: &T) -> Result<String> {
  serde_yaml::to_string(values).map_err(|source| Error::SettingsEncode {
    path: path.to_path_buf(),
    source,
  })
}

fn normalize_key(key: &str) -> String {
  key.trim().to_lowercase()
}

/// Turn a YAML value into the same string form an environment variable has.
fn flatten_yaml(value: &serde_yaml::Value) -> Option<String> {
  use serde_yaml::Value;
  match value {
    Value::Null => Some(String::new()),
    Value::Bool(b) => Some(b.to_string()),
    Value::Number(n) => Some(n.to_string()),
    Value::String(s) => Some(s.clone()),
    Value::Sequence(items) => Some(
      items
        .iter()
        .filter_map(flatten_yaml)
        .collect::<Vec<_>>()
        .join(","),
    ),
    Value::Mapping(_) => None,
    Value::Tagged(tagged) => flatten_yaml(&tagged.value),
  }
}

/// A single setting value, parsed on demand into whatever the target field
/// asks for.
struct SettingValue<'a>(&'a str);

impl<'de, 'a> IntoDeserializer<'de, value::Error> for SettingValue<'a> {
  type Deserializer = Self;

  fn into_deserializer(self) -> Self {
    self
  }
}

fn parse_bool(s: &str) -> Option<bool> {
  match s.trim().to_lowercase().as_str() {
    "true" | "1" | "yes" | "on" => Some(true),
    "false" | "0" | "no" | "off" | "" => Some(false),
    _ => None,
  }
}

macro_rules! deserialize_parsed {
  ($($method:ident => $visit:ident,)*) => {
    $(
      fn $method<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, value::Error> {
        let parsed = self.0.trim().parse().map_err(|e| {
          de::Error::custom(format!("invalid value {:?}: {}", self.0, e))
        })?;
        visitor.$visit(parsed)
      }
    )*
  };
}

impl<'de, 'a> de::Deserializer<'de> for SettingValue<'a> {
  type Error = value::Error;

  fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
    visitor.visit_str(self.0)
  }

  fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
    match parse_bool(self.0) {
      Some(b) => visitor.visit_bool(b),
      None => Err(de::Error::custom(format!("invalid boolean {:?}", self.0))),
    }
  }

  deserialize_parsed! {
    deserialize_i8 => visit_i8,
    deserialize_i16 => visit_i16,
    deserialize_i32 => visit_i32,
    deserialize_i64 => visit_i64,
    deserialize_u8 => visit_u8,
    deserialize_u16 => visit_u16,
    deserialize_u32 => visit_u32,
    deserialize_u64 => visit_u64,
    deserialize_f32 => visit_f32,
    deserialize_f64 => visit_f64,
  }

  fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
    if self.0.is_empty() {
      visitor.visit_none()
    } else {
      visitor.visit_some(self)
    }
  }

  fn deserialize_newtype_struct<V: Visitor<'de>>(
    self,
    _name: &'static str,
    visitor: V,
  ) -> std::result::Result<V::Value, Self::Error> {
    visitor.visit_newtype_struct(self)
  }

  fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> std::result::Result<V::Value, Self::Error> {
    let items = self
      .0
      .split(',')
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(SettingValue);
    visitor.visit_seq(value::SeqDeserializer::<_, value::Error>::new(items))
  }

  fn deserialize_enum<V: Visitor<'de>>(
    self,
    _name: &'static str,
    _variants: &'static [&'static str],
    visitor: V,
  ) -> std::result::Result<V::Value, Self::Error> {
    let variant: value::StrDeserializer<'_, value::Error> = self.0.trim().into_deserializer();
    visitor.visit_enum(variant)
  }

  serde::forward_to_deserialize_any! {
    char str string bytes byte_buf unit unit_struct tuple tuple_struct
    map struct identifier ignored_any
  }
}

/// What Alfred tells a workflow about itself.
#[derive(Debug, Clone, Default, Deserialize)]
struct AlfredVariables {
  alfred_workflow_bundleid: Option<String>,
  alfred_workflow_cache: Option<PathBuf>,
  alfred_workflow_data: Option<PathBuf>,
  alfred_workflow_version: Option<String>,
  #[serde(default)]
  alfred_debug: bool,
}

/// Resolved workflow environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
  pub bundle_id: String,
  pub cache_dir: PathBuf,
  pub data_dir: PathBuf,
  pub version: String,
  /// Alfred's debugger is open
  pub debug: bool,
}

impl Environment {
  /// Resolve the environment from Alfred's variables.
  ///
  /// Outside Alfred, directories fall back to
  /// `$XDG_CACHE_HOME/<bundle id>` and `$XDG_DATA_HOME/<bundle id>`.
  pub fn resolve(settings: &Settings, fallback_bundle_id: &str) -> Result<Self> {
    let vars: AlfredVariables = settings.decode()?;

    let bundle_id = vars
      .alfred_workflow_bundleid
      .unwrap_or_else(|| fallback_bundle_id.to_string());

    let cache_dir = match vars.alfred_workflow_cache {
      Some(dir) => dir,
      None => dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|p| p.join(".cache")))
        .ok_or(Error::NoDirectory("cache"))?
        .join(&bundle_id),
    };

    let data_dir = match vars.alfred_workflow_data {
      Some(dir) => dir,
      None => dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
        .ok_or(Error::NoDirectory("data"))?
        .join(&bundle_id),
    };

    Ok(Self {
      bundle_id,
      cache_dir,
      data_dir,
      version: vars
        .alfred_workflow_version
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
      debug: vars.alfred_debug,
    })
  }
}
