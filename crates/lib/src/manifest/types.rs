//! Manifest types.
//!
//! The same [`Manifest`] shape is used for the author manifest read from the
//! project and for the resolved manifest written to the output directory.
//! Keys follow the browser's manifest format (`snake_case`). Keys that the
//! orchestrator does not interpret are kept in `extra` maps and written back
//! untouched.
//!
//! # Example
//!
//! ```json
//! {
//!   "manifest_version": 3,
//!   "name": "Example",
//!   "action": { "default_popup": "src/popup.html" },
//!   "background": { "service_worker": "src/background.ts", "type": "module" },
//!   "content_scripts": [
//!     { "js": ["./src/content-1.ts", "./src/nested/content-2.ts"], "matches": ["<all_urls>"] },
//!     { "js": ["./src/content-4.ts"] }
//!   ],
//!   "content_security_policy": { "extension_pages": "script-src 'self';" }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("no manifest found at {}", path.display())]
  NotFound { path: PathBuf },

  #[error("failed to read manifest {}: {source}", path.display())]
  Read { path: PathBuf, source: std::io::Error },

  #[error("failed to parse manifest {}: {source}", path.display())]
  Parse { path: PathBuf, source: serde_json::Error },
}

fn default_manifest_version() -> u32 {
  3
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default_popup: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Action {
  /// Paths of `default_icon`, given either as one path or as a size map.
  pub fn default_icons(&self) -> Vec<&str> {
    match self.extra.get("default_icon") {
      Some(Value::String(path)) => vec![path.as_str()],
      Some(Value::Object(sizes)) => sizes.values().filter_map(Value::as_str).collect(),
      _ => Vec::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Background {
  pub service_worker: String,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub kind: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentScriptGroup {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub matches: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub js: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub run_at: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub all_frames: Option<bool>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl ContentScriptGroup {
  /// Groups without match patterns are built but never registered.
  pub fn is_registered(&self) -> bool {
    self.matches.as_ref().is_some_and(|m| !m.is_empty())
  }

  /// Stylesheets injected alongside the group's scripts.
  pub fn css(&self) -> Vec<&str> {
    self
      .extra
      .get("css")
      .and_then(Value::as_array)
      .map(|files| files.iter().filter_map(Value::as_str).collect())
      .unwrap_or_default()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentSecurityPolicy {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub extension_pages: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebAccessibleResource {
  pub resources: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub matches: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub use_dynamic_url: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub extension_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
  #[serde(default = "default_manifest_version")]
  pub manifest_version: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub author: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub permissions: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub host_permissions: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub action: Option<Action>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub background: Option<Background>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content_scripts: Option<Vec<ContentScriptGroup>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content_security_policy: Option<ContentSecurityPolicy>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub web_accessible_resources: Option<Vec<WebAccessibleResource>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub icons: Option<BTreeMap<String, String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub commands: Option<Map<String, Value>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub chrome_url_overrides: Option<Map<String, Value>>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Default for Manifest {
  fn default() -> Self {
    Self {
      manifest_version: default_manifest_version(),
      name: None,
      version: None,
      version_name: None,
      description: None,
      author: None,
      permissions: None,
      host_permissions: None,
      action: None,
      background: None,
      content_scripts: None,
      content_security_policy: None,
      web_accessible_resources: None,
      icons: None,
      commands: None,
      chrome_url_overrides: None,
      extra: Map::new(),
    }
  }
}

impl Manifest {
  /// Load an author manifest from disk.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let content = match std::fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Err(ManifestError::NotFound {
          path: path.to_path_buf(),
        });
      }
      Err(e) => {
        return Err(ManifestError::Read {
          path: path.to_path_buf(),
          source: e,
        });
      }
    };

    serde_json::from_str(&content).map_err(|e| ManifestError::Parse {
      path: path.to_path_buf(),
      source: e,
    })
  }

  pub fn popup(&self) -> Option<&str> {
    self.action.as_ref().and_then(|a| a.default_popup.as_deref())
  }

  pub fn service_worker(&self) -> Option<&str> {
    self.background.as_ref().map(|b| b.service_worker.as_str())
  }

  pub fn content_groups(&self) -> &[ContentScriptGroup] {
    self.content_scripts.as_deref().unwrap_or_default()
  }

  pub fn extension_pages_policy(&self) -> Option<&str> {
    self
      .content_security_policy
      .as_ref()
      .and_then(|c| c.extension_pages.as_deref())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  const EXAMPLE: &str = r#"{
    "manifest_version": 3,
    "name": "Example 1",
    "action": { "default_popup": "src/popup.tsx", "default_title": "Click" },
    "content_security_policy": { "extension_pages": "script-src 'self';" },
    "content_scripts": [
      { "js": ["./src/content-1.ts", "./src/nested/content-2.ts"], "matches": ["<all_urls>"] },
      { "js": ["./src/content-3.ts"], "matches": ["<all_urls>"], "run_at": "document_end" },
      { "js": ["./src/content-4.ts"] }
    ],
    "background": { "service_worker": "src/background.ts", "type": "module" },
    "minimum_chrome_version": "120"
  }"#;

  #[test]
  fn parses_author_manifest() {
    let manifest: Manifest = serde_json::from_str(EXAMPLE).unwrap();

    assert_eq!(manifest.name.as_deref(), Some("Example 1"));
    assert_eq!(manifest.popup(), Some("src/popup.tsx"));
    assert_eq!(manifest.service_worker(), Some("src/background.ts"));
    assert_eq!(manifest.content_groups().len(), 3);
    assert_eq!(manifest.content_groups()[1].run_at.as_deref(), Some("document_end"));
    assert_eq!(manifest.extension_pages_policy(), Some("script-src 'self';"));
  }

  #[test]
  fn unknown_keys_survive_a_roundtrip() {
    let manifest: Manifest = serde_json::from_str(EXAMPLE).unwrap();
    let json = serde_json::to_value(&manifest).unwrap();

    assert_eq!(json["minimum_chrome_version"], "120");
    assert_eq!(json["action"]["default_title"], "Click");
  }

  #[test]
  fn registration_requires_match_patterns() {
    let manifest: Manifest = serde_json::from_str(EXAMPLE).unwrap();
    let groups = manifest.content_groups();

    assert!(groups[0].is_registered());
    assert!(!groups[2].is_registered());

    let empty = ContentScriptGroup {
      matches: Some(vec![]),
      ..Default::default()
    };
    assert!(!empty.is_registered());
  }

  #[test]
  fn manifest_version_defaults_to_three() {
    let manifest: Manifest = serde_json::from_str(r#"{ "name": "x" }"#).unwrap();
    assert_eq!(manifest.manifest_version, 3);
  }

  #[test]
  fn load_reports_missing_manifest() {
    let temp = TempDir::new().unwrap();
    let result = Manifest::load(&temp.path().join("manifest.json"));

    assert!(matches!(result, Err(ManifestError::NotFound { .. })));
  }

  #[test]
  fn load_reports_parse_errors() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("manifest.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(Manifest::load(&path), Err(ManifestError::Parse { .. })));
  }
}
