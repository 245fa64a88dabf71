//! Content-Security-Policy directive model.
//!
//! Parses a serialized policy into an ordered map of directive name to source
//! list, following the [serialized policy parsing algorithm][0]:
//!
//! - tokens are split on `;` and trimmed of ASCII whitespace
//! - empty tokens and tokens containing non-ASCII bytes are dropped
//! - directive names are lower-cased
//! - the first occurrence of a directive wins, later duplicates are ignored
//!
//! [0]: https://w3c.github.io/webappsec-csp/#parse-serialized-policy
//!
//! # Example
//!
//! ```
//! use webext_lib::csp::Policy;
//!
//! let policy = Policy::parse("default-src 'self'; script-src 'unsafe-eval' a.example; script-src b.example");
//! assert_eq!(policy.directive("script-src"), Some(&["'unsafe-eval'".to_string(), "a.example".to_string()][..]));
//! assert_eq!(policy.serialize(), "default-src 'self'; script-src 'unsafe-eval' a.example;");
//! ```

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

/// A parsed policy. Directive order is the order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
  directives: IndexMap<String, Vec<String>>,
}

impl Policy {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn parse(policy: &str) -> Self {
    let mut directives = IndexMap::new();

    for token in policy.split(';') {
      let token = token.trim_matches(|c: char| c.is_ascii_whitespace());
      if token.is_empty() || !token.is_ascii() {
        continue;
      }

      let mut parts = token.split(|c: char| c.is_ascii_whitespace()).filter(|p| !p.is_empty());
      let Some(raw_name) = parts.next() else {
        continue;
      };

      let name = raw_name.to_ascii_lowercase();
      if directives.contains_key(&name) {
        continue;
      }

      directives.insert(name, parts.map(str::to_string).collect());
    }

    Self { directives }
  }

  pub fn serialize(&self) -> String {
    let rendered: Vec<String> = self
      .directives
      .iter()
      .map(|(name, sources)| {
        if sources.is_empty() {
          name.clone()
        } else {
          format!("{} {}", name, sources.join(" "))
        }
      })
      .collect();

    if rendered.is_empty() {
      String::new()
    } else {
      format!("{};", rendered.join("; "))
    }
  }

  /// Source list of a directive. Names are matched case-insensitively.
  pub fn directive(&self, name: &str) -> Option<&[String]> {
    self.directives.get(&name.to_ascii_lowercase()).map(Vec::as_slice)
  }

  /// Appends `source` to every directive that does not already list it.
  pub fn append_source(&mut self, source: &str) {
    for sources in self.directives.values_mut() {
      if !sources.iter().any(|s| s == source) {
        sources.push(source.to_string());
      }
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
    self.directives.iter().map(|(name, sources)| (name.as_str(), sources.as_slice()))
  }

  pub fn len(&self) -> usize {
    self.directives.len()
  }

  pub fn is_empty(&self) -> bool {
    self.directives.is_empty()
  }
}

impl FromStr for Policy {
  type Err = Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Self::parse(s))
  }
}

impl fmt::Display for Policy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.serialize())
  }
}
