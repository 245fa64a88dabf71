//! Minimal tolerant HTML scanner for popup documents.
//!
//! This is not an HTML parser. It walks tag boundaries, skips comments and
//! the raw text of `<script>` elements, and understands just enough attribute
//! syntax to find and rewrite `<script src>` references. Every script with a
//! `src` attribute is reported, in document order, whatever the attribute
//! order, quoting style or whether the tag is self-closed.

use std::ops::Range;

/// A `<script src>` reference found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTag {
  /// The raw attribute value.
  pub src: String,
  /// Byte range of the value inside the document, without quotes.
  pub value: Range<usize>,
}

impl ScriptTag {
  /// Remote and inline sources are not bundler entries.
  pub fn is_local(&self) -> bool {
    let src = self.src.trim();
    let lower = src.to_ascii_lowercase();
    !(src.is_empty()
      || src.starts_with("//")
      || lower.starts_with("http:")
      || lower.starts_with("https:")
      || lower.starts_with("data:")
      || lower.starts_with("blob:")
      || lower.starts_with("chrome-extension:"))
  }
}

struct Attribute {
  name: String,
  value: Option<Range<usize>>,
}

struct Tag {
  name: String,
  closing: bool,
  self_closing: bool,
  attributes: Vec<Attribute>,
  /// Byte offset of the `<`.
  start: usize,
  /// Byte offset just past the `>`.
  end: usize,
}

fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
  let bytes = haystack.as_bytes();
  let needle = needle.as_bytes();
  if needle.is_empty() || from > bytes.len() {
    return None;
  }
  (from..=bytes.len().saturating_sub(needle.len())).find(|&i| bytes[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

fn is_space(b: u8) -> bool {
  b.is_ascii_whitespace()
}

/// Parses the tag starting at `start` (which holds `<`). Returns `None` when
/// the `<` does not open a tag.
fn parse_tag(doc: &str, start: usize) -> Option<Tag> {
  let bytes = doc.as_bytes();
  let mut i = start + 1;
  let closing = bytes.get(i) == Some(&b'/');
  if closing {
    i += 1;
  }

  let name_start = i;
  while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
    i += 1;
  }
  if i == name_start {
    return None;
  }
  let name = doc[name_start..i].to_ascii_lowercase();

  let mut attributes = Vec::new();
  loop {
    while i < bytes.len() && (is_space(bytes[i]) || bytes[i] == b'/') {
      i += 1;
    }
    if i >= bytes.len() {
      return None;
    }
    if bytes[i] == b'>' {
      return Some(Tag {
        name,
        closing,
        self_closing: bytes[i - 1] == b'/',
        attributes,
        start,
        end: i + 1,
      });
    }

    let attr_start = i;
    while i < bytes.len() && !is_space(bytes[i]) && !matches!(bytes[i], b'=' | b'>' | b'/') {
      i += 1;
    }
    let attr_name = doc[attr_start..i].to_ascii_lowercase();

    while i < bytes.len() && is_space(bytes[i]) {
      i += 1;
    }
    if bytes.get(i) != Some(&b'=') {
      attributes.push(Attribute {
        name: attr_name,
        value: None,
      });
      continue;
    }
    i += 1;
    while i < bytes.len() && is_space(bytes[i]) {
      i += 1;
    }

    let value = match bytes.get(i) {
      Some(&quote @ (b'"' | b'\'')) => {
        let value_start = i + 1;
        let value_end = value_start + doc[value_start..].find(quote as char)?;
        i = value_end + 1;
        value_start..value_end
      }
      _ => {
        let value_start = i;
        while i < bytes.len() && !is_space(bytes[i]) && bytes[i] != b'>' {
          i += 1;
        }
        value_start..i
      }
    };
    attributes.push(Attribute {
      name: attr_name,
      value: Some(value),
    });
  }
}

/// Walks the tags of `doc`, skipping comments and script bodies.
fn tags(doc: &str) -> Vec<Tag> {
  let mut tags = Vec::new();
  let mut pos = 0;

  while let Some(offset) = doc[pos..].find('<') {
    let start = pos + offset;

    if doc[start..].starts_with("<!--") {
      pos = match doc[start + 4..].find("-->") {
        Some(end) => start + 4 + end + 3,
        None => break,
      };
      continue;
    }

    let Some(tag) = parse_tag(doc, start) else {
      pos = start + 1;
      continue;
    };

    pos = tag.end;
    let raw_text = !tag.closing && !tag.self_closing && matches!(tag.name.as_str(), "script" | "style");
    let closer = format!("</{}", tag.name);
    tags.push(tag);

    if raw_text {
      match find_ci(doc, &closer, pos) {
        Some(end) => pos = end,
        None => break,
      }
    }
  }

  tags
}

/// Every `<script>` tag with a `src` attribute, in document order.
pub fn find_scripts(doc: &str) -> Vec<ScriptTag> {
  tags(doc)
    .into_iter()
    .filter(|t| !t.closing && t.name == "script")
    .filter_map(|t| {
      let value = t.attributes.into_iter().find(|a| a.name == "src")?.value?;
      Some(ScriptTag {
        src: doc[value.clone()].to_string(),
        value,
      })
    })
    .collect()
}

/// Replaces script sources. `rewrite` returns the new value, or `None` to
/// leave a tag untouched.
pub fn rewrite_script_srcs<F>(doc: &str, mut rewrite: F) -> String
where
  F: FnMut(&ScriptTag) -> Option<String>,
{
  let mut out = doc.to_string();
  let scripts = find_scripts(doc);

  for script in scripts.iter().rev() {
    if let Some(replacement) = rewrite(script) {
      out.replace_range(script.value.clone(), &replacement);
    }
  }

  out
}

/// Inserts `fragment` at the end of `<head>`.
///
/// Falls back to just after the opening `<head>` tag, then to the start of the
/// document when there is no head at all.
pub fn inject_into_head(doc: &str, fragment: &str) -> String {
  let tags = tags(doc);
  let position = tags
    .iter()
    .find(|t| t.closing && t.name == "head")
    .map(|t| t.start)
    .or_else(|| tags.iter().find(|t| !t.closing && t.name == "head").map(|t| t.end))
    .unwrap_or(0);

  let mut out = String::with_capacity(doc.len() + fragment.len() + 1);
  out.push_str(&doc[..position]);
  out.push_str(fragment);
  if !fragment.ends_with('\n') {
    out.push('\n');
  }
  out.push_str(&doc[position..]);
  out
}
