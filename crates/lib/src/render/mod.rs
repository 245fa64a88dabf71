//! Generated documents and bootstrap scripts.
//!
//! Everything here is plain string rendering; callers decide where the
//! results are written or served.

mod templates;

use crate::manifest::DevOrigin;

pub use templates::RELOAD_CLIENT;

/// Joins lines with `\n` and terminates the last one.
pub fn render_lines<I, S>(lines: I) -> String
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut out = String::new();
  for line in lines {
    out.push_str(line.as_ref());
    out.push('\n');
  }
  out
}

fn html_escape(value: &str) -> String {
  value
    .replace('&', "&amp;")
    .replace('<', "&lt;")
    .replace('>', "&gt;")
    .replace('"', "&quot;")
}

/// Popup document used when the popup entry is a script rather than HTML.
pub fn render_popup(title: &str, scripts: &[String], styles: &[String]) -> String {
  let mut lines = vec![
    "<!doctype html>".to_string(),
    "<html lang=\"en\">".to_string(),
    "<head>".to_string(),
    "<meta charset=\"UTF-8\" />".to_string(),
    format!("<title>{}</title>", html_escape(title)),
  ];
  lines.extend(styles.iter().map(|s| stylesheet_link(s)));
  lines.extend([
    "</head>".to_string(),
    "<body>".to_string(),
    "<div id=\"root\"></div>".to_string(),
  ]);
  lines.extend(scripts.iter().map(|s| module_script(s)));
  lines.extend(["</body>".to_string(), "</html>".to_string()]);
  render_lines(lines)
}

pub fn stylesheet_link(href: &str) -> String {
  format!("<link rel=\"stylesheet\" href=\"{}\">", html_escape(href))
}

pub fn module_script(src: &str) -> String {
  format!("<script type=\"module\" src=\"{}\"></script>", html_escape(src))
}

pub fn classic_script(src: &str) -> String {
  format!("<script src=\"{}\"></script>", html_escape(src))
}

/// URL of the live-reload client for a client scope.
pub fn reload_client_url(origin: &DevOrigin, scope: &str) -> String {
  format!("{}?scope={}", origin.join(crate::consts::RELOAD_CLIENT_PATH), scope)
}

fn js_string(value: &str) -> String {
  serde_json::Value::String(value.to_string()).to_string()
}

/// Dev popup shim: refresh hook stubs and a `chrome.runtime.getURL` override
/// resolving extension resources against the dev server.
pub fn render_dev_popup_script(origin: &DevOrigin) -> String {
  let prefix = js_string(&origin.url());
  render_lines([
    "window.$RefreshReg$ = () => {};".to_string(),
    "window.$RefreshSig$ = () => (type) => type;".to_string(),
    "window.__vite_plugin_react_preamble_installed__ = true;".to_string(),
    format!(
      "chrome.runtime.getURL = (p) => {} + (p.startsWith(\"/\") ? p : \"/\" + p);",
      prefix
    ),
  ])
}

/// Dev service worker: loads the reload client and the real background
/// module from the dev server, and turns page reloads into extension reloads.
pub fn render_dev_background(origin: &DevOrigin, background: &str) -> String {
  render_lines([
    format!("import {};", js_string(&reload_client_url(origin, "background"))),
    format!("import {};", js_string(&origin.join(background))),
    "location.reload = () => chrome.runtime.reload();".to_string(),
  ])
}

/// Dev content script for one group: dynamically imports the reload client
/// and every script of the group from the dev server.
pub fn render_dev_content(origin: &DevOrigin, scripts: &[String]) -> String {
  let mut lines = vec![
    "(async () => {".to_string(),
    "  window.$RefreshReg$ = () => {};".to_string(),
    "  window.$RefreshSig$ = () => (type) => type;".to_string(),
    format!("  await import({});", js_string(&reload_client_url(origin, "content"))),
  ];
  lines.extend(
    scripts
      .iter()
      .map(|s| format!("  await import({});", js_string(&origin.join(s)))),
  );
  lines.push("})();".to_string());
  render_lines(lines)
}
