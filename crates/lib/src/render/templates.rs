//! Static script templates served by the dev server.

/// Live-reload client served at `/@webext/client.js`.
///
/// The `scope` query parameter selects the event stream: `popup` listens on
/// `/popup`, everything else on `/background`. Content scripts reload their
/// page after a short delay so the extension reload triggered by the
/// background client lands first.
pub const RELOAD_CLIENT: &str = r#"const url = new URL(import.meta.url);
const scope = url.searchParams.get("scope") ?? "background";
const stream = scope === "popup" ? "popup" : "background";
const source = new EventSource(`${url.origin}/${stream}`);

source.addEventListener("message", (event) => {
  const { changed } = JSON.parse(event.data);
  console.debug("[webext] changed", changed);
  if (scope === "content") {
    setTimeout(() => location.reload(), 500);
  } else {
    location.reload();
  }
});

source.addEventListener("error", () => {
  console.debug("[webext] dev server connection lost");
});
"#;
