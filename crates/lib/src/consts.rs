/// File name of both the author manifest and the emitted manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

pub const DEFAULT_OUT_DIR: &str = "dist";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_TARGET: &str = "es2022";
pub const DEFAULT_ESBUILD: &str = "esbuild";

pub const POPUP_DOCUMENT: &str = "default_popup.html";
pub const POPUP_SCRIPT_NAME: &str = "default_popup";
pub const DEV_POPUP_SHIM: &str = "default_popup.js";
pub const BACKGROUND_OUTPUT: &str = "background.js";
pub const DEV_BACKGROUND_SHIM: &str = "background.js";

/// Path of the live-reload client served by the dev server.
pub const RELOAD_CLIENT_PATH: &str = "/@webext/client.js";

pub const DEFAULT_POPUP_TITLE: &str = "Browser Extension";
pub const DEV_NAME_SUFFIX: &str = " [DEV]";

/// Extension page policy Chrome applies to MV3 extensions that declare none.
pub const DEFAULT_EXTENSION_PAGES_CSP: &str = "script-src 'self' 'wasm-unsafe-eval'; object-src 'self';";

pub const ENV_PORT: &str = "PORT";
pub const ENV_MODE: &str = "NODE_ENV";
pub const ENV_OUT_DIR: &str = "WEBEXT_OUT_DIR";
pub const ENV_ESBUILD: &str = "WEBEXT_ESBUILD";
pub const ENV_TARGET: &str = "WEBEXT_TARGET";

/// Compile-time define carrying the dev server origin into bundled code.
pub const DEFINE_DEV_SERVER_URL: &str = "process.env.DEV_SERVER_URL";
pub const DEFINE_NODE_ENV: &str = "process.env.NODE_ENV";
pub const DEFINE_PORT: &str = "process.env.PORT";

/// Directories under the project root that never produce change notifications.
pub const IGNORED_DIRS: &[&str] = &["node_modules", ".git"];
