//! webext-lib: build orchestration for browser extension bundles
//!
//! The crate turns an author `manifest.json` plus its sources into a loadable
//! extension directory:
//! - `Pipeline`: the production build (configure, resolve, emit)
//! - `DevSession`: the dev server with live reload
//! - `Manifest`: the author manifest and its resolution against a target
//! - `Bundler`: the seam to the JavaScript bundler

pub mod assets;
pub mod build;
pub mod bundle;
pub mod config;
pub mod consts;
pub mod csp;
pub mod dev;
pub mod html;
pub mod manifest;
pub mod paths;
pub mod popup;
pub mod render;
pub mod util;
