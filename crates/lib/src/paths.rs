//! Path reconciliation helpers.
//!
//! Logical entry paths appear in the author manifest in many spellings
//! (`./src/a.ts`, `src/a.ts`, `/abs/project/src/a.ts`). Everything here is
//! purely lexical: nothing touches the file system, so paths of files that
//! do not exist yet (bundler outputs) normalize the same way as sources.

use std::path::{Component, Path, PathBuf};

/// Lexically normalizes a path: drops `.` segments and folds `..` into the
/// preceding segment. `..` above a root is discarded, `..` at the start of a
/// relative path is kept.
pub fn normalize(path: &Path) -> PathBuf {
  let mut out: Vec<Component<'_>> = Vec::new();

  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => match out.last() {
        Some(Component::Normal(_)) => {
          out.pop();
        }
        Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
        _ => out.push(component),
      },
      other => out.push(other),
    }
  }

  out.iter().collect()
}

/// Resolves `path` against `base` (unless already absolute) and normalizes it.
pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
  if path.is_absolute() {
    normalize(path)
  } else {
    normalize(&base.join(path))
  }
}

/// Renders a path with `/` separators, the form used in manifests and URLs.
pub fn to_slash(path: &Path) -> String {
  path
    .components()
    .filter_map(|c| match c {
      Component::RootDir => Some(String::new()),
      Component::Prefix(p) => Some(p.as_os_str().to_string_lossy().into_owned()),
      Component::CurDir => None,
      Component::ParentDir => Some("..".to_string()),
      Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
    })
    .collect::<Vec<_>>()
    .join("/")
}

/// Path of `path` relative to `root` when it lies inside it.
pub fn relative_to(root: &Path, path: &Path) -> Option<PathBuf> {
  normalize(path).strip_prefix(normalize(root)).ok().map(Path::to_path_buf)
}

fn root_of(path: &Path) -> Vec<Component<'_>> {
  path
    .components()
    .take_while(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
    .collect()
}

fn common_pair(a: &Path, b: &Path) -> Option<PathBuf> {
  if a == b {
    return Some(a.to_path_buf());
  }
  if root_of(a) != root_of(b) {
    return None;
  }

  let shared: Vec<Component<'_>> = a
    .components()
    .zip(b.components())
    .take_while(|(x, y)| x == y)
    .map(|(x, _)| x)
    .collect();

  // A bare shared root means nothing in common.
  if !shared.iter().any(|c| matches!(c, Component::Normal(_))) {
    return None;
  }

  Some(shared.iter().collect())
}

/// Deepest directory prefix shared by every path.
///
/// Returns `None` (no common root) when the paths have different roots, share
/// no segment, or when `paths` is empty. A single path is its own ancestor.
pub fn common_ancestor<P: AsRef<Path>>(paths: &[P]) -> Option<PathBuf> {
  let mut normalized = paths.iter().map(|p| normalize(p.as_ref()));
  let first = normalized.next()?;

  normalized.try_fold(first, |acc, next| common_pair(&acc, &next))
}

/// Base directory whose layout a group of scripts mirrors in the output.
///
/// This is the common ancestor of the scripts, except that an ancestor equal
/// to one of the scripts (single-script groups) steps up to its parent, and
/// scripts with nothing in common fall back to the empty (project) base.
pub fn group_base<P: AsRef<Path>>(paths: &[P]) -> PathBuf {
  match common_ancestor(paths) {
    Some(ancestor) if paths.iter().any(|p| normalize(p.as_ref()) == ancestor) => {
      ancestor.parent().map(Path::to_path_buf).unwrap_or_default()
    }
    Some(ancestor) => ancestor,
    None => PathBuf::new(),
  }
}
