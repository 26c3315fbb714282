use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

/// The current working directory, used to shorten paths for display.
static CWD: LazyLock<PathBuf> = LazyLock::new(|| {
    std::env::current_dir()
        .map(|cwd| dunce::simplified(&cwd).to_path_buf())
        .unwrap_or_default()
});

pub trait Simplified {
    /// Simplify a [`Path`].
    ///
    /// On Windows, this will strip the `\\?\` prefix from paths. On other platforms, it's a no-op.
    fn simplified(&self) -> &Path;

    /// Render a [`Path`] for user-facing display.
    ///
    /// On Windows, this will strip the `\\?\` prefix from paths. On other platforms, it's
    /// equivalent to [`std::path::Display`].
    fn simplified_display(&self) -> std::path::Display<'_>;

    /// Render a [`Path`] for user-facing display, relative to the current working directory
    /// when it is inside of it.
    fn user_display(&self) -> std::path::Display<'_>;
}

impl<T: AsRef<Path>> Simplified for T {
    fn simplified(&self) -> &Path {
        dunce::simplified(self.as_ref())
    }

    fn simplified_display(&self) -> std::path::Display<'_> {
        dunce::simplified(self.as_ref()).display()
    }

    fn user_display(&self) -> std::path::Display<'_> {
        let path = dunce::simplified(self.as_ref());
        if CWD.as_os_str().is_empty() {
            return path.display();
        }
        match path.strip_prefix(CWD.as_path()) {
            Ok(relative) if !relative.as_os_str().is_empty() => relative.display(),
            _ => path.display(),
        }
    }
}

/// Render a path relative to `root` with forward slashes, e.g., `lib/net8.0/Foo.dll`.
///
/// Returns `None` if the path is not inside `root` or is not valid UTF-8.
pub fn relative_slash_path(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(parts.join("/"))
}
