//! Cache directory tagging, per <https://bford.info/cachedir/>.

use std::io::Write;
use std::path::Path;

/// The signature line every `CACHEDIR.TAG` must start with.
const HEADER: &[u8; 43] = b"Signature: 8a477f597d28d172789f06886806bc55";

/// Adds a tag to the specified `directory`.
///
/// Fails if the `directory` already contains a `CACHEDIR.TAG` file, regardless of its content.
pub fn add_tag(directory: impl AsRef<Path>) -> std::io::Result<()> {
    let mut tag = fs_err::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(directory.as_ref().join("CACHEDIR.TAG"))?;
    tag.write_all(HEADER)?;
    tag.write_all(b"\n# This file is a cache directory tag created by nubo.\n")?;
    tag.write_all(b"# For information about cache directory tags see https://bford.info/cachedir/\n")
}

/// Ensures the tag exists in `directory`.
pub fn ensure_tag(directory: impl AsRef<Path>) -> std::io::Result<()> {
    match add_tag(directory) {
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        other => other,
    }
}
