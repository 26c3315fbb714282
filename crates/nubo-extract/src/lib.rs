use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, trace};
use zip::ZipArchive;

pub use error::Error;

mod error;
pub mod hash;

/// Archive members written by the packaging tools rather than the package author.
fn is_packaging_metadata(name: &str) -> bool {
    name.starts_with("_rels/")
        || name.starts_with("package/")
        || name.eq_ignore_ascii_case("[Content_Types].xml")
}

/// Reject member names that are empty or contain control characters.
fn validate_name(name: &str) -> Result<(), Error> {
    if name.trim_matches('/').is_empty() {
        return Err(Error::EmptyEntryName);
    }
    if name.chars().any(char::is_control) {
        return Err(Error::InvalidEntryName(name.escape_debug().to_string()));
    }
    Ok(())
}

/// Unzip a package archive into the target directory.
///
/// Packaging metadata (`_rels/`, `package/`, `[Content_Types].xml`) is skipped. Returns the
/// `/`-separated paths of the extracted files, sorted.
pub fn unzip<R: Read + Seek>(reader: R, target: &Path) -> Result<Vec<String>, Error> {
    let mut archive = ZipArchive::new(reader)?;
    let mut extracted = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let name = file.name().to_string();
        validate_name(&name)?;

        if is_packaging_metadata(&name) {
            trace!("Skipping packaging metadata: {name}");
            continue;
        }

        // Reject entries that would escape the target, e.g., `../evil.dll`.
        let Some(relative) = file.enclosed_name() else {
            return Err(Error::UnsafePath(name));
        };
        let path = target.join(&relative);

        if file.is_dir() {
            fs_err::create_dir_all(&path)?;
            continue;
        }
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let mut outfile = fs_err::File::create(&path)?;
        std::io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;

            if let Some(mode) = file.unix_mode() {
                // Keep the executable bits, but never extract read-only files into the cache.
                let mode = (mode & 0o777) | 0o600;
                fs_err::set_permissions(&path, Permissions::from_mode(mode))?;
            }
        }

        extracted.push(slash_path(&relative));
    }

    extracted.sort_unstable();
    debug!("Extracted {} files to: {}", extracted.len(), target.display());
    Ok(extracted)
}

/// Unzip a package archive on disk into the target directory, off the async runtime.
#[instrument(skip_all, fields(archive = %source.as_ref().display()))]
pub async fn unzip_file(
    source: impl AsRef<Path>,
    target: impl Into<PathBuf>,
) -> Result<Vec<String>, Error> {
    let file = fs_err::File::open(source.as_ref())?;
    let target = target.into();
    tokio::task::spawn_blocking(move || unzip(std::io::BufReader::new(file), &target)).await?
}

/// Read the manifest (`.nuspec`) from the root of a package archive.
pub fn read_nuspec<R: Read + Seek>(reader: R) -> Result<Vec<u8>, Error> {
    let mut archive = ZipArchive::new(reader)?;
    let name = archive
        .file_names()
        .find(|name| {
            !name.contains('/')
                && Path::new(name)
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("nuspec"))
        })
        .map(ToString::to_string)
        .ok_or(Error::MissingNuspec)?;

    let mut file = archive.by_name(&name)?;
    let mut contents = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn skips_packaging_metadata() {
        let bytes = archive(&[
            ("_rels/.rels", b""),
            ("package/services/metadata/core-properties/x.psmdcp", b""),
            ("[Content_Types].xml", b""),
            ("foo.nuspec", b"<package/>"),
            ("lib/net8.0/Foo.dll", b"MZ"),
            ("runtimes/linux-x64/native/libfoo.so", b"\x7fELF"),
        ]);
        let target = tempfile::tempdir().unwrap();
        let files = unzip(Cursor::new(bytes), target.path()).unwrap();

        assert_eq!(
            files,
            [
                "foo.nuspec",
                "lib/net8.0/Foo.dll",
                "runtimes/linux-x64/native/libfoo.so"
            ]
        );
        assert_eq!(
            fs_err::read(target.path().join("lib/net8.0/Foo.dll")).unwrap(),
            b"MZ"
        );
        assert!(!target.path().join("_rels").exists());
        assert!(!target.path().join("[Content_Types].xml").exists());
    }

    #[test]
    fn rejects_escaping_entries() {
        let bytes = archive(&[("../evil.dll", b"")]);
        let target = tempfile::tempdir().unwrap();
        let err = unzip(Cursor::new(bytes), target.path()).unwrap_err();
        assert!(matches!(err, Error::UnsafePath(name) if name == "../evil.dll"));
    }

    #[test]
    fn rejects_control_characters() {
        let bytes = archive(&[("lib/a\u{7}.dll", b"")]);
        let target = tempfile::tempdir().unwrap();
        let err = unzip(Cursor::new(bytes), target.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidEntryName(_)));
    }

    #[test]
    fn nuspec() {
        let bytes = archive(&[
            ("lib/net8.0/other.nuspec", b"nested"),
            ("Foo.nuspec", b"<package/>"),
        ]);
        assert_eq!(read_nuspec(Cursor::new(bytes)).unwrap(), b"<package/>");

        let bytes = archive(&[("lib/net8.0/Foo.dll", b"")]);
        assert!(matches!(
            read_nuspec(Cursor::new(bytes)),
            Err(Error::MissingNuspec)
        ));
    }

    #[tokio::test]
    async fn from_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("foo.1.0.0.nupkg");
        fs_err::write(&source, archive(&[("lib/netstandard2.0/Foo.dll", b"")])).unwrap();

        let files = unzip_file(&source, dir.path().join("out")).await.unwrap();
        assert_eq!(files, ["lib/netstandard2.0/Foo.dll"]);
    }
}
