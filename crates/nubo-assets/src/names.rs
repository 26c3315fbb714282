//! Logical names under which the runtime looks up assets.

/// The name of a managed assembly: its file name without the extension.
///
/// `lib/net8.0/Newtonsoft.Json.dll` is `Newtonsoft.Json`.
pub fn assembly_name(path: &str) -> &str {
    let file = file_name(path);
    file.rsplit_once('.').map_or(file, |(stem, _)| stem)
}

/// The name of a native library: its file name without the platform's library extension and,
/// outside Windows, without the conventional `lib` prefix.
///
/// `runtimes/linux-x64/native/libe_sqlite3.so` is `e_sqlite3`, as is
/// `runtimes/win-x64/native/e_sqlite3.dll`.
pub fn native_library_name(path: &str, windows: bool) -> &str {
    let stem = strip_native_extension(file_name(path));
    if windows {
        return stem;
    }
    match stem.strip_prefix("lib") {
        Some(name) if !name.is_empty() => name,
        _ => stem,
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn strip_native_extension(file: &str) -> &str {
    for extension in [".dll", ".dylib", ".so"] {
        if let Some(stem) = strip_suffix_ignore_case(file, extension) {
            return stem;
        }
    }

    // Versioned shared objects, e.g., `libfoo.so.1.2`.
    if let Some(index) = file.find(".so.") {
        let version = &file[index + ".so.".len()..];
        if !version.is_empty() && version.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return &file[..index];
        }
    }

    file.rsplit_once('.').map_or(file, |(stem, _)| stem)
}

fn strip_suffix_ignore_case<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    let split = value.len().checked_sub(suffix.len())?;
    if !value.is_char_boundary(split) || split == 0 {
        return None;
    }
    let (stem, tail) = value.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(stem)
}
