use std::error::Error;
use std::iter;
use std::sync::atomic::AtomicBool;
use std::sync::{LazyLock, Mutex};

// macro hygiene: The user might not have direct dependencies on those crates
#[doc(hidden)]
pub use anstream;
#[doc(hidden)]
pub use owo_colors;
use owo_colors::DynColor;
use rustc_hash::FxHashSet;

use nubo_static::EnvVars;

/// Whether user-facing warnings are enabled.
pub static ENABLED: AtomicBool = AtomicBool::new(false);

/// Enable user-facing warnings.
pub fn enable() {
    ENABLED.store(true, std::sync::atomic::Ordering::Relaxed);
}

/// Disable user-facing warnings.
pub fn disable() {
    ENABLED.store(false, std::sync::atomic::Ordering::Relaxed);
}

/// Warn a user, if warnings are enabled.
#[macro_export]
macro_rules! warn_user {
    ($($arg:tt)*) => {{
        use $crate::anstream::eprintln;
        use $crate::owo_colors::OwoColorize;

        if $crate::ENABLED.load(std::sync::atomic::Ordering::Relaxed) {
            let message = format!("{}", format_args!($($arg)*));
            let formatted = message.bold();
            eprintln!("{}{} {formatted}", "warning".yellow().bold(), ":".bold());
        }
    }};
}

pub static WARNINGS: LazyLock<Mutex<FxHashSet<String>>> = LazyLock::new(Mutex::default);

/// Warn a user once, if warnings are enabled, with uniqueness determined by the content of the
/// message.
#[macro_export]
macro_rules! warn_user_once {
    ($($arg:tt)*) => {{
        use $crate::anstream::eprintln;
        use $crate::owo_colors::OwoColorize;

        if $crate::ENABLED.load(std::sync::atomic::Ordering::Relaxed) {
            if let Ok(mut states) = $crate::WARNINGS.lock() {
                let message = format!("{}", format_args!($($arg)*));
                if states.insert(message.clone()) {
                    eprintln!("{}{} {}", "warning".yellow().bold(), ":".bold(), message.bold());
                }
            }
        }
    }};
}

/// Returns the width to wrap diagnostics at, if any.
///
/// Wrapping is disabled by `NUBO_NO_WRAP`, and otherwise follows `COLUMNS`.
fn wrap_width(width_override: Option<usize>) -> Option<usize> {
    if std::env::var_os(EnvVars::NUBO_NO_WRAP).is_some() {
        return None;
    }
    if let Some(width) = width_override {
        return Some(width);
    }
    std::env::var(EnvVars::COLUMNS)
        .ok()
        .and_then(|columns| columns.parse::<usize>().ok())
}

/// Wraps text at word boundaries, indenting continuation lines.
fn wrap_text(text: &str, width: Option<usize>, subsequent_indent: &str) -> String {
    if let Some(width) = width {
        let options = textwrap::Options::new(width)
            .subsequent_indent(subsequent_indent)
            .break_words(false)
            .word_separator(textwrap::WordSeparator::AsciiSpace)
            .word_splitter(textwrap::WordSplitter::NoHyphenation);
        textwrap::fill(text, options)
    } else {
        let mut result = String::with_capacity(2 * text.len());
        for (idx, line) in text.split_terminator('\n').enumerate() {
            if idx > 0 {
                result.push('\n');
                if !line.is_empty() {
                    result.push_str(subsequent_indent);
                }
            }
            result.push_str(line);
        }
        result
    }
}

/// Format an error chain, one `Caused by` line per source.
///
/// ```text
/// error: Failed to restore packages
///   Caused by: Failed to download `Newtonsoft.Json==13.0.3` from `nuget`
///   Caused by: HTTP status server error (503 Service Unavailable)
/// ```
pub fn write_error_chain_with_options(
    err: &dyn Error,
    mut stream: impl std::fmt::Write,
    level: impl AsRef<str>,
    color: impl DynColor + Copy,
    width_override: Option<usize>,
) -> std::fmt::Result {
    use owo_colors::OwoColorize;

    let width = wrap_width(width_override);

    let message = wrap_text(&err.to_string(), width, "");
    writeln!(
        &mut stream,
        "{}{} {}",
        level.as_ref().color(color).bold(),
        ":".bold(),
        message.trim()
    )?;

    for source in iter::successors(err.source(), |&err| err.source()) {
        let padding = "  ";
        let cause = "Caused by";
        let child_padding = " ".repeat(padding.len() + cause.len() + 2);
        let wrapped = wrap_text(&source.to_string(), width, &child_padding);

        let mut lines = wrapped.lines();
        if let Some(first) = lines.next() {
            writeln!(
                &mut stream,
                "{}{}: {}",
                padding,
                cause.color(color).bold(),
                first.trim()
            )?;
            for line in lines {
                let line = line.trim_end();
                if line.is_empty() {
                    writeln!(&mut stream)?;
                } else {
                    writeln!(&mut stream, "{line}")?;
                }
            }
        }
    }

    Ok(())
}

/// Format an error chain with default options (error level, red color).
pub fn write_error_chain(err: &dyn Error, stream: impl std::fmt::Write) -> std::fmt::Result {
    write_error_chain_with_options(err, stream, "error", owo_colors::AnsiColors::Red, None)
}

/// Format a warning chain (warning level, yellow color).
pub fn write_warning_chain(err: &dyn Error, stream: impl std::fmt::Write) -> std::fmt::Result {
    write_error_chain_with_options(err, stream, "warning", owo_colors::AnsiColors::Yellow, None)
}
