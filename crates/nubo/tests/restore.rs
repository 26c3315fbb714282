use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use indoc::indoc;
use insta::assert_snapshot;
use predicates::prelude::predicate;

use common::{TestContext, apply_filters, nubo_snapshot};

mod common;

/// Filter the archive hashes out of a lock file; archives carry their creation time.
fn lock_filters(context: &TestContext) -> Vec<(&str, &str)> {
    let mut filters = context.filters();
    filters.push((r#"hash = ".*""#, r#"hash = "[HASH]""#));
    filters
}

#[test]
fn restore_transitive() -> Result<()> {
    let context = TestContext::new();
    context.add_package("Contoso.Core", "1.0.0", &[], &["lib/net8.0/Contoso.Core.dll"]);
    context.add_package("Contoso.Core", "1.1.0", &[], &["lib/net8.0/Contoso.Core.dll"]);
    context.add_package(
        "Contoso.App",
        "2.0.0",
        &[("Contoso.Core", "1.0.0")],
        &[
            "lib/net6.0/Contoso.App.dll",
            "lib/netstandard2.0/Contoso.App.dll",
        ],
    );

    nubo_snapshot!(context.filters(), context.restore().arg("Contoso.App@2.0.0"), @r"
    success: true
    exit_code: 0
    ----- stdout -----

    ----- stderr -----
    Resolved 2 packages in [TIME]
    Downloaded 2 packages in [TIME]
     + Contoso.App==2.0.0
     + Contoso.Core==1.0.0
    ");

    let lock = apply_filters(context.read("nubo.lock"), lock_filters(&context));
    assert_snapshot!(lock, @r#"
    version = 1
    framework = "net8.0"
    resolution-mode = "lowest"

    [[package]]
    id = "Contoso.App"
    version = "2.0.0"
    source = "feed"
    direct = true
    hash = "[HASH]"
    dependencies = [{ id = "Contoso.Core", range = "[1.0.0, )" }]
    managed = ["lib/net6.0/Contoso.App.dll"]
    native = []
    framework-references = []

    [[package]]
    id = "Contoso.Core"
    version = "1.0.0"
    source = "feed"
    direct = false
    hash = "[HASH]"
    dependencies = []
    managed = ["lib/net8.0/Contoso.Core.dll"]
    native = []
    framework-references = []
    "#);

    Ok(())
}

#[test]
fn restore_highest() {
    let context = TestContext::new();
    context.add_package("Contoso.Core", "1.0.0", &[], &["lib/net8.0/Contoso.Core.dll"]);
    context.add_package("Contoso.Core", "1.1.0", &[], &["lib/net8.0/Contoso.Core.dll"]);
    context.add_package("Contoso.Core", "2.0.0-beta.1", &[], &["lib/net8.0/Contoso.Core.dll"]);

    nubo_snapshot!(context.filters(), context.restore()
        .arg("Contoso.Core@[1.0.0, )")
        .arg("--resolution")
        .arg("highest"), @r"
    success: true
    exit_code: 0
    ----- stdout -----

    ----- stderr -----
    Resolved 1 package in [TIME]
    Downloaded 1 package in [TIME]
     + Contoso.Core==1.1.0
    ");

    nubo_snapshot!(context.filters(), context.restore()
        .arg("Contoso.Core@[1.0.0, )")
        .arg("--resolution")
        .arg("highest")
        .arg("--prerelease")
        .arg("allow"), @r"
    success: true
    exit_code: 0
    ----- stdout -----

    ----- stderr -----
    Resolved 1 package in [TIME]
    Downloaded 1 package in [TIME]
     + Contoso.Core==2.0.0-beta.1
    ");
}

/// A second restore is served entirely from the cache.
#[test]
fn restore_cached() {
    let context = TestContext::new();
    context.add_package("Contoso.Core", "1.0.0", &[], &["lib/net8.0/Contoso.Core.dll"]);

    context
        .restore()
        .arg("Contoso.Core@1.0.0")
        .assert()
        .success();

    nubo_snapshot!(context.filters(), context.restore().arg("Contoso.Core@1.0.0"), @r"
    success: true
    exit_code: 0
    ----- stdout -----

    ----- stderr -----
    Resolved 1 package in [TIME]
     + Contoso.Core==1.0.0
    ");
}

#[test]
fn restore_from_config() -> Result<()> {
    let context = TestContext::new();
    context.add_package("Contoso.Core", "1.0.0", &[], &["lib/net8.0/Contoso.Core.dll"]);
    context.add_package("Contoso.Logging", "3.0.0", &[], &["lib/net8.0/Contoso.Logging.dll"]);
    context.temp_dir.child("nubo.toml").write_str(&format!(
        indoc! {r#"
            framework = "net8.0"

            [[feed]]
            name = "local"
            path = "{}"

            [dependencies]
            "Contoso.Core" = "1.0.0"
            "Contoso.Logging" = "[3.0.0, )"
        "#},
        context.feed_dir.path().display().to_string().replace('\\', "/")
    ))?;

    // A package on the command line replaces the configured range for the same id.
    nubo_snapshot!(context.filters(), context.command().arg("restore").arg("Contoso.Logging@3.0.0"), @r"
    success: true
    exit_code: 0
    ----- stdout -----

    ----- stderr -----
    Resolved 2 packages in [TIME]
    Downloaded 2 packages in [TIME]
     + Contoso.Core==1.0.0
     + Contoso.Logging==3.0.0
    ");

    let lock = context.read("nubo.lock");
    assert!(lock.contains(r#"source = "local""#));
    Ok(())
}

/// A direct request that's raised by another package's constraint is reported.
#[test]
fn restore_direct_request_overridden() {
    let context = TestContext::new();
    context.add_package("Contoso.Core", "1.0.0", &[], &["lib/net8.0/Contoso.Core.dll"]);
    context.add_package("Contoso.Core", "2.0.0", &[], &["lib/net8.0/Contoso.Core.dll"]);
    context.add_package(
        "Contoso.App",
        "1.0.0",
        &[("Contoso.Core", "2.0.0")],
        &["lib/net8.0/Contoso.App.dll"],
    );

    nubo_snapshot!(context.filters(), context.restore()
        .arg("Contoso.Core@[1.0.0, )")
        .arg("Contoso.App@1.0.0"), @r"
    success: true
    exit_code: 0
    ----- stdout -----

    ----- stderr -----
    warning: `Contoso.Core` was requested at 1.0.0, but resolved to 2.0.0 to satisfy other packages
    Resolved 2 packages in [TIME]
    Downloaded 2 packages in [TIME]
     + Contoso.App==1.0.0
     + Contoso.Core==2.0.0
    ");
}

#[test]
fn restore_not_found() {
    let context = TestContext::new();

    nubo_snapshot!(context.filters(), context.restore().arg("Contoso.Missing@1.0.0"), @r"
    success: false
    exit_code: 2
    ----- stdout -----

    ----- stderr -----
    error: No version of `Contoso.Missing` satisfying `[1.0.0]` was found (consulted: `feed`)
    ");

    context.temp_dir.child("nubo.lock").assert(predicate::path::missing());
}

#[test]
fn restore_conflict() {
    let context = TestContext::new();
    context.add_package("Contoso.Core", "1.0.0", &[], &["lib/net8.0/Contoso.Core.dll"]);
    context.add_package("Contoso.Core", "1.1.0", &[], &["lib/net8.0/Contoso.Core.dll"]);
    context.add_package(
        "Contoso.App",
        "2.0.0",
        &[("Contoso.Core", "[1.1.0, )")],
        &["lib/net8.0/Contoso.App.dll"],
    );

    context
        .restore()
        .arg("Contoso.Core@1.0.0")
        .arg("Contoso.App@2.0.0")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains(
            "No version of `Contoso.Core` satisfies all constraints",
        ))
        .stderr(predicate::str::contains("required by Contoso.App@2.0.0"));

    context.temp_dir.child("nubo.lock").assert(predicate::path::missing());
}

#[test]
fn restore_nothing() {
    let context = TestContext::new();

    nubo_snapshot!(context.filters(), context.restore(), @r"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    No packages to restore; pass them on the command line or list them under `[dependencies]` in `nubo.toml`
    ");
}

#[test]
fn invalid_config() -> Result<()> {
    let context = TestContext::new();
    context
        .temp_dir
        .child("nubo.toml")
        .write_str("index-url = \"https://example.com\"\n")?;

    context
        .restore()
        .arg("Contoso.Core@1.0.0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: Failed to parse: `nubo.toml`"));

    // The broken file is ignored with `--no-config`.
    context
        .restore()
        .arg("Contoso.Core@1.0.0")
        .arg("--no-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No version of `Contoso.Core`"));
    Ok(())
}
