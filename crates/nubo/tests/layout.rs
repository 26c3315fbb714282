use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use insta::assert_snapshot;
use predicates::prelude::predicate;

use common::{TestContext, apply_filters, nubo_snapshot};

mod common;

/// Add a package with managed assemblies and native libraries for two platforms.
fn add_sqlite(context: &TestContext) {
    context.add_package(
        "Contoso.Sqlite",
        "1.0.0",
        &[],
        &[
            "lib/net8.0/Contoso.Sqlite.dll",
            "runtimes/linux-x64/native/libe_sqlite3.so",
            "runtimes/win-x64/native/e_sqlite3.dll",
        ],
    );
}

#[test]
fn layout() -> Result<()> {
    let context = TestContext::new();
    add_sqlite(&context);

    context
        .restore()
        .arg("Contoso.Sqlite@1.0.0")
        .arg("--runtime")
        .arg("linux-x64")
        .assert()
        .success();

    nubo_snapshot!(context.filters(), context.layout().arg("--feed").arg(context.feed_dir.path()).arg("-o").arg("out"), @r"
    success: true
    exit_code: 0
    ----- stdout -----

    ----- stderr -----
    Laid out 2 assets into out in [TIME]
    ");

    context
        .temp_dir
        .child("out/Contoso.Sqlite.dll")
        .assert(predicate::path::is_file());
    context
        .temp_dir
        .child("out/libe_sqlite3.so")
        .assert(predicate::path::is_file());
    context
        .temp_dir
        .child("out/e_sqlite3.dll")
        .assert(predicate::path::missing());

    let assets = apply_filters(context.read("out/nubo.assets.json"), context.filters());
    assert_snapshot!(assets, @r#"
    {
      "managed": {
        "Contoso.Sqlite": "[TEMP_DIR]/out/Contoso.Sqlite.dll"
      },
      "native": {
        "e_sqlite3": "[TEMP_DIR]/out/libe_sqlite3.so"
      },
      "framework-references": []
    }
    "#);

    Ok(())
}

#[test]
fn layout_without_lock() {
    let context = TestContext::new();

    nubo_snapshot!(context.filters(), context.layout().arg("-o").arg("out"), @r"
    success: false
    exit_code: 1
    ----- stdout -----

    ----- stderr -----
    No lock file found at: nubo.lock (run `nubo restore` first)
    ");

    context.temp_dir.child("out").assert(predicate::path::missing());
}

/// Packages evicted from the cache are fetched again from the feed recorded in the lock.
#[test]
fn layout_after_clean() {
    let context = TestContext::new();
    add_sqlite(&context);

    context
        .restore()
        .arg("Contoso.Sqlite@1.0.0")
        .arg("--runtime")
        .arg("win-x64")
        .assert()
        .success();
    context.clean().assert().success();

    nubo_snapshot!(context.filters(), context.layout().arg("--feed").arg(context.feed_dir.path()).arg("-o").arg("out"), @r"
    success: true
    exit_code: 0
    ----- stdout -----

    ----- stderr -----
    Laid out 2 assets into out in [TIME]
    ");

    context
        .temp_dir
        .child("out/e_sqlite3.dll")
        .assert(predicate::path::is_file());
}

/// A package whose archive changed since it was locked is rejected.
#[test]
fn layout_hash_mismatch() {
    let context = TestContext::new();
    add_sqlite(&context);

    context
        .restore()
        .arg("Contoso.Sqlite@1.0.0")
        .assert()
        .success();
    context.clean().assert().success();

    // Republish the same version with different contents.
    context.add_package(
        "Contoso.Sqlite",
        "1.0.0",
        &[],
        &["lib/net8.0/Contoso.Sqlite.dll", "lib/net8.0/Extra.dll"],
    );

    context
        .layout()
        .arg("--feed")
        .arg(context.feed_dir.path())
        .arg("-o")
        .arg("out")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Failed to download `Contoso.Sqlite"))
        .stderr(predicate::str::contains("Hash mismatch"));
}
