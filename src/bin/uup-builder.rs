use std::path::Path;

use anyhow::{bail, Result};

use uup_builder::catalog::{CatalogClient, HttpTransport};
use uup_builder::convert::ScriptRunner;
use uup_builder::wim::MountedIsoInspector;
use uup_builder::{find_target, pipeline, preflight, TARGETS};

fn usage() -> &'static str {
    "Usage:\n  uup-builder build <target> <dest-dir>\n  uup-builder build-all <dest-dir>\n  uup-builder targets"
}

fn main() {
    if let Err(err) = run() {
        // Fatal errors go to stdout with the full context chain before the
        // non-zero exit.
        println!("error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [cmd, target, dest] if cmd == "build" => build_one(target, Path::new(dest)),
        [cmd, dest] if cmd == "build-all" => build_all(Path::new(dest)),
        [cmd] if cmd == "targets" => {
            list_targets();
            Ok(())
        }
        _ => bail!(usage()),
    }
}

fn list_targets() {
    for target in TARGETS {
        println!(
            "{}  (search '{}', edition {}, virtual edition {})",
            target.name,
            target.search_query,
            target.edition,
            target.virtual_edition.unwrap_or("-"),
        );
    }
}

fn build_one(name: &str, destination: &Path) -> Result<()> {
    let target = find_target(name)?;
    preflight::check_host_tools()?;

    let client = CatalogClient::new(HttpTransport::new());
    let runner = ScriptRunner::uup_converter();
    let inspector = MountedIsoInspector;

    let artifact = pipeline::run_target(&client, &runner, &inspector, target, destination)?;
    println!(
        "[pipeline] done: '{}' ({} embedded image(s), sha256 {})",
        artifact.iso_path.display(),
        artifact.images.len(),
        artifact.checksum_sha256
    );
    Ok(())
}

fn build_all(destination: &Path) -> Result<()> {
    let mut failed = Vec::new();
    for target in TARGETS {
        println!("[pipeline] building {}...", target.name);
        if let Err(err) = build_one(target.name, destination) {
            // Targets are independent; a failure must not stop the rest.
            println!("error building '{}': {err:?}", target.name);
            failed.push(target.name);
        }
    }
    if !failed.is_empty() {
        bail!("failed targets: {}", failed.join(", "));
    }
    Ok(())
}
