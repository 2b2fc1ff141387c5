use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use horizon_schema::{decode_snapshot_json, snapshot_schema};
use jsonschema::JSONSchema;

const DEFAULT_SCHEMA_PATH: &str = "horizon_schema/snapshot.schema.json";
const FIXTURE_GLOB: &str = "integration_tests/tests/fixtures/snapshot_*.json";

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("wire-schema") => write_schema(args.next().map(PathBuf::from)),
        Some("check-fixtures") => check_fixtures(),
        Some("help") | None => {
            print_usage();
            Ok(())
        }
        Some(cmd) => {
            eprintln!("Unknown xtask '{cmd}'.");
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("Usage: cargo xtask wire-schema [path]");
    eprintln!("       cargo xtask check-fixtures");
    eprintln!("       cargo xtask help");
}

fn schema_value() -> Result<serde_json::Value, Box<dyn Error>> {
    Ok(serde_json::to_value(snapshot_schema())?)
}

fn write_schema(path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_PATH));
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(&schema_value()?)?;
    fs::write(&path, format!("{text}\n"))?;
    println!("Wrote snapshot schema to {}", path.display());
    Ok(())
}

fn check_fixtures() -> Result<(), Box<dyn Error>> {
    let schema = schema_value()?;
    let compiled = JSONSchema::compile(&schema)
        .map_err(|err| format!("snapshot schema does not compile: {err}"))?;

    let mut checked = 0usize;
    let mut failures = Vec::new();
    for entry in glob::glob(FIXTURE_GLOB)? {
        let path = entry?;
        checked += 1;
        if let Err(reason) = check_fixture(&compiled, &path) {
            failures.push(format!("{}: {reason}", path.display()));
        }
    }

    if checked == 0 {
        return Err(format!("no fixtures matched {FIXTURE_GLOB}").into());
    }
    if !failures.is_empty() {
        for failure in &failures {
            eprintln!("{failure}");
        }
        return Err(format!("{} of {checked} fixtures failed", failures.len()).into());
    }
    println!("Checked {checked} snapshot fixtures");
    Ok(())
}

fn check_fixture(schema: &JSONSchema, path: &Path) -> Result<(), String> {
    let text = fs::read_to_string(path).map_err(|err| err.to_string())?;
    let instance: serde_json::Value =
        serde_json::from_str(&text).map_err(|err| format!("invalid JSON: {err}"))?;

    if let Err(errors) = schema.validate(&instance) {
        let messages: Vec<String> = errors.map(|err| err.to_string()).collect();
        return Err(format!("schema violations: {}", messages.join("; ")));
    }

    let snapshot = decode_snapshot_json(&text).map_err(|err| format!("decode failed: {err}"))?;
    snapshot
        .check_invariants()
        .map_err(|err| format!("invariant violated: {err}"))
}
