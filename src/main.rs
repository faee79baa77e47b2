// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2026 The Comet Authors

//! comet CLI - runs an ECMAScript module graph from a file.

use clap::Parser;
use comet_engine::{Engine, Value};
use comet_loader::{FileLoader, Realm, VERSION};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "comet",
    about = "ECMAScript module runner built on the Comet linking layer",
    version = VERSION
)]
struct Cli {
    /// Entry module to execute (.mjs, or .js inside a "type": "module" package)
    entry: PathBuf,

    /// Print the entry module's exported bindings after evaluation
    #[arg(long)]
    print_namespace: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "comet_loader=debug,comet=debug"
    } else {
        "comet_loader=warn,comet=warn"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let realm = Realm::new(&Engine::new());
    let loader = FileLoader::new(realm);

    match loader.run(&cli.entry) {
        Ok(completion) => {
            if !completion.is_undefined() {
                println!("{}", completion);
            }
            if cli.print_namespace {
                print_namespace(&loader);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}: {}", "error".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

/// Dumps the entry module's namespace, one binding per line.
fn print_namespace(loader: &FileLoader) {
    let Some(module) = loader.main_module() else {
        return;
    };
    let Ok(Value::Object(ns)) = module.namespace() else {
        return;
    };
    for key in ns.keys() {
        let value = ns.get(&key).unwrap_or(Value::Undefined);
        println!("{} {} = {}", "export".dimmed(), key.cyan(), value);
    }
}
