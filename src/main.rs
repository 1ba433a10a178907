//! Gantry CLI - tools for working with Gantry plugins
//!
//! Commands:
//!   gantry inspect <wasm>  - Display metadata from a plugin module

use clap::{Parser, Subcommand};
use gantry::{build_id, extract_metadata, PluginMetadata, SdkLanguage, TypeDef};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "Tools for working with Gantry plugins", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a plugin module and display its metadata
    Inspect {
        /// Path to the WASM file
        wasm_file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { wasm_file, json } => inspect_command(&wasm_file, json),
    }
}

fn inspect_command(wasm_file: &PathBuf, json: bool) -> anyhow::Result<()> {
    let wasm_bytes = std::fs::read(wasm_file)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", wasm_file.display(), e))?;

    let metadata = extract_metadata(&wasm_bytes)
        .map_err(|e| anyhow::anyhow!("Failed to extract metadata: {}", e))?;
    let build_id = build_id(&wasm_bytes);

    if json {
        let output = serde_json::json!({
            "build_id": build_id,
            "metadata": metadata,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_metadata(&metadata, &build_id);
    Ok(())
}

fn print_metadata(metadata: &PluginMetadata, build_id: &str) {
    println!("Plugin: {}", metadata.plugin);
    println!("Build id: {}", build_id);
    let language = match metadata.language {
        SdkLanguage::AssemblyScript => "assemblyscript (managed profile)",
        SdkLanguage::TinyGo => "tinygo (native profile)",
    };
    println!("Language: {}", language);
    if let Some(version) = &metadata.sdk_version {
        println!("SDK version: {}", version);
    }

    if !metadata.functions.is_empty() {
        println!("\nFunctions:");
        for function in &metadata.functions {
            let params: Vec<String> = function
                .parameters
                .iter()
                .map(|p| format!("{}: {}", p.name, p.descriptor))
                .collect();
            let result = function
                .return_type
                .as_deref()
                .map(|r| format!(" -> {r}"))
                .unwrap_or_default();
            println!("  {}({}){}", function.name, params.join(", "), result);
        }
    }

    if !metadata.types.is_empty() {
        println!("\nTypes:");
        for def in &metadata.types {
            match def {
                TypeDef::Record { name, size, fields } => {
                    println!("  record {} ({} bytes)", name, size);
                    for field in fields {
                        println!(
                            "    {}: {} @ offset {}",
                            field.name, field.descriptor, field.offset
                        );
                    }
                }
                TypeDef::Variant { name, cases } => {
                    println!("  variant {}", name);
                    for case in cases {
                        match &case.payload {
                            Some(payload) => println!("    {}({})", case.name, payload),
                            None => println!("    {}", case.name),
                        }
                    }
                }
            }
        }
    }
}
