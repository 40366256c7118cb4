use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;

use skyrim_string_patch::{string_records, Plugin, PluginString};

#[derive(FromArgs)]
/// Extracts translatable strings from a TES5 Skyrim plugin file, or applies
/// translated strings and writes the plugin back
struct Args {
    /// path to the plugin to parse
    #[argh(positional)]
    plugin: PathBuf,
    /// also extract localized string ids
    #[argh(switch, short = 'l')]
    localized: bool,
    /// emit every string, skipping the validity filter
    #[argh(switch, short = 'u')]
    unfiltered: bool,
    /// pretty print json output
    #[argh(switch, short = 'p')]
    pretty: bool,
    /// json file with translated strings to apply
    #[argh(option, short = 'a')]
    apply: Option<PathBuf>,
    /// path to write the patched plugin to (defaults to the input path)
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,
    /// custom string records table (record type -> translatable tags)
    #[argh(option, short = 't')]
    table: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args: Args = argh::from_env();

    if let Some(table) = &args.table {
        string_records::init_from_file(table)
            .with_context(|| format!("failed to load string records table {}", table.display()))?;
    }

    let mut plugin = Plugin::load(&args.plugin)
        .with_context(|| format!("failed to parse plugin file {}", args.plugin.display()))?;

    match &args.apply {
        Some(apply) => {
            let json = fs::read_to_string(apply)
                .with_context(|| format!("failed to read translations from {}", apply.display()))?;
            let strings: Vec<PluginString> = serde_json::from_str(&json)
                .with_context(|| format!("failed to parse translations from {}", apply.display()))?;
            plugin.replace_strings(&strings);

            let output = args.output.as_ref().unwrap_or(&args.plugin);
            fs::write(output, plugin.dump()?)
                .with_context(|| format!("failed to write plugin to {}", output.display()))?;
            eprintln!("wrote {}", output.display());
        }
        None => {
            let strings = plugin.extract_strings(args.localized, args.unfiltered);
            if args.pretty {
                println!("{}", serde_json::to_string_pretty(&strings)?);
            } else {
                println!("{}", serde_json::to_string(&strings)?);
            }
        }
    }
    Ok(())
}
