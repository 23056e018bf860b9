//! dtbmerge - Merge DAISY 2.02 talking books

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use serde::Serialize;

use dtbmerge::{
    BuildOptions, DocumentStore, DtbBuilder, MacroDescriptor, MergeEntry, file_url,
    forest_from_ncc,
};

#[derive(Parser)]
#[command(name = "dtbmerge")]
#[command(version, about = "Merge DAISY 2.02 talking books", long_about = None)]
#[command(after_help = "EXAMPLES:
    dtbmerge a/ncc.html b/ncc.html -o merged     Merge two books
    dtbmerge --macro selection.xml -o merged     Merge a saved selection
    dtbmerge -i a/ncc.html                       List the headings of a book")]
struct Cli {
    /// Source NCC documents, merged in order
    #[arg(value_name = "NCC")]
    inputs: Vec<PathBuf>,

    /// Macro descriptor selecting headings from one or more books
    #[arg(long = "macro", value_name = "FILE")]
    macro_file: Option<PathBuf>,

    /// Output directory (its contents are replaced)
    #[arg(short, long, value_name = "OUTDIR", required_unless_present = "info")]
    output: Option<PathBuf>,

    /// Trailing source audio, in seconds, still copied verbatim
    #[arg(long, value_name = "SECS", default_value_t = 1.5)]
    allowed_end_audio: f64,

    /// Fixed file-name prefix instead of a random one
    #[arg(long, value_name = "P")]
    prefix: Option<String>,

    /// Show the merge forest without building
    #[arg(short, long)]
    info: bool,

    /// Print --info output as JSON
    #[arg(long, requires = "info")]
    json: bool,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Serialize)]
struct EntryInfo {
    title: String,
    anchor: String,
    depth: usize,
    children: Vec<EntryInfo>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .filter_module("symphonia_core", log::LevelFilter::Warn)
        .init();

    let result = load_forest(&cli).and_then(|forest| {
        if cli.info {
            show_info(&forest, cli.json)
        } else {
            merge(&cli, forest)
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_forest(cli: &Cli) -> Result<Vec<MergeEntry>, String> {
    let store = DocumentStore::new();
    let mut forest = Vec::new();

    if let Some(path) = &cli.macro_file {
        let descriptor = MacroDescriptor::load(path).map_err(|e| e.to_string())?;
        forest.extend(descriptor.into_forest(&store).map_err(|e| e.to_string())?);
    }
    for input in &cli.inputs {
        let url = file_url(input).map_err(|e| e.to_string())?;
        forest.extend(forest_from_ncc(&url, &store).map_err(|e| e.to_string())?);
    }

    if forest.is_empty() {
        return Err("no headings selected: pass NCC files or --macro".to_string());
    }
    Ok(forest)
}

fn describe(entries: &[MergeEntry], depth: usize) -> Result<Vec<EntryInfo>, String> {
    entries
        .iter()
        .map(|entry| {
            Ok(EntryInfo {
                title: entry.title().map_err(|e| e.to_string())?,
                anchor: entry.source_anchor().to_string(),
                depth,
                children: describe(&entry.children, depth + 1)?,
            })
        })
        .collect()
}

fn show_info(forest: &[MergeEntry], json: bool) -> Result<(), String> {
    let info = describe(forest, 1)?;
    if json {
        let text = serde_json::to_string_pretty(&info).map_err(|e| e.to_string())?;
        println!("{text}");
        return Ok(());
    }

    fn print(entries: &[EntryInfo]) {
        for entry in entries {
            let indent = "  ".repeat(entry.depth - 1);
            println!("{indent}{}  <{}>", entry.title, entry.anchor);
            print(&entry.children);
        }
    }
    print(&info);
    Ok(())
}

fn merge(cli: &Cli, forest: Vec<MergeEntry>) -> Result<(), String> {
    let output = cli
        .output
        .as_ref()
        .ok_or_else(|| "output directory required".to_string())?;
    if !cli.allowed_end_audio.is_finite() || cli.allowed_end_audio < 0.0 {
        return Err(format!(
            "invalid --allowed-end-audio {}",
            cli.allowed_end_audio
        ));
    }

    let mut options = BuildOptions::default()
        .with_allowed_file_end_audio(Duration::from_secs_f64(cli.allowed_end_audio));
    if let Some(prefix) = &cli.prefix {
        options = options.with_fixed_prefix(prefix.clone());
    }

    let quiet = cli.quiet;
    let mut progress = |percent: u32, message: &str| {
        if !quiet {
            println!("[{percent:>3}%] {message}");
        }
        false
    };

    let mut builder = DtbBuilder::new(forest, options);
    if !builder.build(&mut progress).map_err(|e| e.to_string())? {
        return Err("build cancelled".to_string());
    }
    if !builder
        .save(output, &mut progress)
        .map_err(|e| e.to_string())?
    {
        return Err("save cancelled".to_string());
    }

    if let Some(report) = builder.report()
        && !quiet
    {
        println!(
            "Merged {} unit(s), {} audio file(s), {} image(s), total time {}",
            report.units,
            report.audio_files,
            report.images,
            dtbmerge::time::format_hms(report.total_time)
        );
        println!("Multimedia type: {}", report.multimedia_type.as_str());
    }
    Ok(())
}
