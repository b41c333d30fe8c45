use clap::Parser;
use serde::Serialize;
use thedocs::{
    DocumentRecord,
    Library,
    MetadataUpdate,
    error::{self, Error},
    library::{DeleteReport, EnrichSummary, ProcessSummary, UploadReport},
    search::{SearchOutcome, SearchSource},
};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("THEDOCS_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let library = cli.settings.open_library()?;

    match cli.command {
        Command::Upload(args) => cmd_upload(&library, &args)?,
        Command::Process(args) => {
            let summary = library.process()?;
            print_process(&summary, args.json)?;
        }
        Command::Enrich(args) => {
            let summary = library.enrich_missing()?;
            print_enrich(&summary, args.json)?;
        }
        Command::List(args) => {
            let records =
                library.list(args.public_only, args.pattern.as_deref())?;
            print_records(&records, args.json)?;
        }
        Command::Show(args) => cmd_show(&library, &args)?,
        Command::Search(args) => {
            let outcome =
                library.search(&args.query, args.public_only, args.count)?;
            if args.json {
                print_json(&outcome)?;
            } else {
                print_search(&outcome);
            }
        }
        Command::Visibility(args) => {
            let is_public = args.visibility.is_public();
            library.set_visibility(&args.filename, is_public)?;
            let label = if is_public { "public" } else { "private" };
            println!("'{}' is now {label}", args.filename);
        }
        Command::SetMetadata(args) => {
            let update = MetadataUpdate {
                title: args.title,
                description: args.description,
            };
            if update.is_empty() {
                eprintln!(
                    "Nothing to update: pass --title and/or --description."
                );
            }
            library.set_metadata(&args.filename, update)?;
            println!("Updated '{}'", args.filename);
        }
        Command::Delete { filename } => {
            let report = library.delete(&filename)?;
            print_delete(&filename, &report);
        }
        Command::Reindex => {
            if library.index().is_enabled() {
                let count = library.reindex()?;
                println!("Reindexed {count} document(s)");
            } else {
                eprintln!("No search engine configured; nothing to reindex.");
            }
        }
        Command::Status(args) => {
            let status = library.status()?;
            if args.json {
                print_json(&status)?;
            } else {
                println!("Data directory: {}", status.data_dir);
                println!(
                    "Documents: {} ({} public)",
                    status.records, status.public
                );
                println!(
                    "Search engine: {}",
                    status.engine.unwrap_or("none (file scan)")
                );
                println!(
                    "Summarizer: {}",
                    if status.summarizer { "configured" } else { "none" }
                );
                print_names("Unsynced files", &status.unsynced);
                print_names("Orphaned records", &status.orphaned);
            }
        }
        Command::Completions(_) => {}
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> error::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_names(label: &str, names: &[String]) {
    println!("{label}: {}", names.len());
    for name in names {
        println!("  {name}");
    }
}

fn cmd_upload(library: &Library, args: &cli::UploadArgs) -> error::Result<()> {
    let name = match &args.name {
        Some(name) => name.clone(),
        None => args
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::InvalidPath(args.path.display().to_string())
            })?,
    };
    let bytes = std::fs::read(&args.path)?;

    let report = library.upload(
        &name,
        &bytes,
        &args.title,
        &args.description,
        args.public,
    )?;

    if args.json {
        return print_json(&report);
    }
    print_upload(&report);
    Ok(())
}

fn print_upload(report: &UploadReport) {
    println!("Uploaded '{}'", report.filename);
    if report.enriched {
        println!("  generated missing metadata");
    }
    if report.enrichment_errors > 0 {
        eprintln!(
            "  metadata generation failed; the record keeps what was given"
        );
    }
    if report.indexed {
        println!("  indexed for search");
    }
}

fn print_process(summary: &ProcessSummary, json: bool) -> error::Result<()> {
    if json {
        return print_json(summary);
    }
    println!("New files recorded: {}", summary.new_files);
    println!("Records enriched: {}", summary.enriched);
    println!("Records already complete: {}", summary.skipped);
    println!("Enrichment errors: {}", summary.errors);
    if summary.orphaned > 0 {
        eprintln!(
            "Warning: {} record(s) point at missing files",
            summary.orphaned
        );
    }
    Ok(())
}

fn print_enrich(summary: &EnrichSummary, json: bool) -> error::Result<()> {
    if json {
        return print_json(summary);
    }
    if summary.candidates == 0 {
        println!("Every record already has a title and description.");
        return Ok(());
    }
    println!(
        "Enriched {} of {} record(s), {} error(s)",
        summary.enriched, summary.candidates, summary.errors
    );
    Ok(())
}

fn print_records(records: &[DocumentRecord], json: bool) -> error::Result<()> {
    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for record in records {
        let visibility = if record.is_public { "public" } else { "private" };
        println!(
            "{}\t{visibility}\t{}\t{}",
            record.filename, record.date_uploaded, record.title
        );
    }
    Ok(())
}

fn cmd_show(library: &Library, args: &cli::ShowArgs) -> error::Result<()> {
    let document = library.open_document(&args.filename, !args.public_only)?;
    let record = &document.record;

    if args.json {
        if args.meta {
            return print_json(record);
        }
        return print_json(&document);
    }
    if args.meta {
        println!("filename: {}", record.filename);
        println!("title: {}", record.title);
        println!("description: {}", record.description);
        println!("public: {}", record.is_public);
        println!("uploaded: {}", record.date_uploaded);
        println!("updated: {}", record.updated_at);
    } else {
        print!("{}", document.content);
        if !document.content.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

fn print_search(outcome: &SearchOutcome) {
    if outcome.hits.is_empty() {
        println!("No results.");
        return;
    }
    for hit in &outcome.hits {
        println!("{}", hit.filename);
        if !hit.snippet.is_empty() {
            println!("  {}", hit.snippet);
        }
    }
    let source = match outcome.source {
        SearchSource::Engine(name) => name,
        SearchSource::Fallback => "file scan",
    };
    eprintln!("\n{} result(s) via {source}", outcome.hits.len());
}

fn print_delete(filename: &str, report: &DeleteReport) {
    match (report.file_removed, report.record_removed) {
        (false, false) => println!("Nothing to delete for '{filename}'"),
        (true, true) => println!("Deleted '{filename}'"),
        (true, false) => {
            println!("Deleted file '{filename}' (it had no record)")
        }
        (false, true) => {
            println!("Deleted record '{filename}' (its file was already gone)")
        }
    }
}
