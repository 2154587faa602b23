//! CLI binary for the Zotero importer.
//!
//! Usage: zimport import references.txt

#[cfg(feature = "cli")]
mod cli {
    use clap::{Parser, Subcommand};
    use comfy_table::{ContentArrangement, Table};
    use std::io::Read;
    use std::path::{Path, PathBuf};
    use tracing_subscriber::{fmt, EnvFilter};
    use zotero_import::config::{default_credentials_path, mask};
    use zotero_import::enrichment::{normalize, EXTRACTION_PROMPT};
    use zotero_import::error::{ImportError, Result};
    use zotero_import::{
        Credentials, EnrichmentPolicy, FirecrawlClient, ImportPipeline, ImportReport, Library,
        LibraryKind, OpenAiClient, Record, ScrapeOracle, ScrapeRequest, Settings, TextResolver,
        ZoteroClient,
    };

    #[derive(Parser)]
    #[command(name = "zimport", about = "Import free-text citations into a Zotero library", version)]
    struct Cli {
        /// Credential file (default: <config dir>/zotero-import/credentials.json)
        #[arg(long, global = true)]
        credentials: Option<PathBuf>,

        /// Output format
        #[arg(long, global = true, default_value = "table")]
        output: OutputFormat,

        /// Log debug output to stderr
        #[arg(short, long, global = true)]
        verbose: bool,

        /// The library ID is a group library
        #[arg(long, global = true)]
        group: bool,

        #[command(subcommand)]
        command: Commands,
    }

    #[derive(Clone, Copy, clap::ValueEnum)]
    enum OutputFormat {
        Table,
        Json,
    }

    #[derive(Subcommand)]
    enum Commands {
        /// Resolve, enrich, merge and write references to Zotero
        Import {
            /// File with reference text ("-" or omitted: stdin)
            file: Option<PathBuf>,
            /// Reference text given inline
            #[arg(short, long, conflicts_with = "file")]
            text: Option<String>,
            /// Import without enrichment data if the enrichment stage fails
            #[arg(long)]
            lenient: bool,
            /// Items per write request (at most 50)
            #[arg(long, default_value = "50")]
            batch_size: usize,
            /// Use one model for every stage
            #[arg(long)]
            model: Option<String>,
        },
        /// Resolve reference text into records without writing anything
        Resolve {
            /// File with reference text ("-" or omitted: stdin)
            file: Option<PathBuf>,
            #[arg(short, long, conflicts_with = "file")]
            text: Option<String>,
        },
        /// Scrape one URL and show the normalized metadata
        Enrich {
            url: String,
        },
        /// List the library's item types, or the fields of one type
        Schema {
            item_type: Option<String>,
        },
        /// Manage stored credentials
        Credentials {
            #[command(subcommand)]
            action: CredentialAction,
        },
    }

    #[derive(Subcommand)]
    enum CredentialAction {
        /// Enter credentials interactively and save them
        Setup {
            /// Do not check the Zotero key against the API
            #[arg(long)]
            skip_validation: bool,
            /// Keep existing values without asking
            #[arg(short, long)]
            yes: bool,
        },
        /// Show the credentials in effect, masked
        Show,
        /// Print the credential file path
        Path,
    }

    fn init_logging(verbose: bool) {
        let default = if verbose {
            "zotero_import=debug,zimport=debug"
        } else {
            "zotero_import=info"
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    /// Environment variables first, then the credential file.
    fn load_credentials(path: &Path) -> Result<Credentials> {
        let stored = Credentials::load(path)?.unwrap_or_default();
        Ok(Credentials::from_env().or(stored))
    }

    fn require<'a>(value: &'a str, name: &'static str) -> Result<&'a str> {
        if value.trim().is_empty() {
            return Err(ImportError::MissingCredential(name));
        }
        Ok(value)
    }

    fn read_input(file: Option<&Path>, text: Option<String>) -> Result<String> {
        if let Some(text) = text {
            return Ok(text);
        }
        match file {
            Some(path) if path != Path::new("-") => Ok(std::fs::read_to_string(path)?),
            _ => {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                Ok(buf)
            }
        }
    }

    fn truncate(s: &str, max: usize) -> String {
        if s.chars().count() <= max {
            return s.to_string();
        }
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }

    fn new_table(header: Vec<&str>) -> Table {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(header);
        table
    }

    fn print_records_table(records: &[Record]) {
        let mut table = new_table(vec!["#", "Type", "Title", "Creators", "Date"]);
        for (i, record) in records.iter().enumerate() {
            let creators = record
                .creators
                .iter()
                .map(|c| c.last_name())
                .collect::<Vec<_>>()
                .join(", ");
            let date = record
                .fields
                .get("date")
                .and_then(|d| d.as_str())
                .unwrap_or("");
            table.add_row(vec![
                i.to_string(),
                record.resolved_item_type().to_string(),
                truncate(record.title().unwrap_or("-"), 60),
                truncate(&creators, 40),
                date.to_string(),
            ]);
        }
        println!("{table}");
    }

    fn print_import_report(report: &ImportReport) {
        let commit = &report.commit;
        println!(
            "Resolved {} reference(s), merged {}; enrichment: {}",
            report.candidates,
            report.merged,
            report.enrichment_url.as_deref().unwrap_or("none")
        );
        println!(
            "Created {}, failed {}, skipped {} in {} batch(es)",
            commit.committed_count(),
            commit.failed_count(),
            commit.skipped_count(),
            commit.batch_count()
        );

        if !commit.batches.is_empty() {
            let mut table = new_table(vec!["Batch", "Items", "Created", "Failed", "Status"]);
            for batch in &commit.batches {
                let status = match &batch.outcome {
                    zotero_import::BatchOutcome::Committed { .. } => "ok".to_string(),
                    zotero_import::BatchOutcome::Failed { error } => truncate(error, 60),
                };
                table.add_row(vec![
                    batch.index.to_string(),
                    batch.records.len().to_string(),
                    batch.success_count().to_string(),
                    batch.failure_count().to_string(),
                    status,
                ]);
            }
            println!("{table}");
        }

        if !commit.skipped.is_empty() {
            println!("Skipped records:");
            let mut table = new_table(vec!["Index", "Type", "Reason"]);
            for skip in &commit.skipped {
                table.add_row(vec![
                    skip.index.to_string(),
                    skip.item_type.clone(),
                    truncate(&skip.reason, 70),
                ]);
            }
            println!("{table}");
        }
    }

    pub async fn run() -> Result<()> {
        let cli = Cli::parse();
        init_logging(cli.verbose);

        let path = cli.credentials.clone().unwrap_or_else(default_credentials_path);
        let kind = if cli.group {
            LibraryKind::Group
        } else {
            LibraryKind::User
        };
        let settings = Settings::default().with_library_kind(kind);

        match cli.command {
            Commands::Import {
                file,
                text,
                lenient,
                batch_size,
                model,
            } => {
                let input = read_input(file.as_deref(), text)?;
                let credentials = load_credentials(&path)?;

                let mut settings = settings.with_batch_size(batch_size);
                if lenient {
                    settings = settings.with_enrichment(EnrichmentPolicy::Optional);
                }
                if let Some(model) = model {
                    settings = settings.with_model(model);
                }

                let pipeline = ImportPipeline::from_credentials(&credentials, settings)?;
                let report = pipeline.run(&input).await?;
                credentials.save(&path)?;

                match cli.output {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                    OutputFormat::Table => print_import_report(&report),
                }
            }
            Commands::Resolve { file, text } => {
                let input = read_input(file.as_deref(), text)?;
                let credentials = load_credentials(&path)?;
                let oracle = OpenAiClient::with_base_url(
                    require(&credentials.openai_key, "openai_key")?,
                    &settings.openai_base_url,
                    settings.oracle_timeout,
                )?;
                let records = TextResolver::new(std::sync::Arc::new(oracle), &settings.resolve_model)
                    .resolve(&input)
                    .await?;

                match cli.output {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                    OutputFormat::Table => print_records_table(&records),
                }
            }
            Commands::Enrich { url } => {
                let credentials = load_credentials(&path)?;
                let scraper = FirecrawlClient::with_base_url(
                    require(&credentials.firecrawl_key, "firecrawl_key")?,
                    &settings.firecrawl_base_url,
                    settings.oracle_timeout,
                )?;
                let page = scraper
                    .scrape(&ScrapeRequest {
                        url: url.clone(),
                        extraction_prompt: EXTRACTION_PROMPT.to_string(),
                    })
                    .await?;
                let record = normalize(&url, page).to_value();

                match cli.output {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
                    OutputFormat::Table => {
                        let mut table = new_table(vec!["Field", "Value"]);
                        if let Some(fields) = record.as_object() {
                            for (key, value) in fields {
                                let shown = match value {
                                    serde_json::Value::String(s) => truncate(s, 80),
                                    serde_json::Value::Array(items) => format!("{} entries", items.len()),
                                    other => truncate(&other.to_string(), 80),
                                };
                                table.add_row(vec![key.clone(), shown]);
                            }
                        }
                        println!("{table}");
                    }
                }
            }
            Commands::Schema { item_type } => {
                let credentials = load_credentials(&path)?;
                let zotero = ZoteroClient::with_base_url(
                    &settings.zotero_base_url,
                    kind,
                    require(&credentials.library_id, "library_id")?,
                    require(&credentials.api_key, "api_key")?,
                    settings.library_timeout,
                )?;

                let (header, mut names) = match &item_type {
                    Some(t) => ("Field", zotero.item_type_fields(t).await?),
                    None => ("Item type", zotero.item_types().await?),
                };
                names.sort();

                match cli.output {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&names)?),
                    OutputFormat::Table => {
                        let mut table = new_table(vec![header]);
                        for name in names {
                            table.add_row(vec![name]);
                        }
                        println!("{table}");
                    }
                }
            }
            Commands::Credentials { action } => match action {
                CredentialAction::Setup {
                    skip_validation,
                    yes,
                } => {
                    zotero_import::setup::run_setup(&path, kind, skip_validation, yes).await?;
                }
                CredentialAction::Show => {
                    let credentials = load_credentials(&path)?;
                    let rows = [
                        ("library_id", credentials.library_id.clone()),
                        ("api_key", mask(&credentials.api_key)),
                        ("openai_key", mask(&credentials.openai_key)),
                        ("firecrawl_key", mask(&credentials.firecrawl_key)),
                    ];
                    match cli.output {
                        OutputFormat::Json => {
                            let obj: serde_json::Map<String, serde_json::Value> = rows
                                .into_iter()
                                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v)))
                                .collect();
                            println!("{}", serde_json::to_string_pretty(&obj)?);
                        }
                        OutputFormat::Table => {
                            println!("Credential file: {}", path.display());
                            let mut table = new_table(vec!["Credential", "Value"]);
                            for (name, value) in rows {
                                let value = if value.is_empty() { "(not set)".to_string() } else { value };
                                table.add_row(vec![name.to_string(), value]);
                            }
                            println!("{table}");
                        }
                    }
                }
                CredentialAction::Path => println!("{}", path.display()),
            },
        }

        Ok(())
    }
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() {
    if let Err(e) = cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("This binary requires the 'cli' feature. Build with: cargo build --features cli");
    std::process::exit(1);
}
