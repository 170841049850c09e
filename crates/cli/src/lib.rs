use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use doc_model::{PageId, Project, TextField};
use scanlate_core::{
    Detection, EngineConfig, FlatExportConfig, ProfileScope, SearchQuery, SearchScope, Session,
};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use storage::{ConfigStore, NewPage, ProjectStore};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "scanlate-cli")]
#[command(about = "Scanlate project tools")]
pub struct Cli {
    /// Log engine activity to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create an empty project with one page per image.
    New {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        name: String,
        /// Page image as IMAGE=WIDTHxHEIGHT, e.g. pages/001.png=800x1200.
        #[arg(long = "page", value_name = "PAGE", value_parser = parse_page)]
        pages: Vec<NewPage>,
    },
    /// Print machine-readable project metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Write source and translation texts to a CSV sheet.
    ExportText {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        sheet: SheetArgs,
    },
    /// Apply the translations of a CSV sheet and save the project.
    ImportText {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(value_name = "SHEET")]
        sheet_file: PathBuf,
        #[command(flatten)]
        sheet: SheetArgs,
    },
    /// Print matches as JSON.
    Find {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Replace every match and save the project.
    Replace {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[command(flatten)]
        search: SearchArgs,
        #[arg(long)]
        with: String,
    },
    /// Merge OCR detections from a JSON file into a page and save the project.
    MergeOcr {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        page: u64,
        #[arg(long)]
        detections: PathBuf,
        /// Profile for regions created by the merge.
        #[arg(long)]
        profile: Option<String>,
    },
    /// Show or reset the stored engine configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    Reset,
    Path,
}

#[derive(Debug, Args)]
struct SheetArgs {
    #[arg(long, default_value_t = ',')]
    delimiter: char,
    #[arg(long)]
    include_hidden: bool,
    #[arg(long)]
    exclude_locked: bool,
    /// Restrict to these page ids.
    #[arg(long = "page")]
    pages: Vec<u64>,
}

impl SheetArgs {
    fn config(&self) -> Result<FlatExportConfig> {
        if !self.delimiter.is_ascii() {
            anyhow::bail!("--delimiter must be a single ASCII character");
        }
        Ok(FlatExportConfig {
            delimiter: self.delimiter as u8,
            include_hidden: self.include_hidden,
            include_locked: !self.exclude_locked,
            page_filter: page_filter(&self.pages),
        })
    }
}

#[derive(Debug, Args)]
struct SearchArgs {
    #[arg(value_name = "QUERY")]
    query: String,
    #[arg(long)]
    match_case: bool,
    #[arg(long)]
    whole_word: bool,
    #[arg(long)]
    regex: bool,
    /// Search profile. Defaults to the configured or project profile.
    #[arg(long)]
    profile: Option<String>,
    /// Visit regions of every profile.
    #[arg(long)]
    all_profiles: bool,
    #[arg(long = "field", value_parser = parse_field)]
    fields: Vec<TextField>,
    #[arg(long = "page")]
    pages: Vec<u64>,
    #[arg(long)]
    skip_hidden: bool,
}

impl SearchArgs {
    fn query(&self) -> SearchQuery {
        SearchQuery::new(&self.query)
            .match_case(self.match_case)
            .whole_word(self.whole_word)
            .regex(self.regex)
    }

    fn scope(&self) -> SearchScope {
        let mut scope = SearchScope::default().with_hidden(!self.skip_hidden);
        if self.all_profiles {
            scope = scope.with_profiles(ProfileScope::All);
        }
        if !self.fields.is_empty() {
            scope = scope.with_fields(self.fields.clone());
        }
        if let Some(pages) = page_filter(&self.pages) {
            scope = scope.with_pages(pages);
        }
        scope
    }
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    name: String,
    default_profile: String,
    profiles: Vec<String>,
    regions: usize,
    pages: Vec<PageOutput>,
}

#[derive(Debug, Serialize)]
struct PageOutput {
    id: PageId,
    image: String,
    regions: usize,
}

#[derive(Debug, Serialize)]
struct ReplaceOutput {
    replaced: usize,
    changes: usize,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    if let Err(error) = init_logging(cli.verbose) {
        eprintln!("warning: verbose logging unavailable: {error}");
    }
    tracing::debug!(command = ?cli.command, "dispatching command");

    match cli.command {
        Commands::New { file, name, pages } => run_new(&file, &name, &pages),
        Commands::Info { file } => run_info(&file),
        Commands::ExportText { file, output, sheet } => run_export_text(&file, &output, &sheet),
        Commands::ImportText { file, sheet_file, sheet } => {
            run_import_text(&file, &sheet_file, &sheet)
        }
        Commands::Find { file, search } => run_find(&file, &search),
        Commands::Replace { file, search, with } => run_replace(&file, &search, &with),
        Commands::MergeOcr { file, page, detections, profile } => {
            run_merge_ocr(&file, PageId(page), &detections, profile.as_deref())
        }
        Commands::Config { action } => run_config(action),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) -> Result<(), TryInitError> {
    if !verbose {
        return Ok(());
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
}

fn run_new(file: &Path, name: &str, pages: &[NewPage]) -> Result<()> {
    let project = ProjectStore::new()
        .new_project(file, name, pages)
        .with_context(|| format!("failed to create {}", file.display()))?;
    println!("created {} with {} pages", file.display(), project.pages().len());
    Ok(())
}

fn run_info(file: &Path) -> Result<()> {
    let project = open_project(file)?;
    let payload = InfoOutput {
        name: project.name().to_owned(),
        default_profile: project.settings().default_profile.clone(),
        profiles: project.profiles().iter().map(|profile| profile.name.clone()).collect(),
        regions: project.region_count(),
        pages: project
            .pages()
            .iter()
            .map(|page| PageOutput {
                id: page.id(),
                image: page.image().to_owned(),
                regions: page.regions().len(),
            })
            .collect(),
    };
    print_json(&payload)
}

fn run_export_text(file: &Path, output: &Path, sheet: &SheetArgs) -> Result<()> {
    let project = open_project(file)?;
    let rows = ProjectStore::new()
        .export_text(&project, output, &sheet.config()?)
        .with_context(|| format!("failed to export text to {}", output.display()))?;
    println!("exported {rows} regions to {}", output.display());
    Ok(())
}

fn run_import_text(file: &Path, sheet_file: &Path, sheet: &SheetArgs) -> Result<()> {
    let store = ProjectStore::new();
    let mut session = open_session(file)?;
    let report = store
        .import_text(&mut session, sheet_file, &sheet.config()?)
        .with_context(|| format!("failed to import {}", sheet_file.display()))?;
    save_session(&store, &mut session, file)?;
    print_json(&report)
}

fn run_find(file: &Path, search: &SearchArgs) -> Result<()> {
    let mut session = open_session(file)?;
    if let Some(profile) = &search.profile {
        session.set_active_profile(profile)?;
    }
    let matches: Vec<_> = session.find(&search.query(), search.scope())?.collect();
    print_json(&matches)
}

fn run_replace(file: &Path, search: &SearchArgs, with: &str) -> Result<()> {
    let store = ProjectStore::new();
    let mut session = open_session(file)?;
    if let Some(profile) = &search.profile {
        session.set_active_profile(profile)?;
    }
    let matches: Vec<_> = session.find(&search.query(), search.scope())?.collect();
    let replaced = matches.len();
    let changes = if replaced == 0 {
        Vec::new()
    } else {
        session.replace_all(matches, |_| with.to_owned())?
    };
    if session.is_dirty() {
        save_session(&store, &mut session, file)?;
    }
    print_json(&ReplaceOutput { replaced, changes: changes.len() })
}

fn run_merge_ocr(
    file: &Path,
    page: PageId,
    detections: &Path,
    profile: Option<&str>,
) -> Result<()> {
    let store = ProjectStore::new();
    let mut session = open_session(file)?;
    if let Some(profile) = profile {
        session.set_active_profile(profile)?;
    }

    let raw = fs::read(detections)
        .with_context(|| format!("failed to read {}", detections.display()))?;
    let detections: Vec<Detection> =
        serde_json::from_slice(&raw).context("detections must be a JSON array")?;

    let ticket = session.begin_ocr(page)?;
    tracing::debug!(page = %page, detections = detections.len(), "merging detections");
    let report = session
        .complete_ocr(ticket, detections)?
        .context("OCR request was cancelled")?;
    if session.is_dirty() {
        save_session(&store, &mut session, file)?;
    }
    print_json(&report)
}

fn run_config(action: ConfigAction) -> Result<()> {
    let store = config_store()?;
    match action {
        ConfigAction::Show => print_json(&store.load().context("failed to load config")?),
        ConfigAction::Reset => {
            let removed = store.reset().context("failed to reset config")?;
            println!("{}", if removed { "config reset" } else { "config already at defaults" });
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", store.config_path().display());
            Ok(())
        }
    }
}

fn config_store() -> Result<ConfigStore> {
    match std::env::var_os("SCANLATE_CONFIG_DIR") {
        Some(dir) => Ok(ConfigStore::with_root(dir)),
        None => ConfigStore::from_default_project().context("failed to locate config directory"),
    }
}

fn load_config() -> Result<EngineConfig> {
    let store = config_store()?;
    tracing::debug!(path = %store.config_path().display(), "loading engine config");
    store.load().context("failed to load config")
}

fn open_project(file: &Path) -> Result<Project> {
    if !file.is_file() {
        anyhow::bail!("file does not exist: {}", file.display());
    }
    ProjectStore::new().open(file).with_context(|| format!("failed to open {}", file.display()))
}

fn open_session(file: &Path) -> Result<Session> {
    Ok(Session::new(open_project(file)?, load_config()?))
}

fn save_session(store: &ProjectStore, session: &mut Session, file: &Path) -> Result<()> {
    tracing::debug!(path = %file.display(), profile = session.active_profile(), "saving project");
    store
        .save_session(session, file)
        .with_context(|| format!("failed to save {}", file.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

fn page_filter(pages: &[u64]) -> Option<Vec<PageId>> {
    if pages.is_empty() {
        None
    } else {
        Some(pages.iter().copied().map(PageId).collect())
    }
}

fn parse_page(value: &str) -> Result<NewPage, String> {
    let (image, size) =
        value.rsplit_once('=').ok_or_else(|| "expected IMAGE=WIDTHxHEIGHT".to_owned())?;
    let (width, height) =
        size.split_once('x').ok_or_else(|| "expected WIDTHxHEIGHT after `=`".to_owned())?;
    let parse = |part: &str| part.parse::<u32>().map_err(|error| format!("{part}: {error}"));
    if image.is_empty() {
        return Err("image path is empty".to_owned());
    }
    Ok(NewPage { image: image.to_owned(), width: parse(width)?, height: parse(height)? })
}

fn parse_field(value: &str) -> Result<TextField, String> {
    match value {
        "source" => Ok(TextField::Source),
        "translation" => Ok(TextField::Translation),
        "override" => Ok(TextField::Override),
        other => Err(format!("unknown field `{other}` (source, translation, override)")),
    }
}
