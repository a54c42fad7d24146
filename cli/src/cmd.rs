//! Subcommands.
//!
//! ## Commands
//!
//! - `servicedesk intake --name <N> --phone <P> --model <M> --reg <R>`
//! - `servicedesk board [--search <Q>] [--stage <S>] [--json]`
//! - `servicedesk show <ID>`
//! - `servicedesk move <ID> <STAGE>` / `advance <ID>`
//! - `servicedesk update <ID> [--insurance <S>] [--parts <S>] ...`
//! - `servicedesk note <ID> <TEXT>`
//! - `servicedesk photo add <ID> <FILE>...` / `photo rm <ID> <PHOTO_ID>`
//! - `servicedesk priority <ID>` / `delete <ID>`
//! - `servicedesk stats` / `sweep` / `watch`
//!
//! Case ids may be abbreviated to any unique prefix.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use servicedesk_codec::JpegDataUrlCodec;
use servicedesk_core::{
    BoardStats, CaseFilter, CaseStage, CaseUpdate, DurableStore, ImageCodec, InsuranceStatus,
    NewCase, PartsStatus, Priority, Repository, RepositorySettings, ServiceDeskConfig, SystemClock,
    build_board,
};

use crate::render;

#[derive(Debug, Parser)]
#[command(name = "servicedesk", version, about = "Vehicle repair case board")]
pub struct Cli {
    /// Config file (defaults to $SERVICEDESK_CONFIG, then
    /// ~/.config/servicedesk/servicedesk.toml).
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register a new case.
    Intake(IntakeArgs),
    /// Show the board, one column per stage.
    Board(BoardArgs),
    /// Show one case in full.
    Show(ShowArgs),
    /// Put a case in any stage.
    Move(MoveArgs),
    /// Move a case one stage forward.
    Advance(IdArgs),
    /// Edit case fields.
    Update(UpdateArgs),
    /// Add a note to a case.
    Note(NoteArgs),
    /// Attach or remove photos.
    #[command(subcommand)]
    Photo(PhotoCommand),
    /// Toggle urgent / normal.
    Priority(IdArgs),
    /// Delete a case.
    Delete(IdArgs),
    /// Header counters.
    Stats(JsonArgs),
    /// Archive photos of long-closed cases now.
    Sweep,
    /// Keep running, archiving in the background, and print board changes.
    Watch,
}

#[derive(Debug, Args)]
pub struct IntakeArgs {
    #[arg(long = "name")]
    pub customer_name: String,

    #[arg(long = "phone")]
    pub customer_phone: String,

    #[arg(long = "model")]
    pub vehicle_model: String,

    #[arg(long = "reg")]
    pub registration_number: String,

    #[arg(long = "color", default_value = "")]
    pub vehicle_color: String,

    #[arg(long = "damage", default_value = "")]
    pub damage_description: String,

    #[arg(long = "urgent")]
    pub urgent: bool,

    /// Image files to attach (JPEG or PNG).
    #[arg(long = "photo")]
    pub photos: Vec<PathBuf>,
}

#[derive(Debug, Args)]
pub struct BoardArgs {
    /// Match name, phone, registration or model.
    #[arg(long = "search", short = 's', default_value = "")]
    pub search: String,

    #[arg(long = "priority", value_parser = parse_priority)]
    pub priority: Option<Priority>,

    #[arg(long = "stage", value_parser = parse_stage)]
    pub stage: Option<CaseStage>,

    #[arg(long = "insurance", value_parser = parse_insurance)]
    pub insurance: Option<InsuranceStatus>,

    #[arg(long = "parts", value_parser = parse_parts)]
    pub parts: Option<PartsStatus>,

    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    pub id: String,

    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct IdArgs {
    pub id: String,
}

#[derive(Debug, Args)]
pub struct JsonArgs {
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct MoveArgs {
    pub id: String,

    #[arg(value_parser = parse_stage)]
    pub stage: CaseStage,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    pub id: String,

    #[arg(long = "name")]
    pub customer_name: Option<String>,

    #[arg(long = "phone")]
    pub customer_phone: Option<String>,

    #[arg(long = "model")]
    pub vehicle_model: Option<String>,

    #[arg(long = "color")]
    pub vehicle_color: Option<String>,

    #[arg(long = "reg")]
    pub registration_number: Option<String>,

    #[arg(long = "damage")]
    pub damage_description: Option<String>,

    #[arg(long = "insurance", value_parser = parse_insurance)]
    pub insurance: Option<InsuranceStatus>,

    #[arg(long = "parts", value_parser = parse_parts)]
    pub parts: Option<PartsStatus>,
}

#[derive(Debug, Args)]
pub struct NoteArgs {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Subcommand)]
pub enum PhotoCommand {
    /// Compress and attach image files.
    Add {
        id: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Remove one photo.
    Rm { id: String, photo_id: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Value parsers
// ─────────────────────────────────────────────────────────────────────────────

fn parse_stage(s: &str) -> std::result::Result<CaseStage, String> {
    CaseStage::parse(s).ok_or_else(|| {
        let known: Vec<&str> = CaseStage::ORDER.iter().map(CaseStage::as_str).collect();
        format!("unknown stage `{s}` (expected one of: {})", known.join(", "))
    })
}

fn parse_insurance(s: &str) -> std::result::Result<InsuranceStatus, String> {
    InsuranceStatus::parse(s).ok_or_else(|| {
        let known: Vec<&str> = InsuranceStatus::ALL.iter().map(InsuranceStatus::as_str).collect();
        format!("unknown insurance status `{s}` (expected one of: {})", known.join(", "))
    })
}

fn parse_parts(s: &str) -> std::result::Result<PartsStatus, String> {
    PartsStatus::parse(s).ok_or_else(|| {
        let known: Vec<&str> = PartsStatus::ALL.iter().map(PartsStatus::as_str).collect();
        format!("unknown parts status `{s}` (expected one of: {})", known.join(", "))
    })
}

fn parse_priority(s: &str) -> std::result::Result<Priority, String> {
    Priority::parse(s).ok_or_else(|| format!("unknown priority `{s}` (expected normal or urgent)"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

pub async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ServiceDeskConfig::load_from_path(path),
        None => ServiceDeskConfig::load(),
    }
    .context("failed to load configuration")?;

    let store = Arc::new(DurableStore::open(&config));
    let repo = Repository::open(
        store,
        Arc::new(SystemClock),
        RepositorySettings::from(&config),
    )
    .await;
    let mut storage_full = repo.subscribe_storage_full();
    let codec: Arc<dyn ImageCodec> = Arc::new(JpegDataUrlCodec::new());

    let result = dispatch(&repo, &config, codec, cli.command).await;

    repo.shutdown().await;
    if repo.saving_disabled() {
        eprintln!("warning: stored cases could not be read, changes were not saved");
    }
    while let Ok(event) = storage_full.try_recv() {
        eprintln!(
            "warning: storage is full, recent changes were not saved ({})",
            event.message
        );
    }
    result
}

async fn dispatch(
    repo: &Repository,
    config: &ServiceDeskConfig,
    codec: Arc<dyn ImageCodec>,
    command: Command,
) -> Result<()> {
    match command {
        Command::Intake(args) => intake(repo, codec, args).await,
        Command::Board(args) => {
            let filter = CaseFilter {
                search: args.search,
                priority: args.priority,
                stage: args.stage,
                insurance: args.insurance,
                parts: args.parts,
            };
            let snapshot = repo.snapshot();
            let board = build_board(&snapshot.cases, &filter);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&board)?);
            } else {
                print!("{}", render::board(&board));
            }
            Ok(())
        }
        Command::Show(args) => {
            let id = resolve_id(repo, &args.id)?;
            let case = repo.get(&id).with_context(|| format!("case {id} disappeared"))?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&case)?);
            } else {
                print!("{}", render::case_detail(&case));
            }
            Ok(())
        }
        Command::Move(args) => {
            let id = resolve_id(repo, &args.id)?;
            repo.move_case(&id, args.stage)?;
            println!("{} -> {}", render::short_id(&id), args.stage.label());
            Ok(())
        }
        Command::Advance(args) => {
            let id = resolve_id(repo, &args.id)?;
            match repo.advance_stage(&id)? {
                Some(stage) => println!("{} -> {}", render::short_id(&id), stage.label()),
                None => println!("{} is already closed", render::short_id(&id)),
            }
            Ok(())
        }
        Command::Update(args) => {
            let id = resolve_id(repo, &args.id)?;
            let update = CaseUpdate {
                customer_name: args.customer_name,
                customer_phone: args.customer_phone,
                vehicle_model: args.vehicle_model,
                vehicle_color: args.vehicle_color,
                registration_number: args.registration_number,
                damage_description: args.damage_description,
                insurance_status: args.insurance,
                parts_status: args.parts,
                ..Default::default()
            };
            if update == CaseUpdate::default() {
                bail!("nothing to update");
            }
            repo.update_case(&id, update)?;
            println!("updated {}", render::short_id(&id));
            Ok(())
        }
        Command::Note(args) => {
            let id = resolve_id(repo, &args.id)?;
            match repo.add_note(&id, &args.text)? {
                Some(note) => println!("note {} added", render::short_id(&note.id)),
                None => bail!("note text is empty"),
            }
            Ok(())
        }
        Command::Photo(PhotoCommand::Add { id, files }) => {
            let id = resolve_id(repo, &id)?;
            attach_photos(repo, codec, &id, &files).await
        }
        Command::Photo(PhotoCommand::Rm { id, photo_id }) => {
            let id = resolve_id(repo, &id)?;
            let case = repo.get(&id).with_context(|| format!("case {id} disappeared"))?;
            let photo = case
                .photos
                .iter()
                .find(|photo| photo.id.starts_with(&photo_id))
                .with_context(|| format!("no photo matches `{photo_id}`"))?;
            repo.delete_photo(&id, &photo.id)?;
            println!("photo {} removed", render::short_id(&photo.id));
            Ok(())
        }
        Command::Priority(args) => {
            let id = resolve_id(repo, &args.id)?;
            if let Some(priority) = repo.toggle_priority(&id)? {
                println!("{} is now {}", render::short_id(&id), priority.label());
            }
            Ok(())
        }
        Command::Delete(args) => {
            let id = resolve_id(repo, &args.id)?;
            repo.delete_case(&id)?;
            println!("deleted {}", render::short_id(&id));
            Ok(())
        }
        Command::Stats(args) => {
            let stats = BoardStats::from_cases(&repo.snapshot().cases);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print!("{}", render::stats(&stats));
            }
            Ok(())
        }
        Command::Sweep => {
            let report = repo.run_archival_sweep(codec).await;
            println!(
                "archived {} photo(s) across {} case(s), {} failed",
                report.archived, report.cases, report.failed
            );
            Ok(())
        }
        Command::Watch => watch(repo, config, codec).await,
    }
}

async fn intake(repo: &Repository, codec: Arc<dyn ImageCodec>, args: IntakeArgs) -> Result<()> {
    let raws = read_files(&args.photos)?;
    let intake = NewCase {
        customer_name: args.customer_name,
        customer_phone: args.customer_phone,
        vehicle_model: args.vehicle_model,
        vehicle_color: args.vehicle_color,
        registration_number: args.registration_number,
        damage_description: args.damage_description,
        priority: if args.urgent {
            Priority::Urgent
        } else {
            Priority::Normal
        },
    };

    let case = repo.create_case(intake, Vec::new())?;
    println!("{}", case.id);

    if !raws.is_empty()
        && let Some(report) = repo.add_raw_photos(&case.id, raws, codec).await?
    {
        eprintln!("{}", render::photo_report(&report));
    }
    Ok(())
}

async fn attach_photos(
    repo: &Repository,
    codec: Arc<dyn ImageCodec>,
    id: &str,
    files: &[PathBuf],
) -> Result<()> {
    let raws = read_files(files)?;
    let report = repo
        .add_raw_photos(id, raws, codec)
        .await?
        .with_context(|| format!("case {id} disappeared"))?;
    println!("{}", render::photo_report(&report));
    Ok(())
}

async fn watch(
    repo: &Repository,
    config: &ServiceDeskConfig,
    codec: Arc<dyn ImageCodec>,
) -> Result<()> {
    if config.archive.enabled {
        repo.start_archival(codec);
    } else {
        tracing::info!("archival disabled by config");
    }

    let mut changes = repo.subscribe();
    print!("{}", render::stats(&BoardStats::from_cases(&repo.snapshot().cases)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let stats = BoardStats::from_cases(&changes.borrow_and_update().cases);
                print!("{}", render::stats(&stats));
            }
        }
    }
    Ok(())
}

fn read_files(paths: &[PathBuf]) -> Result<Vec<Vec<u8>>> {
    paths
        .iter()
        .map(|path| {
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
        })
        .collect()
}

/// Expand a unique id prefix to the full case id.
fn resolve_id(repo: &Repository, prefix: &str) -> Result<String> {
    let snapshot = repo.snapshot();
    if snapshot.find(prefix).is_some() {
        return Ok(prefix.to_string());
    }
    let mut matches = snapshot
        .cases
        .iter()
        .filter(|case| case.id.starts_with(prefix));
    let Some(first) = matches.next() else {
        bail!("no case matches `{prefix}`");
    };
    if matches.next().is_some() {
        bail!("`{prefix}` matches more than one case");
    }
    Ok(first.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parsers_accept_serialized_names() {
        assert_eq!(parse_stage("ready-for-delivery"), Ok(CaseStage::ReadyForDelivery));
        assert_eq!(parse_insurance("under-review"), Ok(InsuranceStatus::UnderReview));
        assert_eq!(parse_parts("arrived"), Ok(PartsStatus::Arrived));
        assert_eq!(parse_priority("urgent"), Ok(Priority::Urgent));
        assert!(parse_stage("done").unwrap_err().contains("case-closed"));
    }

    #[test]
    fn cli_parses_board_filters() {
        let cli = Cli::parse_from([
            "servicedesk",
            "board",
            "--stage",
            "repair-in-progress",
            "--priority",
            "urgent",
            "--json",
        ]);
        let Command::Board(args) = cli.command else {
            panic!("expected board");
        };
        assert_eq!(args.stage, Some(CaseStage::RepairInProgress));
        assert_eq!(args.priority, Some(Priority::Urgent));
        assert!(args.json);
    }
}
