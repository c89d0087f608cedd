//! Command-line front end for the lead store.
//!
//! # Responsibility
//! - Map subcommands onto `LeadService` calls.
//! - Print results as JSON on stdout and change events on stderr.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use leadflow_core::db::open_db;
use leadflow_core::{
    init_logging, BroadcastManager, ChannelObserver, LeadError, LeadService, LeadUpdate,
    LeadflowConfig, NewLead, PageRequest, SortField, SqliteLeadRepository, Stage,
};
use log::warn;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "leadflow")]
#[command(about = "Manage sales leads and their pipeline stage")]
#[command(version)]
struct Cli {
    /// Actor id recorded on broadcast events
    #[arg(long, global = true, default_value = "cli")]
    actor: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a lead
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        company: String,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        engaged: bool,
        /// Initial stage, e.g. `new_lead`
        #[arg(long)]
        stage: Option<String>,
        /// RFC 3339 timestamp
        #[arg(long)]
        last_contacted: Option<String>,
    },

    /// Show one lead
    Get { id: String },

    /// List leads one page at a time
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        page_size: u32,
        #[arg(long, default_value = "created_at")]
        sort_by: String,
        /// Sort ascending instead of newest first
        #[arg(long)]
        asc: bool,
        #[arg(long)]
        search: Option<String>,
    },

    /// Change fields of a lead
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        engaged: Option<bool>,
        #[arg(long)]
        stage: Option<String>,
        /// Note stored with the stage change
        #[arg(long, requires = "stage")]
        note: Option<String>,
        /// RFC 3339 timestamp
        #[arg(long, conflicts_with = "clear_last_contacted")]
        last_contacted: Option<String>,
        #[arg(long)]
        clear_last_contacted: bool,
    },

    /// Delete a lead
    Delete { id: String },

    /// Show pipeline progress for a lead
    Progress { id: String },
}

enum CliError {
    Setup(String),
    Input(String),
    Lead(LeadError),
}

impl From<LeadError> for CliError {
    fn from(err: LeadError) -> Self {
        Self::Lead(err)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Setup(message)) => {
            eprintln!("error: {message}");
            ExitCode::from(2)
        }
        Err(CliError::Input(message)) => {
            eprintln!("error[400]: {message}");
            ExitCode::FAILURE
        }
        Err(CliError::Lead(err)) => {
            eprintln!("error[{}]: {}", err.status_code(), err.public_message());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = LeadflowConfig::from_env().map_err(|err| CliError::Setup(err.to_string()))?;
    if let Some(log_dir) = &config.log_dir {
        if let Err(err) = init_logging(&config.log_level, &log_dir.to_string_lossy()) {
            eprintln!("warning: file logging disabled: {err}");
        }
    }

    let conn = open_db(&config.db_path).map_err(|err| CliError::Setup(err.to_string()))?;
    let repo = SqliteLeadRepository::new(&conn).with_stage_policy(config.stage_policy);
    let broadcaster = BroadcastManager::new();
    let (observer, frames) = ChannelObserver::pair(config.observer_buffer);
    broadcaster
        .register(Arc::new(observer))
        .map_err(|err| CliError::Setup(err.to_string()))?;
    let service = LeadService::new(repo, broadcaster);

    let result = execute(&service, cli.command, &cli.actor);

    for frame in frames.try_iter() {
        eprintln!("event: {frame}");
    }
    service.broadcaster().shutdown();
    result
}

fn execute(
    service: &LeadService<SqliteLeadRepository<'_>>,
    command: Command,
    actor: &str,
) -> Result<(), CliError> {
    match command {
        Command::Create {
            name,
            email,
            company,
            status,
            engaged,
            stage,
            last_contacted,
        } => {
            let mut input = NewLead::new(name, email, company);
            if let Some(status) = status {
                input.status = status;
            }
            input.engaged = engaged;
            if let Some(stage) = stage {
                input.current_stage = parse_stage(&stage)?;
            }
            input.last_contacted = last_contacted.as_deref().map(parse_timestamp).transpose()?;
            print_json(&service.create_lead(&input, actor)?)
        }
        Command::Get { id } => print_json(&service.get_lead(&id)?),
        Command::List {
            page,
            page_size,
            sort_by,
            asc,
            search,
        } => {
            let request = PageRequest {
                page,
                page_size,
                sort_by: sort_by.parse::<SortField>().map_err(CliError::Input)?,
                sort_desc: !asc,
                search,
            };
            print_json(&service.list_leads(&request)?)
        }
        Command::Update {
            id,
            name,
            email,
            company,
            status,
            engaged,
            stage,
            note,
            last_contacted,
            clear_last_contacted,
        } => {
            let last_contacted = if clear_last_contacted {
                Some(None)
            } else {
                last_contacted
                    .as_deref()
                    .map(parse_timestamp)
                    .transpose()?
                    .map(Some)
            };
            let changes = LeadUpdate {
                name,
                email,
                company,
                status,
                engaged,
                current_stage: stage.as_deref().map(parse_stage).transpose()?,
                stage_note: note,
                last_contacted,
            };
            print_json(&service.update_lead(&id, &changes, actor)?)
        }
        Command::Delete { id } => print_json(&service.delete_lead(&id, actor)?),
        Command::Progress { id } => print_json(&service.get_lead(&id)?.stage_progress()),
    }
}

fn parse_stage(value: &str) -> Result<Stage, CliError> {
    value
        .parse::<Stage>()
        .map_err(|err| CliError::Input(err.to_string()))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, CliError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| CliError::Input(format!("invalid timestamp `{value}`: {err}")))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            Ok(())
        }
        Err(err) => {
            warn!("event=cli_output module=cli status=error error={err}");
            Err(CliError::Setup(format!("cannot encode output: {err}")))
        }
    }
}
