//! Command-line interface for docflow.
//!
//! Provides commands for processing a document, inspecting finished
//! jobs from the audit trail, and showing the plan and configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::{self, ResolvedConfig, ToolBackend};
use crate::core::{AuditRecord, AuditStore, JobRequest, JobResult, Orchestrator};
use crate::domain::{InputDescriptor, Plan, ToolName};

/// docflow - Retrying document-processing pipeline orchestrator
#[derive(Parser, Debug)]
#[command(name = "docflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a document through the plan
    Run {
        /// Document to process
        file: PathBuf,

        /// Entity the output is attributed to (generated if omitted)
        #[arg(long)]
        entity_id: Option<String>,

        /// MIME type (guessed from the extension if omitted)
        #[arg(long)]
        content_type: Option<String>,

        /// Override the configured retry budget
        #[arg(long, env = "DOCFLOW_MAX_RETRIES")]
        max_retries: Option<u32>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a finished job from the audit trail
    Status {
        /// Job ID (UUID)
        job_id: String,
    },

    /// List recent jobs
    Jobs {
        /// Maximum number of jobs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show the default plan, or validate a plan file
    Plan {
        /// Plan definition (YAML)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                file,
                entity_id,
                content_type,
                max_retries,
                json,
            } => run_document(&file, entity_id, content_type, max_retries, json).await,
            Commands::Status { job_id } => show_status(&job_id).await,
            Commands::Jobs { limit } => list_jobs(limit).await,
            Commands::Plan { file } => show_plan(file.as_deref()),
            Commands::Config => show_config(),
        }
    }
}

/// Process one document and print the outcome
async fn run_document(
    path: &Path,
    entity_id: Option<String>,
    content_type: Option<String>,
    max_retries: Option<u32>,
    json: bool,
) -> Result<()> {
    let config = config::load_config()?;

    let payload = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Input path has no file name: {}", path.display()))?;

    let mut input = InputDescriptor::new(filename);
    if let Some(ct) = content_type.or_else(|| guess_content_type(path).map(str::to_string)) {
        input = input.with_content_type(ct);
    }

    let mut request = JobRequest::new(payload, input);
    if let Some(entity_id) = entity_id {
        request = request.with_entity_id(entity_id);
    }

    let mut orchestrator = Orchestrator::from_config(&config);
    if let Some(max_retries) = max_retries {
        orchestrator = orchestrator.with_max_retries(max_retries);
    }

    let result = orchestrator.process_document(request).await?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&result).context("Failed to serialize job result")?;
        println!("{}", rendered);
    } else {
        print_result(&result);
    }

    if !result.is_success() {
        std::process::exit(1);
    }

    Ok(())
}

fn print_result(result: &JobResult) {
    let obs = &result.observability;

    println!("Job ID:      {}", result.job_id);
    println!("Entity:      {}", result.entity_id);
    println!("File:        {} ({})", result.filename, result.file_id);
    println!("Status:      {}", result.status.as_str());
    println!("Duration:    {:.2}s", result.execution_time_seconds);
    println!("Retries:     {}/{}", obs.retry_count, obs.max_retries);
    println!("Outputs:     {}", result.outputs.summarize());

    if let Some(classification) = &result.outputs.classification {
        println!(
            "Sector:      {} ({:.0}%)",
            classification.sector,
            classification.confidence * 100.0
        );
    }
    if let Some(error) = &result.error {
        println!("Error:       {}", error);
    }

    println!("\nSteps:");
    for record in &obs.tool_invocations {
        let mark = if record.success { "ok" } else { "FAILED" };
        println!(
            "  [pass {}] {:>2} {:<14} {:<6} {}ms {}",
            record.pass,
            record.step_index,
            record.step_name,
            mark,
            record.duration_ms,
            record.error.as_deref().unwrap_or(&record.output_summary)
        );
    }

    if !obs.recovery_actions.is_empty() {
        println!("\nRecovery actions:");
        for action in &obs.recovery_actions {
            println!("  - {}", action);
        }
    }
    if !obs.validation_errors.is_empty() {
        println!("\nValidation errors:");
        for error in &obs.validation_errors {
            println!("  - {}", error);
        }
    }
}

/// MIME type for common document extensions
fn guess_content_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "csv" => "text/csv",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => return None,
    };
    Some(mime)
}

fn audit_store(config: &ResolvedConfig) -> AuditStore {
    AuditStore::new(config.audit_path())
}

/// Show a job's audit record
async fn show_status(job_id_str: &str) -> Result<()> {
    let job_id =
        Uuid::parse_str(job_id_str).with_context(|| format!("Invalid job ID: {}", job_id_str))?;

    let config = config::load_config()?;
    let record = audit_store(&config)
        .find(job_id)
        .await?
        .with_context(|| format!("Job {} not found in audit trail", job_id))?;

    print_record(&record);
    Ok(())
}

fn print_record(record: &AuditRecord) {
    let obs = &record.observability;

    println!("Job ID:    {}", record.job_id);
    println!("Entity:    {}", record.entity_id);
    println!("File:      {} ({})", record.filename, record.file_id);
    println!("Status:    {}", record.status.as_str());
    println!("Started:   {}", record.started_at);
    println!("Ended:     {}", record.ended_at);
    println!("Duration:  {:.2}s", record.execution_time_seconds);
    println!("Retries:   {}/{}", obs.retry_count, obs.max_retries);
    if let Some(error) = &record.error {
        println!("Error:     {}", error);
    }

    println!("\nExecution log:");
    for entry in &obs.execution_log {
        println!(
            "  {} [{}] retry={} {}",
            entry.timestamp.format("%H:%M:%S%.3f"),
            entry.phase,
            entry.retry_count,
            entry.result
        );
    }
}

/// List recent jobs from the audit trail
async fn list_jobs(limit: usize) -> Result<()> {
    let config = config::load_config()?;
    let records = audit_store(&config).list(limit).await?;

    if records.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    println!(
        "{:<38} {:<18} {:<10} {:<8} {}",
        "JOB ID", "ENTITY", "STATUS", "RETRIES", "FILE"
    );
    println!("{}", "-".repeat(100));

    for record in records {
        println!(
            "{:<38} {:<18} {:<10} {:<8} {}",
            record.job_id,
            record.entity_id,
            record.status.as_str(),
            record.observability.retry_count,
            record.filename
        );
    }

    Ok(())
}

/// Print the default plan or a validated plan file
fn show_plan(file: Option<&Path>) -> Result<()> {
    let plan = match file {
        Some(path) => {
            let plan = Plan::from_file(path)?;
            plan.validate()
                .with_context(|| format!("Invalid plan: {}", path.display()))?;
            plan
        }
        None => Plan::document(),
    };

    println!("Plan: {}", plan.name);
    if !plan.description.is_empty() {
        println!("{}", plan.description);
    }
    println!();

    for (index, step) in plan.steps().iter().enumerate() {
        let produces: Vec<&str> = step.tool.produces().iter().map(|s| s.as_str()).collect();
        println!(
            "  {:>2}. {:<14} {:<20} -> {}",
            index,
            step.name,
            step.tool.as_str(),
            produces.join(", ")
        );
    }

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::load_config()?;

    println!("docflow configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:        {}", cfg.home.display());
    println!("  Files:       {}", cfg.files_dir().display());
    println!("  Audit trail: {}", cfg.audit_path().display());
    println!();
    println!("Max retries: {}", cfg.max_retries);
    println!();
    println!("Tools:");
    for tool in ToolName::ALL {
        let backend = match cfg.tools.get(&tool) {
            Some(ToolBackend::Command { command, .. }) => format!("command: {}", command.join(" ")),
            Some(ToolBackend::Http { url, .. }) => format!("http: {}", url),
            None => "(not configured)".to_string(),
        };
        println!("  {:<20} {}", tool.as_str(), backend);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "docflow",
            "run",
            "report.pdf",
            "--entity-id",
            "entity_1",
            "--max-retries",
            "5",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                file,
                entity_id,
                max_retries,
                json,
                ..
            } => {
                assert_eq!(file, PathBuf::from("report.pdf"));
                assert_eq!(entity_id.as_deref(), Some("entity_1"));
                assert_eq!(max_retries, Some(5));
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_jobs_default_limit() {
        let cli = Cli::try_parse_from(["docflow", "jobs"]).unwrap();
        assert!(matches!(cli.command, Commands::Jobs { limit: 10 }));
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(
            guess_content_type(Path::new("a/Report.PDF")),
            Some("application/pdf")
        );
        assert_eq!(guess_content_type(Path::new("notes.txt")), Some("text/plain"));
        assert_eq!(guess_content_type(Path::new("archive.xyz")), None);
        assert_eq!(guess_content_type(Path::new("README")), None);
    }
}
