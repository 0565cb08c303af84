// SPDX-License-Identifier: MIT

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use reqflow::adk::error::WorkflowError;
use reqflow::adk::generator::TextGenerator;
use reqflow::reqflow::config::{ReqflowConfig, DEFAULT_CONFIG_FILE};
use reqflow::reqflow::tickets::{build_ticket_graph, ExportOutcome, FileExporter, TicketState};
use reqflow::reqflow::workflow::{Executor, RunSnapshot, RunStatus};

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Turn a requirement into reviewed Azure DevOps work items
    Run {
        /// The requirement text
        #[arg(
            short,
            long,
            required_unless_present = "input_file",
            conflicts_with = "input_file"
        )]
        input: Option<String>,

        /// Read the requirement from a file
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Path to the configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Run id (overrides `thread_id` from the config)
        #[arg(short, long)]
        thread_id: Option<String>,
    },
    /// Send a single prompt through a configured collaborator
    Prompt {
        /// Which collaborator to use
        #[arg(short, long, value_enum, default_value_t = Role::Analyst)]
        role: Role,

        /// The prompt to send
        #[arg(short, long)]
        prompt: String,

        /// Path to the configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Role {
    Analyst,
    Drafter,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Run {
            input,
            input_file,
            config,
            thread_id,
        } => {
            let requirement = match (input, input_file) {
                (Some(text), _) => text,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("reading requirement from {}", path.display()))?,
                (None, None) => bail!("either --input or --input-file is required"),
            };
            let config = ReqflowConfig::load_or_default(&config)?;
            run_ticket_session(requirement, config, thread_id).await?;
        }
        Commands::Prompt {
            role,
            prompt,
            config,
        } => {
            let config = ReqflowConfig::load_or_default(&config)?;
            let (name, def) = match role {
                Role::Analyst => ("analyst", &config.analyst),
                Role::Drafter => ("drafter", &config.drafter),
            };
            let generator = def.build_generator(name)?;

            println!("Sending prompt: {}", prompt);
            let response = generator.generate(&prompt).await?;
            println!("Response: {}", response);
        }
    }

    Ok(())
}

async fn run_ticket_session(
    requirement: String,
    config: ReqflowConfig,
    thread_id: Option<String>,
) -> Result<()> {
    let analyst: Arc<dyn TextGenerator> = Arc::new(config.analyst.build_generator("analyst")?);
    let drafter: Arc<dyn TextGenerator> = Arc::new(config.drafter.build_generator("drafter")?);
    let exporter = Arc::new(FileExporter::new(config.export.clone()));

    let graph = build_ticket_graph(analyst, drafter, exporter)?;
    let executor = Executor::in_memory(graph);

    let run_id = thread_id
        .or(config.thread_id)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    println!("INPUT: {}", requirement);
    log::info!("Session {} started", run_id);

    let mut outcome = executor.start(&run_id, TicketState::new(requirement)).await;
    loop {
        let snapshot = match outcome {
            Ok(snapshot) => snapshot,
            Err(WorkflowError::StepFailed { step, source, .. }) => {
                eprintln!("\nStep '{}' failed: {}", step, source);
                if read_reply("Retry? [y/N]: ")?.eq_ignore_ascii_case("y") {
                    outcome = executor.retry(&run_id).await;
                    continue;
                }
                executor.abandon(&run_id).await?;
                bail!("run {} abandoned after step '{}' failed", run_id, step);
            }
            Err(err) => return Err(err.into()),
        };

        match snapshot.status {
            RunStatus::Paused => {
                if let Some(message) = snapshot
                    .interrupt
                    .as_ref()
                    .and_then(|i| i.value["message"].as_str())
                {
                    println!("\n{}", message);
                }
                let reply = read_reply("\n[Manager] Your decision (approve / [feedback]): ")?;
                outcome = executor.resume(&run_id, reply).await;
            }
            RunStatus::Terminated => {
                report_export(&snapshot);
                return Ok(());
            }
            status => bail!("run {} stopped in unexpected status '{}'", run_id, status),
        }
    }
}

fn report_export(snapshot: &RunSnapshot<TicketState>) {
    match &snapshot.state.export {
        Some(ExportOutcome::Exported {
            records,
            json_path,
            csv_path,
        }) => {
            println!("\nSaved {} work items to {}", records, json_path.display());
            println!("\nImport instructions:");
            println!("   1. Go to Azure DevOps > Boards > Work Items");
            println!("   2. Click 'Import Work Items' or use the Excel plugin");
            println!("   3. Upload the file: {}", csv_path.display());
            println!("   4. Map the columns if prompted");
            println!("   5. Complete the import");
        }
        Some(ExportOutcome::ParseFailure { raw_path, reason }) => {
            println!("\nThe draft could not be parsed as work items: {}", reason);
            println!("Saved raw output to: {}", raw_path.display());
        }
        None => println!("\nRun finished without an export"),
    }
}

/// One line from stdin, without its line terminator
fn read_reply(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        bail!("stdin closed while waiting for a reply");
    }
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(line)
}
