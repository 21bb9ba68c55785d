//! `incito` command line entry point.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use incito_desktop::commands;
use incito_desktop::models::prompt::PromptDocument;
use incito_desktop::models::run::ComparisonEvent;
use incito_desktop::services::run_mode::RunModePhase;
use incito_desktop::{AppState, CommandResponse};
use incito_graders::{Grader, GradingSummary};
use incito_prompt::{missing_required, Variable, VariableValue};

#[derive(Parser)]
#[command(name = "incito")]
#[command(about = "Prompt workbench: render, run and grade prompt templates", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show database, config and sidecar health
    Status,

    /// Find the Claude Code executable, or check a specific one
    LocateClaude {
        #[arg(long)]
        path: Option<String>,
    },

    /// Start the sidecar server if it is not serving
    Sidecar,

    /// Render a prompt document with variable values
    Render {
        /// Prompt document (JSON)
        prompt: PathBuf,

        /// Variable assignment, `key=value`; lists are comma separated
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Run a prompt document on every configured provider and grade the outputs
    Run {
        /// Prompt document (JSON); saved to the library before running
        prompt: PathBuf,

        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Fill a prompt document's variables in a guided conversation, then run it
    Guide {
        /// Prompt document (JSON); saved to the library before running
        prompt: PathBuf,

        /// Extra instructions for the guide
        #[arg(long)]
        instructions: Option<String>,
    },

    /// Grade an output with a list of graders
    Grade {
        /// Input the output was produced from
        #[arg(long)]
        input: String,

        /// File holding the output to grade
        #[arg(long)]
        output_file: PathBuf,

        /// JSON file with an array of graders
        #[arg(long)]
        graders: PathBuf,

        /// Persist results for this run
        #[arg(long)]
        run_id: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Status => {
            let state = initialized_state().await?;
            print_json(&response_data(commands::get_health(&state).await)?)
        }
        Commands::LocateClaude { path } => {
            print_json(&response_data(commands::locate_claude(path.as_deref()).await)?)
        }
        Commands::Sidecar => {
            let state = initialized_state().await?;
            let running = response_data(commands::ensure_sidecar(&state).await)?;
            if !running {
                bail!("sidecar did not become healthy");
            }
            println!("sidecar is running");
            Ok(())
        }
        Commands::Render { prompt, set } => {
            let prompt = load_prompt(&prompt)?;
            let values = parse_values(&prompt.variables, &set)?;
            let missing = missing_required(&prompt.variables, &values);
            if !missing.is_empty() {
                tracing::warn!("missing required fields: {}", missing.join(", "));
            }
            println!("{}", prompt.render(&values));
            Ok(())
        }
        Commands::Run { prompt, set } => {
            let state = initialized_state().await?;
            let prompt = response_data(commands::save_prompt(&state, load_prompt(&prompt)?).await)?;
            let values = parse_values(&prompt.variables, &set)?;

            if !response_data(commands::ensure_sidecar(&state).await)? {
                bail!("sidecar did not become healthy");
            }

            let token = CancellationToken::new();
            {
                let token = token.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        token.cancel();
                    }
                });
            }

            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            let printer = tokio::spawn(async move {
                let mut events = UnboundedReceiverStream::new(rx);
                while let Some(event) = events.next().await {
                    if let ComparisonEvent::Finished {
                        provider_id,
                        status,
                    } = event
                    {
                        eprintln!("[{}] {}", provider_id, status.as_str());
                    }
                }
            });

            let executed = commands::execute_run(&state, &prompt.id, values, &token, Some(&tx)).await;
            drop(tx);
            let _ = printer.await;
            print_json(&response_data(executed)?)
        }
        Commands::Guide {
            prompt,
            instructions,
        } => {
            let state = initialized_state().await?;
            let prompt = response_data(commands::save_prompt(&state, load_prompt(&prompt)?).await)?;
            if !response_data(commands::ensure_sidecar(&state).await)? {
                bail!("sidecar did not become healthy");
            }

            let controller = state.run_mode_controller(None).await?;
            let outcome = controller.start_run_mode(prompt, instructions).await?;
            print_turn(&outcome.text);

            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while controller.phase().await != RunModePhase::Finished {
                eprint!("> ");
                let Some(line) = lines.next_line().await? else {
                    bail!("input closed before every field was filled");
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let outcome = controller.send_user_message(line).await?;
                print_turn(&outcome.text);
            }

            let executed =
                commands::execute_run_mode(&state, &controller, &CancellationToken::new(), None)
                    .await;
            print_json(&response_data(executed)?)
        }
        Commands::Grade {
            input,
            output_file,
            graders,
            run_id,
        } => {
            let output = std::fs::read_to_string(&output_file)
                .with_context(|| format!("reading {}", output_file.display()))?;
            let graders: Vec<Grader> = serde_json::from_str(
                &std::fs::read_to_string(&graders)
                    .with_context(|| format!("reading {}", graders.display()))?,
            )
            .context("parsing graders")?;

            let state = initialized_state().await?;
            let results = response_data(
                commands::run_graders(&state, graders, &input, &output, run_id.as_deref()).await,
            )?;
            let summary = GradingSummary::from_results(&results);
            print_json(&serde_json::json!({ "results": results, "summary": summary }))
        }
    }
}

async fn initialized_state() -> Result<AppState> {
    let state = AppState::new();
    state.initialize().await?;
    Ok(state)
}

fn response_data<T>(response: CommandResponse<T>) -> Result<T> {
    match response.data {
        Some(data) if response.success => Ok(data),
        _ => Err(anyhow!(response
            .error
            .unwrap_or_else(|| "unknown error".to_string()))),
    }
}

fn print_turn(text: &str) {
    if !text.trim().is_empty() {
        println!("{}", text.trim());
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_prompt(path: &Path) -> Result<PromptDocument> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut prompt: PromptDocument =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    prompt.set_template(prompt.template.clone());
    Ok(prompt)
}

fn parse_values(
    variables: &[Variable],
    assignments: &[String],
) -> Result<HashMap<String, VariableValue>> {
    assignments
        .iter()
        .map(|assignment| {
            let (key, raw) = assignment
                .split_once('=')
                .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{}'", assignment))?;
            let key = key.trim();
            let variable = variables.iter().find(|v| v.key == key);
            Ok((key.to_string(), coerce_value(variable, raw)))
        })
        .collect()
}

fn coerce_value(variable: Option<&Variable>, raw: &str) -> VariableValue {
    let value = VariableValue::from(raw);
    match variable {
        Some(variable) => variable.coerce(value),
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use incito_prompt::VariableType;

    #[test]
    fn test_parse_values_coerces_by_type() {
        let variables = vec![
            Variable::new("tags", VariableType::Array),
            Variable::new("count", VariableType::Number),
            Variable::text("title"),
        ];
        let values = parse_values(
            &variables,
            &[
                "tags=a, b,,c".to_string(),
                "count=3".to_string(),
                "title=x=y".to_string(),
                "extra=1".to_string(),
            ],
        )
        .unwrap();

        assert_eq!(values["tags"], VariableValue::from(vec!["a", "b", "c"]));
        assert_eq!(values["count"], VariableValue::Number(3.0));
        assert_eq!(values["title"], VariableValue::from("x=y"));
        assert_eq!(values["extra"], VariableValue::from("1"));
    }

    #[test]
    fn test_parse_values_rejects_missing_equals() {
        assert!(parse_values(&[], &["oops".to_string()]).is_err());
    }

    #[test]
    fn test_response_data() {
        assert_eq!(response_data(CommandResponse::ok(5)).unwrap(), 5);
        let err = response_data::<u8>(CommandResponse::err("boom")).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
