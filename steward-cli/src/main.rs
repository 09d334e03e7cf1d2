use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use steward_core::DeploymentSpec;
use steward_engine::{Deployment, RolloutPhase};

mod client;

use client::ApiClient;

#[derive(Parser)]
#[command(name = "steward")]
#[command(about = "Operator CLI for the Steward deployment orchestrator")]
#[command(version)]
pub struct Args {
    /// Base URL of the steward-api server (or STEWARD_SERVER)
    #[arg(long)]
    server: Option<String>,

    /// Username reported on applies (or STEWARD_USER, then USER)
    #[arg(long)]
    user: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply a deployment spec from a YAML file
    Apply {
        /// Path to the spec document
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// List all deployments
    List,
    /// Show one deployment
    Get { app: String },
    /// Desired vs observed state for an app
    Status { app: String },
    /// Delete a deployment and its history
    Delete { app: String },
    /// Pause reconciliation for an app
    Pause { app: String },
    /// Resume reconciliation for an app
    Resume { app: String },
    /// Re-apply the previous image
    Rollback { app: String },
    /// Rollout history
    Rollouts { app: Option<String> },
    /// Executor action log
    Actions { app: Option<String> },
}

fn resolve_server(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var("STEWARD_SERVER").ok())
        .unwrap_or_else(|| "http://127.0.0.1:7070".to_string())
}

fn resolve_user(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var("STEWARD_USER").ok())
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn print_deployment(deployment: &Deployment) {
    let paused = if deployment.paused {
        " (paused)".yellow().to_string()
    } else {
        String::new()
    };
    println!(
        "{}{}  image={}  replicas={}  revision={}  applied_by={}",
        deployment.app.bold(),
        paused,
        deployment.image,
        deployment.replicas,
        deployment.revision,
        deployment.applied_by
    );
}

fn phase_marker(phase: &RolloutPhase) -> String {
    match phase {
        RolloutPhase::Completed => "completed".green().to_string(),
        RolloutPhase::RolledBack | RolloutPhase::Failed => format!("{:?}", phase).red().to_string(),
        RolloutPhase::RollingBack => "rolling back".red().to_string(),
        other => format!("{:?}", other).yellow().to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let server = resolve_server(args.server);
    let user = resolve_user(args.user);
    let client = ApiClient::new(&server, &user);

    match args.command {
        Command::Apply { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let spec: DeploymentSpec =
                serde_yaml_ng::from_str(&raw).context("Spec document is not valid YAML")?;

            let deployment = client.apply(&spec).await?;
            println!("{} revision {}", "Applied".green().bold(), deployment.revision);
            print_deployment(&deployment);
        }
        Command::List => {
            let deployments = client.list().await?;
            if deployments.is_empty() {
                println!("No deployments");
            }
            for deployment in deployments {
                print_deployment(&deployment);
            }
        }
        Command::Get { app } => {
            let deployment = client.get(&app).await?;
            print_deployment(&deployment);
        }
        Command::Status { app } => {
            let status = client.status(&app).await?;
            print_deployment(&status.deployment);

            let ready = if status.ready {
                "ready".green().to_string()
            } else {
                "not ready".yellow().to_string()
            };
            println!(
                "  {}  running={}/{} healthy={}",
                ready, status.running, status.deployment.replicas, status.healthy
            );

            if let Some(rollout) = status.rollout {
                println!(
                    "  rollout {} -> {}  [{}]",
                    rollout.from_image,
                    rollout.to_image,
                    phase_marker(&rollout.phase)
                );
            }
        }
        Command::Delete { app } => {
            client.delete(&app).await?;
            println!("{} {}", "Deleted".red().bold(), app);
        }
        Command::Pause { app } => {
            let deployment = client.set_paused(&app, true).await?;
            print_deployment(&deployment);
        }
        Command::Resume { app } => {
            let deployment = client.set_paused(&app, false).await?;
            print_deployment(&deployment);
        }
        Command::Rollback { app } => {
            let deployment = client.rollback(&app).await?;
            println!(
                "{} {} to {}",
                "Rolled back".yellow().bold(),
                app,
                deployment.image
            );
        }
        Command::Rollouts { app } => {
            let rollouts = client.rollouts(app.as_deref()).await?;
            if rollouts.is_empty() {
                println!("No rollouts");
            }
            for rollout in rollouts {
                println!(
                    "{}  {} -> {}  [{}]  started {}",
                    rollout.app.bold(),
                    rollout.from_image,
                    rollout.to_image,
                    phase_marker(&rollout.phase),
                    rollout.started_at
                );
                if let Some(error) = rollout.error {
                    println!("    {}", error.red());
                }
            }
        }
        Command::Actions { app } => {
            let actions = client.actions(app.as_deref()).await?;
            if actions.is_empty() {
                println!("No actions");
            }
            for action in actions {
                let target = action
                    .image
                    .or(action.instance_id)
                    .unwrap_or_default();
                println!(
                    "{}  {:?} {}  [{:?}]  attempts={}",
                    action.app.bold(),
                    action.kind,
                    target,
                    action.status,
                    action.attempts
                );
            }
        }
    }

    Ok(())
}
