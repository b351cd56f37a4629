use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    DiscardConfirmation, FileCredentialStore, HttpGateway, SaveOutcome, SelectOutcome,
    SessionController, SessionEvent, TestOutcome, TextBuffer,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod config;

/// Used when `RUST_LOG` is unset or invalid.
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Parser, Debug)]
#[command(name = "studio", about = "Browse, edit and test prompt templates")]
struct Cli {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify the API key against the server and remember it.
    Login,
    Logout,
    Health,
    List {
        #[arg(long)]
        filter: Option<String>,
    },
    Show {
        category: String,
        template: String,
    },
    /// Render the template locally without contacting the test endpoint.
    Preview {
        category: String,
        template: String,
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },
    Test {
        category: String,
        template: String,
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },
    Backup {
        category: String,
    },
    /// Replace the category document with the contents of FILE and save it.
    Edit {
        category: String,
        template: String,
        #[arg(long)]
        file: PathBuf,
    },
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = config::load_settings()?;
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    if let Some(api_key) = cli.api_key {
        settings.api_key = Some(api_key);
    }
    let server_url = config::validate_server_url(&settings.server_url)?;

    let gateway = Arc::new(HttpGateway::with_timeout(
        server_url.as_str(),
        settings.request_timeout(),
    )?);

    if let Command::Health = cli.command {
        let health = gateway.health().await?;
        println!(
            "{} {} v{}: {} categories ({})",
            health.service,
            health.status,
            health.version,
            health.categories_count,
            health.available_categories.join(", ")
        );
        return Ok(());
    }

    let credential_path = settings
        .credential_path
        .clone()
        .context("no config directory available; set APP__CREDENTIAL_PATH")?;
    let controller = SessionController::new_with_dependencies(
        gateway,
        Arc::new(FileCredentialStore::new(credential_path)),
        Arc::new(TextBuffer::new()),
    );
    tokio::spawn(log_events(controller.subscribe_events()));

    match cli.command {
        Command::Health => {}
        Command::Login => {
            let Some(api_key) = settings.api_key.as_deref() else {
                bail!("login needs --api-key or PROMPT_STUDIO_API_KEY");
            };
            controller.connect(api_key).await?;
            let snapshot = controller.snapshot().await;
            println!(
                "logged in: {} categories, {} templates",
                snapshot.total_categories, snapshot.total_templates
            );
        }
        Command::Logout => {
            controller.disconnect().await?;
            println!("logged out");
        }
        Command::List { filter } => {
            connect(&controller, settings.api_key.as_deref()).await?;
            let view = controller
                .catalog_view(filter.as_deref().unwrap_or_default())
                .await;
            for category in view.visible_categories() {
                println!(
                    "{} v{} ({} templates) {}",
                    category.name, category.version, category.template_count, category.description
                );
                for template in category.templates.iter().filter(|t| t.visible) {
                    println!("  {}", template.name);
                }
            }
        }
        Command::Show { category, template } => {
            connect(&controller, settings.api_key.as_deref()).await?;
            select(&controller, &category, &template).await?;
            println!("{}", controller.snapshot().await.document_text);
        }
        Command::Preview {
            category,
            template,
            vars,
        } => {
            connect(&controller, settings.api_key.as_deref()).await?;
            select(&controller, &category, &template).await?;
            for (name, value) in &vars {
                controller.set_preview_value(name, value).await;
            }
            let preview = controller
                .snapshot()
                .await
                .preview
                .context("no preview available")?;
            if !preview.undeclared.is_empty() {
                warn!(
                    undeclared = %preview.undeclared.join(", "),
                    "placeholders not listed in the template's variables"
                );
            }
            println!("{}", preview.rendered);
        }
        Command::Test {
            category,
            template,
            vars,
        } => {
            connect(&controller, settings.api_key.as_deref()).await?;
            select(&controller, &category, &template).await?;
            match controller.test(vars).await? {
                TestOutcome::Rendered {
                    text,
                    missing_variables,
                } => {
                    println!("{text}");
                    if !missing_variables.is_empty() {
                        eprintln!("missing variables: {}", missing_variables.join(", "));
                    }
                }
                TestOutcome::Failed { message } => bail!("test failed: {message}"),
            }
        }
        Command::Backup { category } => {
            connect(&controller, settings.api_key.as_deref()).await?;
            let template = controller
                .catalog()
                .await
                .entry(&category)
                .and_then(|entry| entry.template_names.first().cloned())
                .with_context(|| format!("category '{category}' has no templates"))?;
            select(&controller, &category, &template).await?;
            println!("{}", controller.backup().await?);
        }
        Command::Edit {
            category,
            template,
            file,
        } => {
            connect(&controller, settings.api_key.as_deref()).await?;
            select(&controller, &category, &template).await?;
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read '{}'", file.display()))?;
            controller.on_editor_content_changed(&text).await;
            if !controller.snapshot().await.dirty {
                println!("no changes");
                return Ok(());
            }
            match controller.save().await? {
                SaveOutcome::Saved { message } => println!("{message}"),
                SaveOutcome::Skipped => bail!("nothing selected to save"),
            }
        }
    }

    Ok(())
}

/// Uses the key given on the command line or in the environment, falling
/// back to the one saved by `login`.
async fn connect(controller: &SessionController, api_key: Option<&str>) -> Result<()> {
    match api_key {
        Some(api_key) => controller.connect(api_key).await?,
        None => {
            if !controller.connect_stored().await? {
                bail!("not logged in; run `studio --api-key KEY login`");
            }
        }
    }
    Ok(())
}

async fn select(controller: &SessionController, category: &str, template: &str) -> Result<()> {
    match controller
        .select_template(category, template, DiscardConfirmation::NotGiven)
        .await?
    {
        SelectOutcome::Applied => Ok(()),
        outcome => bail!("could not open {category}/{template}: {outcome:?}"),
    }
}

async fn log_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Error(message)) => warn!(%message, "session error"),
            Ok(event) => debug!(?event, "session event"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
