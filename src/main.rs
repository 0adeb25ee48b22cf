//! CLI entry point for the forms client.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use forms_client::{
    ConnectionConfig, FilterOperator, FilterSet, FormsClient, Relation, ResultEnvelope,
};
use tracing::{debug, info};

mod app_config;
mod cli;

use app_config::{FileConfig, load_file_config};
use cli::{Args, Command, ConnectionArgs, ServerCommand};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(command = ?args.command, "CLI arguments parsed");

    let command = match args.command {
        Command::SessionKey => {
            println!("{}", FormsClient::generate_session_key());
            return Ok(());
        }
        Command::Server(command) => command,
    };

    let file_config = load_file_config(args.connection.config.as_deref())?;
    let config = connection_config(&args.connection, file_config)?;
    info!(host = config.base_host(), context = config.context(), "connecting");
    let client = FormsClient::new(config)?;

    run(&client, command).await
}

/// Merges flags over file values into a connection configuration.
fn connection_config(args: &ConnectionArgs, file: FileConfig) -> Result<ConnectionConfig> {
    let host = args.host.clone().or(file.host).unwrap_or_default();
    let username = args.username.clone().or(file.username).unwrap_or_default();
    let password = args.password.clone().unwrap_or_default();

    let mut config = ConnectionConfig::new(&host, &username, &password)?;
    if let Some(context) = args.context.clone().or(file.context) {
        config = config.with_context(&context);
    }
    if args.ignore_ssl || file.ignore_ssl.unwrap_or(false) {
        let protocol = args.protocol.clone().or(file.protocol).unwrap_or_default();
        config = config.with_relaxed_tls(&protocol);
    }
    if let Some(token) = args.session_token.clone().or(file.session_token) {
        config = config.with_session_token(&token);
    }
    if let Some(secs) = file.connect_timeout_secs {
        config = config.with_connect_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = file.request_timeout_secs {
        config = config.with_request_timeout(Duration::from_secs(secs));
    }
    Ok(config)
}

/// Parses repeated `field:operator:value` flags.
fn filter_set(
    filters: &[String],
    any: bool,
    sort_by: Option<String>,
    order: Option<cli::OrderArg>,
    page_size: Option<u32>,
) -> Result<Option<FilterSet>> {
    if filters.is_empty() && sort_by.is_none() && order.is_none() && page_size.is_none() {
        return Ok(None);
    }

    let mut set = FilterSet::new();
    for raw in filters {
        let mut parts = raw.splitn(3, ':');
        let (Some(field), Some(operator), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            bail!("Invalid filter '{raw}': expected field:operator:value");
        };
        let operator: FilterOperator = operator
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
            .with_context(|| format!("Invalid filter '{raw}'"))?;
        set.add_filter(field, operator, value)?;
    }
    if any {
        set.set_relation(Relation::AtLeastOneMatches);
    } else if filters.len() > 1 {
        set.set_relation(Relation::AllMatch);
    }
    if let Some(sort_by) = sort_by {
        set.set_sort_by(sort_by);
    }
    if let Some(order) = order {
        set.set_order(order.into());
    }
    if let Some(page_size) = page_size {
        set.set_page_size(page_size);
    }
    Ok(Some(set))
}

/// Prints the envelope as JSON and fails on a non-success status.
fn report(envelope: &ResultEnvelope) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    if !envelope.is_successful() {
        bail!(
            "Server answered HTTP {} ({})",
            envelope.http_status,
            envelope.status_text
        );
    }
    Ok(())
}

async fn run(client: &FormsClient, command: ServerCommand) -> Result<()> {
    match command {
        ServerCommand::List {
            app,
            form,
            filters,
            any,
            sort_by,
            order,
            page_size,
            format,
            output,
        } => {
            let set = filter_set(&filters, any, sort_by, order, page_size)?;
            let envelope = client
                .list_records(&app, &form, set.as_ref(), format)
                .await?;
            match (output, envelope.raw()) {
                (Some(path), Some(bytes)) => {
                    tokio::fs::write(&path, bytes)
                        .await
                        .with_context(|| format!("Failed to write '{}'", path.display()))?;
                    info!(path = %path.display(), bytes = bytes.len(), "listing written");
                    Ok(())
                }
                _ => report(&envelope),
            }
        }
        ServerCommand::Get {
            app,
            form,
            record,
            format,
        } => report(&client.retrieve_record(&app, &form, &record, format).await?),
        ServerCommand::Delete { app, form, record } => {
            report(&client.delete_record(&app, &form, &record).await?)
        }
        ServerCommand::DeleteAll {
            app,
            form,
            filters,
            page_size,
        } => {
            let set = filter_set(&filters, false, None, None, page_size)?;
            let deleted = client.delete_records(&app, &form, set.as_ref()).await?;
            println!("{deleted}");
            info!(
                deleted = deleted.deleted_count(),
                failed = deleted.failed_count(),
                "delete-all finished"
            );
            Ok(())
        }
        ServerCommand::Export { app, dir, data } => {
            report(&client.export_application_to_path(&app, &dir, data).await?)
        }
        ServerCommand::Import {
            archive,
            deploy,
            data,
            clean_ids,
            tags,
        } => report(
            &client
                .import_application(&archive, deploy, data, clean_ids, tags.as_deref())
                .await?,
        ),
        ServerCommand::Upgrade { app, archive, data } => {
            report(&client.upgrade_application(&archive, data, &app).await?)
        }
        ServerCommand::Start { app } => report(&client.start_application(&app).await?),
        ServerCommand::Stop { app } => report(&client.stop_application(&app).await?),
        ServerCommand::Apps {
            all,
            page,
            page_size,
            sort_by,
            order,
        } => {
            let order = order.map(Into::into);
            let envelope = if all {
                client
                    .admin_list_apps(page, page_size, sort_by.as_deref(), order)
                    .await?
            } else {
                client
                    .list_apps_for_user(page, page_size, sort_by.as_deref(), order)
                    .await?
            };
            report(&envelope)
        }
    }
}
