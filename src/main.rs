use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use portfolio_admin::config::Config;
use portfolio_admin::coordinator::{DeleteOutcome, UploadCoordinator};
use portfolio_admin::models::{
    AssetKind, Certificate, Collection, Experience, FileUpload, PersonalData, Project, SocialLink,
    Skill,
};
use portfolio_admin::notify::Notifier;
use portfolio_admin::server;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "portfolio-admin")]
#[command(about = "Manage portfolio records and their uploaded assets")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the asset storage service.
    Serve,
    #[command(flatten)]
    Admin(AdminCommand),
}

/// Commands that talk to the record store and the asset service.
#[derive(Debug, Subcommand)]
enum AdminCommand {
    /// Print every record of a collection as JSON.
    List {
        #[arg(value_name = "COLLECTION", value_parser = parse_collection)]
        collection: Collection,
    },
    /// Replace the profile photo of the personal data record.
    Photo { file: PathBuf },
    /// Upload a CV and link it to the personal data record.
    Cv {
        file: PathBuf,
        /// Stored name without extension; defaults to the current CV name.
        #[arg(long)]
        name: Option<String>,
    },
    /// Upload an image and link it to an existing project.
    ProjectImage { id: u64, file: PathBuf },
    /// Upload an image and link it to an existing certificate.
    CertificateImage { id: u64, file: PathBuf },
    /// Delete a record together with the files it references.
    Delete {
        #[arg(value_name = "COLLECTION", value_parser = parse_collection)]
        collection: Collection,
        id: u64,
    },
}

fn parse_collection(input: &str) -> std::result::Result<Collection, String> {
    input.parse().map_err(|e: portfolio_admin::Error| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portfolio_admin=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    match run(args.command).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(command: Command) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    let command = match command {
        Command::Serve => {
            info!("Starting asset storage service");
            server::start_server(&config).await?;
            return Ok(());
        }
        Command::Admin(command) => command,
    };

    let coordinator =
        UploadCoordinator::from_config(&config).context("Failed to build service clients")?;
    let notifier = Notifier::new(config.notification_dismiss);

    let result = execute(command, &coordinator, &notifier).await;
    if let Some(notification) = notifier.notification() {
        println!("{}", notification.message);
    }
    result
}

async fn execute(
    command: AdminCommand,
    coordinator: &UploadCoordinator,
    notifier: &Notifier,
) -> Result<()> {
    match command {
        AdminCommand::List { collection } => {
            let records = coordinator.records().list_raw(collection).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        AdminCommand::Photo { file } => {
            let record = personal_data(coordinator).await?;
            let upload = FileUpload::from_path(&file).await?;
            let linked = notifier
                .submit_with_progress(
                    "Uploading profile photo...",
                    "Profile photo updated",
                    coordinator.link_asset(AssetKind::Photo, Some(upload), record),
                )
                .await?;
            print_url(linked.asset_url());
        }
        AdminCommand::Cv { file, name } => {
            let record = personal_data(coordinator).await?;
            let upload = with_name(FileUpload::from_path(&file).await?, name);
            let linked = notifier
                .submit_with_progress(
                    "Uploading CV...",
                    "CV updated",
                    coordinator.link_asset(AssetKind::Cv, Some(upload), record),
                )
                .await?;
            print_url(linked.asset_url());
        }
        AdminCommand::ProjectImage { id, file } => {
            let project: Project = coordinator.records().get(id).await?;
            let linked = link_from_path(
                coordinator,
                notifier,
                AssetKind::ProjectImage,
                &file,
                project,
            )
            .await?;
            print_url(linked);
        }
        AdminCommand::CertificateImage { id, file } => {
            let certificate: Certificate = coordinator.records().get(id).await?;
            let linked = link_from_path(
                coordinator,
                notifier,
                AssetKind::CertificateImage,
                &file,
                certificate,
            )
            .await?;
            print_url(linked);
        }
        AdminCommand::Delete { collection, id } => {
            let outcome = delete(coordinator, collection, id).await?;
            notifier.report_delete(&format!("{} {}", collection, id), &outcome);
        }
    }
    Ok(())
}

async fn link_from_path<E: portfolio_admin::models::Record>(
    coordinator: &UploadCoordinator,
    notifier: &Notifier,
    kind: AssetKind,
    path: &Path,
    record: E,
) -> Result<Option<String>> {
    let upload = FileUpload::from_path(path).await?;
    let linked = notifier
        .submit_with_progress(
            &format!("Uploading {}...", kind),
            &format!("{} updated", kind),
            coordinator.link_asset(kind, Some(upload), record),
        )
        .await?;
    Ok(linked.asset_url())
}

async fn delete(
    coordinator: &UploadCoordinator,
    collection: Collection,
    id: u64,
) -> Result<DeleteOutcome> {
    let outcome = match collection {
        Collection::PersonalData => coordinator.delete_by_id::<PersonalData>(id).await?,
        Collection::Projects => coordinator.delete_by_id::<Project>(id).await?,
        Collection::Certificates => coordinator.delete_by_id::<Certificate>(id).await?,
        Collection::Skills => coordinator.delete_by_id::<Skill>(id).await?,
        Collection::SocialLinks => coordinator.delete_by_id::<SocialLink>(id).await?,
        Collection::Experience => coordinator.delete_by_id::<Experience>(id).await?,
    };
    Ok(outcome)
}

/// The portfolio has a single personal data record.
async fn personal_data(coordinator: &UploadCoordinator) -> Result<PersonalData> {
    coordinator
        .list_records::<PersonalData>()
        .await?
        .into_iter()
        .next()
        .context("No personal data record exists yet")
}

fn with_name(upload: FileUpload, name: Option<String>) -> FileUpload {
    match name {
        Some(name) => upload.with_desired_name(name),
        None => upload,
    }
}

fn print_url(url: Option<String>) {
    if let Some(url) = url {
        println!("{}", url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collection_valid() {
        assert_eq!(
            parse_collection("redes-sociales").unwrap(),
            Collection::SocialLinks
        );
    }

    #[test]
    fn test_parse_collection_invalid() {
        let err = parse_collection("usuarios").unwrap_err();
        assert!(err.contains("datos-personales"));
    }

    #[test]
    fn test_cli_parses_cv_name() {
        let args =
            CliArgs::parse_from(["portfolio-admin", "cv", "resume.pdf", "--name", "cv-final"]);
        match args.command {
            Command::Admin(AdminCommand::Cv { file, name }) => {
                assert_eq!(file, PathBuf::from("resume.pdf"));
                assert_eq!(name.as_deref(), Some("cv-final"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
