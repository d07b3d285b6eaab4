pub mod demo;
pub mod output;

use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::{generate_jwt, Claims};
use crate::config;
use crate::database::DatabaseManager;
use crate::hierarchy::{AncestorChainResolver, Level, LicenseKind};
use crate::store::{HierarchyStore, LicenseGrant, PgStore};

#[derive(Parser)]
#[command(name = "forge")]
#[command(about = "Forge CLI - operator tooling for the entity hierarchy")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Apply pending database migrations")]
    Migrate,

    #[command(about = "Resolve the ancestor chain of a node")]
    Chain {
        #[arg(long, help = "Level of the node (1-7)")]
        level: i64,
        #[arg(long, help = "Entity or division id")]
        id: i64,
    },

    #[command(about = "List licence allotments of an entity")]
    Licences {
        #[arg(long)]
        entity: i64,
    },

    #[command(about = "Grant licences to an entity")]
    Grant {
        #[arg(long)]
        entity: i64,
        #[arg(long, help = "seat, document_credit or certification_credit")]
        kind: LicenseKind,
        #[arg(long)]
        quantity: i64,
    },

    #[command(about = "Mint a JWT for testing")]
    Token {
        #[arg(long)]
        user_id: i64,
        #[arg(long)]
        user_type: i32,
        #[arg(long, default_value = "operator@localhost")]
        email: String,
    },

    #[command(about = "Build a sample hierarchy in memory and walk it")]
    Demo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Migrate => {
            let store = connect().await?;
            store.migrate().await?;
            output::output_success(&output_format, "Migrations applied", None)
        }
        Commands::Chain { level, id } => {
            let store: Arc<dyn HierarchyStore> = Arc::new(connect().await?);
            let chain = AncestorChainResolver::new(store).resolve(id, Level::new(level)?).await?;
            output::output_chain(&output_format, &chain)
        }
        Commands::Licences { entity } => {
            let store = connect().await?;
            let allotments = store.allotments(entity).await?;
            output::output_allotments(&output_format, entity, &allotments)
        }
        Commands::Grant { entity, kind, quantity } => {
            if quantity <= 0 {
                anyhow::bail!("quantity must be positive");
            }
            let store = connect().await?;
            if store.entity(entity).await?.is_none() {
                anyhow::bail!("entity {} not found", entity);
            }
            let validity = config::config().provisioning.licence_validity_days;
            let allotment = store
                .grant_licences(LicenseGrant {
                    entity_id: entity,
                    kind,
                    quantity,
                    valid_till: Some(Utc::now() + Duration::days(validity)),
                })
                .await?;
            output::output_success(
                &output_format,
                &format!("Granted {} {} to entity {}", quantity, kind, entity),
                Some(json!({ "allotment": allotment })),
            )
        }
        Commands::Token { user_id, user_type, email } => {
            let token = generate_jwt(&Claims::new(user_id, email, user_type))?;
            match output_format {
                OutputFormat::Json => output::output_success(&output_format, "Token issued", Some(json!({ "token": token }))),
                OutputFormat::Text => {
                    println!("{}", token);
                    Ok(())
                }
            }
        }
        Commands::Demo => demo::run(&output_format).await,
    }
}

async fn connect() -> anyhow::Result<PgStore> {
    Ok(PgStore::new(DatabaseManager::pool().await?))
}
