// catalog.rs — Catalog subcommands: check, show.

use std::process::ExitCode;

use clap::Subcommand;

use crate::Context;

#[derive(Subcommand)]
pub enum CatalogCommands {
    /// Validate the configured catalog (or a given file).
    Check {
        /// Catalog file to check instead of the configured one.
        path: Option<std::path::PathBuf>,
    },
    /// Print every domain and its invariants.
    Show {
        /// Print as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

pub fn execute(cmd: &CatalogCommands, ctx: &Context) -> anyhow::Result<ExitCode> {
    match cmd {
        CatalogCommands::Check { path } => {
            let catalog = match path {
                Some(path) => svp_policy::InvariantCatalog::load(path)?,
                None => ctx.config.load_catalog(&ctx.project_root)?,
            };
            let concepts: usize = catalog.iter().map(|s| s.forbidden_concepts().len()).sum();
            println!(
                "Catalog valid: {} domain(s), {} forbidden concept(s).",
                catalog.len(),
                concepts
            );
        }

        CatalogCommands::Show { json } => {
            let catalog = ctx.config.load_catalog(&ctx.project_root)?;

            if *json {
                let domains: Vec<_> = catalog
                    .iter()
                    .map(|set| {
                        serde_json::json!({
                            "domain": set.domain(),
                            "max_transaction": set.max_transaction(),
                            "forbidden_commands": set.forbidden_commands(),
                            "forbidden_concepts": set.forbidden_concepts(),
                            "similarity_threshold": set.similarity_threshold(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&domains)?);
                return Ok(ExitCode::SUCCESS);
            }

            println!(
                "{:<16} {:>16} {:>9} {:>9} THRESHOLD",
                "DOMAIN", "MAX_TRANSACTION", "COMMANDS", "CONCEPTS"
            );
            println!("{}", "-".repeat(64));

            for set in catalog.iter() {
                let limit = set
                    .max_transaction()
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<16} {:>16} {:>9} {:>9} {:.2}",
                    set.domain(),
                    limit,
                    set.forbidden_commands().len(),
                    set.forbidden_concepts().len(),
                    set.similarity_threshold(),
                );
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
