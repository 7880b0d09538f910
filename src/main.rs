//! SpotGrid CLI
//!
//! Categorizes advertising spots, assigns language codes, and resolves
//! spots onto the language block grid.
//!
//! Usage:
//!   spotgrid categorize                       # Tag uncategorized spots
//!   spotgrid categorize --force               # Clear tags + assignments, re-tag
//!   spotgrid process-all                      # Run every language category
//!   spotgrid assign-blocks --test 100         # Dry-run the block engine
//!   spotgrid assign-blocks --year 2024        # Assign all unassigned 2024 spots
//!   spotgrid status                           # Assignment status
//!   spotgrid review-required                  # Spots needing manual review

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use spotgrid_backend::models::Config;
use spotgrid_backend::reference::ReferenceData;
use spotgrid_backend::{
    BlockAssignmentEngine, CategorizationService, PipelineOrchestrator, SpotStore,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Spot language and language-block assignment tool
#[derive(Parser, Debug)]
#[command(name = "spotgrid")]
#[command(about = "Assign spots to language codes and language blocks")]
struct Cli {
    /// Path to the SQLite database (falls back to DATABASE_PATH)
    #[arg(long)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Categorize uncategorized spots by revenue type and spot type
    Categorize {
        /// Clear all categories and both assignment tables first
        #[arg(long)]
        force: bool,
    },

    /// Process spots in the language-assignment-required category
    ProcessLanguageRequired {
        /// Restrict to a single import batch
        #[arg(long)]
        batch_id: Option<String>,
    },

    /// Process spots in the review category
    ProcessReview {
        #[arg(long)]
        batch_id: Option<String>,
    },

    /// Process spots in the default-English category
    ProcessDefaultEnglish {
        #[arg(long)]
        batch_id: Option<String>,
    },

    /// Process all categories in order
    ProcessAll {
        #[arg(long)]
        batch_id: Option<String>,
    },

    /// Run the language block assignment engine
    AssignBlocks {
        /// Dry-run with N spots and show per-spot details
        #[arg(long)]
        test: Option<usize>,

        /// Assign at most N unassigned spots
        #[arg(long)]
        limit: Option<usize>,

        /// Assign every unassigned spot
        #[arg(long)]
        all: bool,

        /// Restrict to a broadcast year (e.g. 2024)
        #[arg(long)]
        year: Option<i32>,
    },

    /// Overall language assignment status
    Status,

    /// Spot counts per category
    StatusByCategory,

    /// Spots still requiring manual review
    ReviewRequired,

    /// Spots carrying the undetermined sentinel (L)
    Undetermined,

    /// Spots with language codes not in the languages table
    InvalidCodes,

    /// Block assignment coverage per broadcast year
    BlockStatus,

    /// Counts per applied business rule
    RuleStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let database_path = cli.database.unwrap_or(config.database_path);

    let store = Arc::new(
        SpotStore::new(&database_path)
            .with_context(|| format!("Failed to open database: {}", database_path))?,
    );

    let mut had_errors = false;

    match cli.command {
        Commands::Categorize { force } => {
            let service =
                CategorizationService::new(store.clone()).with_batch_size(config.batch_size);
            let outcome = if force {
                service.force_recategorize()?
            } else {
                service.categorize_uncategorized()?
            };
            println!(
                "Categorized {}/{} spots",
                outcome.categorized, outcome.processed
            );
        }

        Commands::ProcessLanguageRequired { batch_id } => {
            let orchestrator = PipelineOrchestrator::new(store.clone())?;
            orchestrator.preflight()?;
            let outcome = orchestrator
                .process_language_required_category(batch_id.as_deref())
                .await?;
            println!(
                "Processed {} | assigned {} | review flagged {} | errors {}",
                outcome.processed, outcome.assigned, outcome.review_flagged, outcome.errors
            );
            had_errors |= outcome.errors > 0;
        }

        Commands::ProcessReview { batch_id } => {
            let orchestrator = PipelineOrchestrator::new(store.clone())?;
            orchestrator.preflight()?;
            let outcome = orchestrator
                .process_review_category(batch_id.as_deref())
                .await?;
            println!(
                "Processed {} | assigned {} | review flagged {} | errors {}",
                outcome.processed, outcome.assigned, outcome.review_flagged, outcome.errors
            );
            had_errors |= outcome.errors > 0;
        }

        Commands::ProcessDefaultEnglish { batch_id } => {
            let orchestrator = PipelineOrchestrator::new(store.clone())?;
            orchestrator.preflight()?;
            let outcome = orchestrator
                .process_default_english_category(batch_id.as_deref())
                .await?;
            println!(
                "Processed {} | assigned {} | errors {}",
                outcome.processed, outcome.assigned, outcome.errors
            );
            had_errors |= outcome.errors > 0;
        }

        Commands::ProcessAll { batch_id } => {
            let orchestrator = PipelineOrchestrator::new(store.clone())?;
            let summary = orchestrator
                .process_all_categories(batch_id.as_deref())
                .await?;
            println!("=== Pipeline Summary ===");
            println!("  Total processed:     {}", summary.total_processed);
            println!(
                "  Language assigned:   {}",
                summary.language_required.assigned
            );
            println!(
                "  Default English:     {}",
                summary.default_english.assigned
            );
            println!("  Flagged for review:  {}", summary.flagged_for_review);
            println!("  Errors:              {}", summary.total_errors);
            had_errors |= summary.total_errors > 0;
        }

        Commands::AssignBlocks {
            test,
            limit,
            all,
            year,
        } => {
            if test.is_none() && limit.is_none() && !all && year.is_none() {
                bail!("specify one of --test N, --limit N, --all, or --year YYYY");
            }

            let reference = ReferenceData::from_rows(&store.languages()?);
            let mut engine = BlockAssignmentEngine::new(store.clone(), reference);

            if let Some(count) = test {
                let outcome = engine.test_assignment(count).await?;
                println!("=== Test Assignment ===");
                println!("  Spots tested:  {}", outcome.spots_tested);
                println!("  Success rate:  {:.1}%", outcome.success_rate * 100.0);
                print_block_stats(&outcome.stats);
                println!();
                for d in &outcome.details {
                    println!(
                        "  {:>8} {:<20} {:>8}-{:<8} {:<24} {}",
                        d.spot_id,
                        d.bill_code.chars().take(20).collect::<String>(),
                        d.time_in.as_deref().unwrap_or("-"),
                        d.time_out.as_deref().unwrap_or("-"),
                        d.block_name.as_deref().unwrap_or("(no block)"),
                        d.business_rule_applied.as_deref().unwrap_or("grid"),
                    );
                }
                had_errors |= outcome.stats.errors > 0;
            } else {
                let stats = engine.assign_spots_batch(None, year, limit).await?;
                println!("=== Block Assignment ===");
                print_block_stats(&stats);
                had_errors |= stats.errors > 0;
            }
        }

        Commands::Status => {
            let summary = store.review_summary()?;
            println!("=== Language Assignment Status ===");
            println!(
                "  Undetermined language (L):   {}",
                summary.undetermined_language
            );
            println!("  Invalid language codes:      {}", summary.invalid_codes);
            println!(
                "  High-value undetermined:     {}",
                summary.high_value_undetermined
            );
            println!(
                "  Total requiring review:      {}",
                summary.total_review_required
            );
        }

        Commands::StatusByCategory => {
            let summary = store.category_summary()?;
            println!("=== Spots by Category ({} total) ===", store.spot_count()?);
            for (category, count) in &summary.by_category {
                println!("  {:<36} {:>10}", category, count);
            }
            println!("  {:<36} {:>10}", "uncategorized", summary.uncategorized);

            let status = store.processing_status()?;
            println!("\n=== Processing Progress ===");
            for (category, total, processed) in &status.categories {
                println!("  {:<36} {:>10}/{}", category, processed, total);
            }
        }

        Commands::ReviewRequired => {
            let orchestrator = PipelineOrchestrator::new(store.clone())?;
            let assignments = orchestrator.resolver().review_required_assignments(Some(50))?;
            let summary = store.review_summary()?;

            println!("=== Spots Requiring Manual Review ===");
            println!(
                "  Undetermined: {} | Invalid: {} | Total: {}",
                summary.undetermined_language,
                summary.invalid_codes,
                summary.total_review_required
            );
            println!();
            println!("{:>8} {:>6} {:>12} Reason", "Spot ID", "Code", "Status");
            for a in &assignments {
                let reason = if a.language_code == "L" {
                    "Undetermined"
                } else {
                    "Invalid Code"
                };
                println!(
                    "{:>8} {:>6} {:>12} {}",
                    a.spot_id,
                    a.language_code,
                    a.status.as_str(),
                    reason
                );
            }
        }

        Commands::Undetermined => {
            let ids = store.list_undetermined(Some(20))?;
            println!("=== Undetermined Language Spots (first 20) ===");
            println!("{:>8} {:>15} {:>10}", "Spot ID", "Bill Code", "Gross");
            for spot_id in ids {
                if let Some(s) = store.get_spot(spot_id)? {
                    println!(
                        "{:>8} {:>15} {:>10.2}",
                        s.spot_id,
                        s.bill_code.chars().take(15).collect::<String>(),
                        s.gross_rate.unwrap_or(0.0)
                    );
                }
            }
        }

        Commands::InvalidCodes => {
            let ids = store.list_invalid_codes(Some(20))?;
            println!("=== Invalid Language Codes (first 20) ===");
            println!("{:>8} {:>6} {:>15}", "Spot ID", "Code", "Bill Code");
            for spot_id in ids {
                if let Some(s) = store.get_spot(spot_id)? {
                    println!(
                        "{:>8} {:>6} {:>15}",
                        s.spot_id,
                        s.language_code.as_deref().unwrap_or("-"),
                        s.bill_code.chars().take(15).collect::<String>()
                    );
                }
            }
        }

        Commands::BlockStatus => {
            let summaries = store.unassigned_by_year()?;
            println!("=== Block Assignment by Year ===");
            println!(
                "{:>6} {:>10} {:>10} {:>12} {:>14}",
                "Year", "Total", "Assigned", "Unassigned", "Unassigned $"
            );
            for s in &summaries {
                println!(
                    "{:>6} {:>10} {:>10} {:>12} {:>14.2}",
                    s.year, s.total_spots, s.assigned_spots, s.unassigned_spots,
                    s.unassigned_revenue
                );
            }
        }

        Commands::RuleStats => {
            let (rules, standard) = store.business_rule_stats()?;
            println!("=== Business Rule Applications ===");
            for (rule, count) in &rules {
                println!("  {:<32} {:>10}", rule, count);
            }
            println!("  {:<32} {:>10}", "(standard grid analysis)", standard);
        }
    }

    if had_errors {
        info!("Completed with errors");
        std::process::exit(1);
    }
    Ok(())
}

fn print_block_stats(stats: &spotgrid_backend::models::BlockStats) {
    println!("  Processed:     {}", stats.processed);
    println!("  Assigned:      {}", stats.assigned);
    println!("  Multi-block:   {}", stats.multi_block);
    println!("  No coverage:   {}", stats.no_coverage);
    println!("  Errors:        {}", stats.errors);
}
