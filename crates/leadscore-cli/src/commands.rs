//! Command handlers for the CLI.
//!
//! Every handler works through the shared [`Workflow`]. Read commands
//! rehydrate the state they print first, so each invocation reflects the
//! service rather than a local cache.

use std::path::Path;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use futures::StreamExt;
use leadscore_client::{progress, ProgressEvent};
use leadscore_core::{load_offers_file, IntentFilter, Offer, OfferInput, ScoredResult};
use leadscore_workflow::{BatchFile, Workflow};

use crate::{Commands, LeadsCommands, OffersCommands};

const REASONING_PREVIEW_CHARS: usize = 60;

pub(crate) async fn run(workflow: &Workflow, command: Commands) -> anyhow::Result<()> {
    if command.requires_session() {
        require_session(workflow)?;
    }

    match command {
        Commands::Login { username, password } => {
            workflow.client().login(&username, &password).await?;
            println!("logged in as {username}");
            Ok(())
        }
        Commands::Signup {
            username,
            email,
            password,
        } => {
            workflow.client().signup(&username, &email, &password).await?;
            println!("account created, logged in as {username}");
            Ok(())
        }
        Commands::Logout => {
            workflow.client().logout();
            println!("logged out");
            Ok(())
        }
        Commands::Status => {
            run_status(workflow);
            Ok(())
        }
        Commands::Offers {
            command: OffersCommands::List,
        } => run_offers_list(workflow).await,
        Commands::Offers {
            command:
                OffersCommands::Create {
                    name,
                    value_props,
                    ideal_use_cases,
                    target_roles,
                    target_industries,
                },
        } => {
            let offer = workflow
                .create_offer(OfferInput {
                    name,
                    value_props,
                    ideal_use_cases,
                    target_roles,
                    target_industries,
                })
                .await?;
            println!("created offer #{}: {}", offer.id, offer.name);
            Ok(())
        }
        Commands::Offers {
            command: OffersCommands::Import { file },
        } => run_offers_import(workflow, &file).await,
        Commands::Leads {
            command: LeadsCommands::List,
        } => run_leads_list(workflow).await,
        Commands::Leads {
            command: LeadsCommands::Upload { file },
        } => run_leads_upload(workflow, &file).await,
        Commands::Score { offer } => run_score(workflow, offer).await,
        Commands::Results { intent } => {
            workflow.fetch_results().await?;
            print_results(&workflow.filtered_results(intent));
            Ok(())
        }
        Commands::Export { intent, dir } => run_export(workflow, intent, &dir).await,
        Commands::Stats => run_stats(workflow).await,
    }
}

fn require_session(workflow: &Workflow) -> anyhow::Result<()> {
    if !workflow.client().is_logged_in() {
        bail!("not logged in; run `leadscore login` first");
    }
    Ok(())
}

fn run_status(workflow: &Workflow) {
    let client = workflow.client();
    println!("service: {}", client.base_url());
    match client.credentials().get() {
        Some(credential) => {
            println!(
                "session: active (issued {})",
                credential.issued_at().format("%Y-%m-%d %H:%M UTC")
            );
            let renewal = if credential.has_refresh_token() {
                "automatic"
            } else {
                "unavailable, log in again when the session expires"
            };
            println!("renewal: {renewal}");
        }
        None => println!("session: none"),
    }
}

async fn run_offers_list(workflow: &Workflow) -> anyhow::Result<()> {
    let offers = workflow.fetch_offers().await?;
    if offers.is_empty() {
        println!("no offers yet; create one with `leadscore offers create`");
        return Ok(());
    }
    for offer in &offers {
        print_offer(offer);
    }
    Ok(())
}

async fn run_offers_import(workflow: &Workflow, file: &Path) -> anyhow::Result<()> {
    let parsed = load_offers_file(file)?;
    let total = parsed.offers.len();
    let mut created = 0_usize;

    for input in parsed.offers {
        let name = input.name.clone();
        match workflow.create_offer(input).await {
            Ok(offer) => {
                created += 1;
                println!("created offer #{}: {}", offer.id, offer.name);
            }
            Err(e) => {
                tracing::error!(offer = %name, error = %e, "offer import failed");
            }
        }
    }

    println!("imported {created} of {total} offers");
    if created < total {
        bail!("{} offers could not be created", total - created);
    }
    Ok(())
}

async fn run_leads_list(workflow: &Workflow) -> anyhow::Result<()> {
    let leads = workflow.fetch_leads().await?;
    println!("{} leads", leads.len());
    for lead in &leads {
        println!(
            "  {:<24} {:<24} {:<24} {}",
            lead.name, lead.role, lead.company, lead.industry
        );
    }
    Ok(())
}

async fn run_leads_upload(workflow: &Workflow, file: &Path) -> anyhow::Result<()> {
    let batch = BatchFile::from_path(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let (tx, mut events) = progress::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                ProgressEvent::Advanced(percent) => eprint!("\ruploading {percent:>3}%"),
                ProgressEvent::Completed => eprintln!("\ruploading 100%"),
                ProgressEvent::Failed => eprintln!("\rupload failed"),
            }
        }
    });

    let outcome = workflow.upload_batch(&batch, Some(tx)).await;
    printer.await.ok();

    let leads = outcome?;
    println!("uploaded {} leads from {}", leads.len(), batch.name());
    Ok(())
}

async fn run_score(workflow: &Workflow, offer_id: i64) -> anyhow::Result<()> {
    workflow.fetch_offers().await?;
    let results = workflow.request_scoring(offer_id).await?;

    print_results(&results);
    let skipped = workflow.skipped();
    if !skipped.is_empty() {
        println!("skipped {} leads: {}", skipped.len(), skipped.join(", "));
    }
    Ok(())
}

async fn run_export(workflow: &Workflow, intent: IntentFilter, dir: &Path) -> anyhow::Result<()> {
    workflow.fetch_results().await?;
    let path = workflow.write_export(intent, dir, export_date())?;
    println!(
        "exported {} results to {}",
        workflow.filtered_results(intent).len(),
        path.display()
    );
    Ok(())
}

async fn run_stats(workflow: &Workflow) -> anyhow::Result<()> {
    let report = workflow.hydrate().await;
    for (what, outcome) in [
        ("offers", &report.offers),
        ("leads", &report.leads),
        ("results", &report.results),
    ] {
        if let Err(e) = outcome {
            eprintln!("warning: could not load {what}: {e}");
        }
    }

    let stats = workflow.stats();
    println!("total leads:    {}", stats.total_leads);
    println!("high intent:    {}", stats.high);
    println!("medium intent:  {}", stats.medium);
    println!("low intent:     {}", stats.low);
    println!("offers:         {}", stats.offers);
    Ok(())
}

/// Export files are dated in UTC so every client names the same day alike.
pub(crate) fn export_date() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

fn print_offer(offer: &Offer) {
    println!("#{} {}", offer.id, offer.name);
    println!("    value props:  {}", offer.value_props);
    println!("    use cases:    {}", offer.ideal_use_cases);
    if !offer.target_roles.is_empty() {
        println!("    roles:        {}", offer.target_roles.join(", "));
    }
    if !offer.target_industries.is_empty() {
        println!("    industries:   {}", offer.target_industries.join(", "));
    }
}

fn print_results(results: &[ScoredResult]) {
    if results.is_empty() {
        println!("no results");
        return;
    }
    println!(
        "{:<24} {:<20} {:<7} {:>6}  REASONING",
        "NAME", "COMPANY", "INTENT", "SCORE"
    );
    for result in results {
        println!(
            "{:<24} {:<20} {:<7} {:>6}  {}",
            result.lead.name,
            result.lead.company,
            result.ai_intent.as_str(),
            result.final_score,
            preview(&result.reasoning)
        );
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= REASONING_PREVIEW_CHARS {
        return text.to_owned();
    }
    let cut: String = text.chars().take(REASONING_PREVIEW_CHARS - 3).collect();
    format!("{cut}...")
}
