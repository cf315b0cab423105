mod classifier;
mod db;
mod gmail;
mod models;
mod queries;
mod reconciler;
mod repair;
mod sync;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

use classifier::LlmClassifier;
use db::{Database, NewApplication};
use gmail::GmailClient;
use models::{ApplicationStatus, CloseReason};
use sync::{run_sync, SyncOptions};

#[derive(Parser)]
#[command(name = "pursuit")]
#[command(about = "Track job applications and reconcile them against your Gmail inbox")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Add an application by hand
    Add {
        /// Company name
        company: String,

        /// Role title
        role: String,

        /// Location
        #[arg(short, long)]
        location: Option<String>,

        /// Job posting URL (also the dedup key)
        #[arg(short, long)]
        url: Option<String>,

        /// Initial status (saved, applied, interviewing, offer)
        #[arg(short, long, default_value = "saved")]
        status: String,
    },

    /// List applications
    List {
        /// Filter by status (saved, applied, interviewing, offer, closed)
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by company substring
        #[arg(short, long)]
        company: Option<String>,
    },

    /// Show application details and linked emails
    Show {
        /// Application ID
        id: i64,
    },

    /// Change an application's status by hand
    SetStatus {
        /// Application ID
        id: i64,

        /// New status (saved, applied, interviewing, offer, closed)
        status: String,

        /// Why it closed (rejected, withdrawn, ghosted, accepted); required when closing
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Pull application emails from Gmail and reconcile them
    Sync {
        /// Days to look back (default 90)
        #[arg(short, long)]
        days: Option<u32>,

        /// Explicit lower bound as YYYY-MM-DD, overrides --days
        #[arg(long)]
        after: Option<String>,

        /// Max messages fetched per search query
        #[arg(long, default_value = "30")]
        max_per_query: u32,

        /// Ignore classifications below this confidence
        #[arg(long, default_value = "0.6")]
        min_confidence: f64,

        /// Model for classification (haiku, sonnet, gpt-4o-mini, gpt-4o)
        #[arg(short, long, default_value = "haiku")]
        model: String,

        /// Gmail access token file, used when GMAIL_TOKEN is unset
        #[arg(long, default_value = "~/.gmail_token")]
        token_file: String,

        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Fix duplicate applications and conflicting email links
    Repair {
        /// Merge duplicate applications (keep oldest)
        #[arg(long)]
        duplicates: bool,

        /// Re-resolve emails linked to several applications
        #[arg(long)]
        links: bool,

        /// Run all repair operations
        #[arg(long)]
        all: bool,

        /// Show what would change without changing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Forget processed messages so the next sync revisits them
    ResetSync {
        /// Gmail message id to forget (repeatable)
        #[arg(long)]
        email: Vec<String>,

        /// Forget every message linked to this application
        #[arg(long)]
        application: Option<i64>,

        /// Forget everything
        #[arg(long)]
        all: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let db = Database::open()?;

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Add {
            company,
            role,
            location,
            url,
            status,
        } => {
            db.ensure_initialized()?;
            let status = ApplicationStatus::parse(&status)
                .ok_or_else(|| anyhow!("unknown status '{}'", status))?;
            if status == ApplicationStatus::Closed {
                bail!("cannot add an application as closed; add it first, then use set-status");
            }
            let id = db.create_application(&NewApplication {
                company: &company,
                role: &role,
                location: location.as_deref(),
                status,
                job_url: url.as_deref(),
                ..Default::default()
            })?;
            println!("Added application #{} ({} / {})", id, company, role);
        }

        Commands::List { status, company } => {
            db.ensure_initialized()?;
            let status = match status {
                Some(raw) => Some(
                    ApplicationStatus::parse(&raw)
                        .ok_or_else(|| anyhow!("unknown status '{}'", raw))?,
                ),
                None => None,
            };
            let apps = db.list_applications(status, company.as_deref())?;
            if apps.is_empty() {
                println!("No applications found.");
            } else {
                println!(
                    "{:<6} {:<14} {:<22} {:<30} {:<16}",
                    "ID", "STATUS", "COMPANY", "ROLE", "LOCATION"
                );
                println!("{}", "-".repeat(90));
                for app in apps {
                    let status = match app.close_reason {
                        Some(reason) => format!("{} ({})", app.status.as_str(), reason.as_str()),
                        None => app.status.as_str().to_string(),
                    };
                    println!(
                        "{:<6} {:<14} {:<22} {:<30} {:<16}",
                        app.id,
                        truncate(&status, 13),
                        truncate(&app.company, 20),
                        truncate(&app.role, 28),
                        truncate(&app.location.unwrap_or_default(), 15)
                    );
                }
            }
        }

        Commands::Show { id } => {
            db.ensure_initialized()?;
            match db.get_application(id)? {
                Some(app) => {
                    println!("Application #{}", app.id);
                    println!("Company: {}", app.company);
                    println!("Role: {}", app.role);
                    if let Some(location) = &app.location {
                        println!("Location: {}", location);
                    }
                    match app.close_reason {
                        Some(reason) => {
                            println!("Status: {} ({})", app.status.as_str(), reason.as_str())
                        }
                        None => println!("Status: {}", app.status.as_str()),
                    }
                    if let Some(url) = &app.job_url {
                        println!("URL: {}", url);
                    }
                    println!("Created: {}", app.created_at);
                    println!("Updated: {}", app.updated_at);

                    let emails = db.emails_for_application(app.id)?;
                    if !emails.is_empty() {
                        println!("\nLinked emails ({}):", emails.len());
                        for email in emails {
                            let kind = email.email_type.map(|t| t.as_str()).unwrap_or("-");
                            let date = email.date.unwrap_or_default();
                            let day = date.get(..10).unwrap_or(&date);
                            println!(
                                "  {:<10} {:<11} {}",
                                day,
                                kind,
                                truncate(email.subject.as_deref().unwrap_or("(no subject)"), 60)
                            );
                        }
                    }
                }
                None => {
                    println!("Application #{} not found.", id);
                }
            }
        }

        Commands::SetStatus { id, status, reason } => {
            db.ensure_initialized()?;
            let status = ApplicationStatus::parse(&status)
                .ok_or_else(|| anyhow!("unknown status '{}'", status))?;
            let reason = match reason {
                Some(raw) => Some(
                    CloseReason::parse(&raw)
                        .ok_or_else(|| anyhow!("unknown close reason '{}'", raw))?,
                ),
                None => None,
            };
            if reason.is_some() && status != ApplicationStatus::Closed {
                bail!("--reason only applies when closing");
            }
            db.update_status(id, status, reason)?;
            match reason {
                Some(r) => println!(
                    "Application #{} is now {} ({}).",
                    id,
                    status.as_str(),
                    r.as_str()
                ),
                None => println!("Application #{} is now {}.", id, status.as_str()),
            }
        }

        Commands::Sync {
            days,
            after,
            max_per_query,
            min_confidence,
            model,
            token_file,
            dry_run,
        } => {
            db.ensure_initialized()?;

            let today = chrono::Utc::now().date_naive();
            let after = match after {
                Some(raw) => chrono::NaiveDate::parse_from_str(&raw, "%Y-%m-%d").with_context(
                    || format!("invalid --after date '{}', expected YYYY-MM-DD", raw),
                )?,
                None => match days {
                    Some(d) => today - chrono::Duration::days(i64::from(d)),
                    None => queries::default_after(today),
                },
            };

            let token = load_gmail_token(&token_file)?;
            let mailbox = GmailClient::new(token)?;
            let spec = classifier::resolve_model(&model)?;
            let classifier = LlmClassifier::new(classifier::create_provider(&spec)?);

            println!(
                "Searching Gmail for application emails since {} (classifying with {})...",
                after.format("%Y-%m-%d"),
                classifier.model_name()
            );
            let opts = SyncOptions {
                after,
                max_per_query,
                min_confidence,
                dry_run,
            };
            let stats = match run_sync(&db, &mailbox, &classifier, &opts) {
                Ok(stats) => stats,
                Err(e) if sync::is_auth_expired(&e) => {
                    eprintln!(
                        "\nGmail rejected the access token. Export a fresh one via GMAIL_TOKEN or {}.",
                        token_file
                    );
                    return Err(e);
                }
                Err(e) => return Err(e),
            };

            println!("\nResults:");
            println!("  Messages found:    {}", stats.found);
            println!("  Already processed: {}", stats.already_processed);
            println!("  Created:           {}", stats.created);
            println!("  Updated:           {}", stats.updated);
            println!("  Linked:            {}", stats.linked);
            println!("  Skipped:           {}", stats.skipped);
            if stats.errors > 0 {
                println!("  Errors:            {}", stats.errors);
            }
            if stats.queries_failed > 0 {
                println!("  Failed queries:    {}", stats.queries_failed);
            }

            if dry_run {
                println!("\n(Dry run - nothing was written)");
            }
        }

        Commands::Repair {
            duplicates,
            links,
            all,
            dry_run,
        } => {
            db.ensure_initialized()?;
            let mut did_something = false;

            if duplicates || all {
                did_something = true;
                println!("Checking for duplicate applications...");
                let merged = repair::merge_duplicates(&db, dry_run)?;
                if dry_run {
                    println!("  Would merge {} duplicate(s)", merged);
                } else {
                    println!("  Merged {} duplicate(s)", merged);
                }
            }

            if links || all {
                did_something = true;
                println!("Checking for conflicting email links...");
                let fixed = repair::fix_links(&db, dry_run)?;
                if dry_run {
                    println!("  Would relink {} message(s)", fixed);
                } else {
                    println!("  Relinked {} message(s)", fixed);
                }
            }

            if !did_something {
                println!("No repair operation specified. Use --duplicates, --links, or --all");
            }
        }

        Commands::ResetSync {
            email,
            application,
            all,
        } => {
            db.ensure_initialized()?;
            if all {
                let forgotten = db.reset_all_sync()?;
                println!("Forgot {} processed message(s).", forgotten);
            } else if email.is_empty() && application.is_none() {
                println!("Nothing to reset. Use --email, --application, or --all");
            } else {
                let mut ids = email;
                if let Some(app_id) = application {
                    for link in db.emails_for_application(app_id)? {
                        ids.push(link.gmail_message_id);
                    }
                }
                let forgotten = db.reset_for(&ids)?;
                println!("Forgot {} processed message(s).", forgotten);
            }
        }
    }

    Ok(())
}

fn load_gmail_token(token_file: &str) -> Result<String> {
    if let Ok(token) = std::env::var("GMAIL_TOKEN") {
        let token = token.trim().to_string();
        if !token.is_empty() {
            return Ok(token);
        }
    }

    // Expand ~ in path
    let token_path = if token_file.starts_with("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(format!("{}/{}", home, &token_file[2..]))
    } else {
        PathBuf::from(token_file)
    };

    let token = fs::read_to_string(&token_path).with_context(|| {
        format!(
            "Failed to read token file {:?} (set GMAIL_TOKEN or pass --token-file)",
            token_path
        )
    })?;
    Ok(token.trim().to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
