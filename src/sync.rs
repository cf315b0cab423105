use std::collections::HashSet;

use anyhow::Result;
use chrono::NaiveDate;

use crate::classifier::Classifier;
use crate::db::Database;
use crate::gmail::{Mailbox, MailboxError};
use crate::queries::build_queries;
use crate::reconciler::{Outcome, Reconciler};

pub struct SyncOptions {
    pub after: NaiveDate,
    pub max_per_query: u32,
    pub min_confidence: f64,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct SyncStats {
    pub queries_failed: usize,
    pub found: usize,
    pub already_processed: usize,
    pub created: usize,
    pub updated: usize,
    pub linked: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// True when the error chain bottoms out in a rejected Gmail token. The
/// caller uses this to print a re-auth hint instead of a bare error.
pub fn is_auth_expired(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<MailboxError>(),
            Some(MailboxError::AuthExpired)
        )
    })
}

/// One full mailbox pass: run every search query, fetch ids not yet in the
/// sync ledger, classify, and reconcile. A failing query or message is
/// logged and skipped; an expired token aborts the whole run since every
/// remaining call would fail the same way.
pub fn run_sync(
    db: &Database,
    mailbox: &dyn Mailbox,
    classifier: &dyn Classifier,
    opts: &SyncOptions,
) -> Result<SyncStats> {
    let queries = build_queries(opts.after);
    let reconciler = Reconciler::new(db, opts.min_confidence, opts.dry_run);
    let mut stats = SyncStats::default();
    let mut seen_ids: HashSet<String> = HashSet::new();

    for search in &queries {
        eprint!("  {} ... ", search.label);
        let ids = match mailbox.list_messages(&search.query, opts.max_per_query) {
            Ok(ids) => ids,
            Err(MailboxError::AuthExpired) => {
                eprintln!("auth expired");
                return Err(anyhow::Error::new(MailboxError::AuthExpired));
            }
            Err(e) => {
                eprintln!("failed: {}", e);
                log::warn!("query '{}' failed: {}", search.label, e);
                stats.queries_failed += 1;
                continue;
            }
        };

        // The same message routinely matches several queries.
        let new_ids: Vec<_> = ids
            .into_iter()
            .filter(|id| seen_ids.insert(id.clone()))
            .collect();
        eprintln!("{} messages", new_ids.len());

        for id in new_ids {
            stats.found += 1;
            if db.is_processed(&id)? {
                stats.already_processed += 1;
                continue;
            }

            match process_message(&reconciler, mailbox, classifier, &id, opts.dry_run) {
                Ok(outcome) => match outcome {
                    Outcome::Created => stats.created += 1,
                    Outcome::Updated { .. } => stats.updated += 1,
                    Outcome::Linked => stats.linked += 1,
                    Outcome::Skipped(_) => stats.skipped += 1,
                },
                Err(e) if is_auth_expired(&e) => {
                    eprintln!("  auth expired, stopping");
                    return Err(e);
                }
                Err(e) => {
                    // Message stays out of the ledger and is retried on the
                    // next run.
                    stats.errors += 1;
                    log::warn!("message {}: {:#}", id, e);
                    eprintln!("  error on message {}: {}", id, e);
                }
            }
        }
    }

    Ok(stats)
}

fn process_message(
    reconciler: &Reconciler,
    mailbox: &dyn Mailbox,
    classifier: &dyn Classifier,
    id: &str,
    dry_run: bool,
) -> Result<Outcome> {
    let email = mailbox.get_message(id)?;
    let verdict = classifier.classify(&email)?;
    let outcome = reconciler.reconcile(&email, &verdict)?;
    if dry_run {
        println!("  [dry-run] \"{}\" -> {}", email.subject, outcome.describe());
    }
    Ok(outcome)
}
