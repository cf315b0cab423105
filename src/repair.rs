use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use strsim::jaro_winkler;

use crate::db::Database;
use crate::models::Application;
use crate::reconciler;

/// Roles this similar (after lowercasing) are treated as the same posting.
/// High on purpose: "Senior Engineer" vs "Staff Engineer" scores around 0.72
/// and must stay distinct, while typo-level variants score above 0.97.
const ROLE_SIMILARITY_THRESHOLD: f64 = 0.93;

/// Collapse applications that track the same posting, keeping the oldest
/// row. Links move to the keeper and its status advances if a duplicate got
/// further down the pipeline. Returns how many duplicates were removed.
pub fn merge_duplicates(db: &Database, dry_run: bool) -> Result<usize> {
    let mut apps = db.list_applications(None, None)?;
    apps.sort_by_key(|a| a.id);

    let mut removed: HashSet<i64> = HashSet::new();
    let mut merged = 0;

    for i in 0..apps.len() {
        if removed.contains(&apps[i].id) {
            continue;
        }
        for j in (i + 1)..apps.len() {
            if removed.contains(&apps[j].id) {
                continue;
            }
            if !same_posting(&apps[i], &apps[j]) {
                continue;
            }
            merge_into(db, &apps[i], &apps[j], dry_run)?;
            removed.insert(apps[j].id);
            merged += 1;
        }
    }

    Ok(merged)
}

fn same_posting(a: &Application, b: &Application) -> bool {
    if a.company.to_lowercase() != b.company.to_lowercase() {
        return false;
    }
    let role_a = a.role.to_lowercase();
    let role_b = b.role.to_lowercase();
    role_a == role_b || jaro_winkler(&role_a, &role_b) >= ROLE_SIMILARITY_THRESHOLD
}

fn merge_into(db: &Database, keeper: &Application, dup: &Application, dry_run: bool) -> Result<()> {
    if dry_run {
        println!(
            "  Would merge #{} into #{} ({} / {})",
            dup.id, keeper.id, keeper.company, keeper.role
        );
        return Ok(());
    }

    let moved = db.move_links(dup.id, keeper.id)?;
    // Re-read the keeper: an earlier merge in the same pass may already have
    // advanced it.
    if let Some(current) = db.get_application(keeper.id)? {
        if reconciler::should_transition(current.status, dup.status) {
            db.update_status(keeper.id, dup.status, dup.close_reason)?;
        }
    }
    db.delete_application(dup.id)?;

    log::info!(
        "merged application {} into {} ({} links moved)",
        dup.id,
        keeper.id,
        moved
    );
    println!(
        "  Merged #{} into #{} ({} / {})",
        dup.id, keeper.id, keeper.company, keeper.role
    );
    Ok(())
}

/// Re-resolve messages that ended up linked to more than one application,
/// using the same deterministic rule the sync path applies. Returns how many
/// messages were relinked.
pub fn fix_links(db: &Database, dry_run: bool) -> Result<usize> {
    let contested = db.multi_linked_messages()?;
    let mut fixed = 0;

    for gmail_id in contested {
        let links = db.links_for_message(&gmail_id)?;

        let mut candidates: Vec<Application> = Vec::new();
        for link in &links {
            if candidates.iter().any(|a| a.id == link.application_id) {
                continue;
            }
            if let Some(app) = db.get_application(link.application_id)? {
                candidates.push(app);
            }
        }
        if candidates.len() < 2 {
            continue;
        }

        let subject = links
            .iter()
            .find_map(|l| l.subject.clone())
            .unwrap_or_default();
        let date = links
            .iter()
            .find_map(|l| l.date.as_deref())
            .and_then(parse_link_date);

        let winner = candidates[reconciler::tie_break(&candidates, &subject, date)].id;

        if dry_run {
            println!(
                "  Would relink message {} to application #{}",
                gmail_id, winner
            );
            fixed += 1;
            continue;
        }

        for link in links.iter().filter(|l| l.application_id != winner) {
            db.relink_email(link.id, winner)?;
        }
        log::info!("relinked message {} to application {}", gmail_id, winner);
        println!("  Relinked message {} to application #{}", gmail_id, winner);
        fixed += 1;
    }

    Ok(fixed)
}

fn parse_link_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
