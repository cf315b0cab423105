use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::classifier::{Classification, Verdict};
use crate::db::{Database, NewApplication};
use crate::models::{Application, ApplicationStatus, CloseReason, EmailType, FetchedEmail};
use crate::queries::ATS_DOMAINS;

/// What the reconciler did with one message. Ledger strings derive from
/// this, so the sync log stays greppable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated { status: ApplicationStatus },
    Linked,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Degenerate,
    LowConfidence,
    NotJobRelated,
    MissingFields,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Degenerate => "degenerate",
            SkipReason::LowConfidence => "low-confidence",
            SkipReason::NotJobRelated => "not-job-related",
            SkipReason::MissingFields => "missing-fields",
        }
    }
}

impl Outcome {
    pub fn ledger_result(&self) -> String {
        match self {
            Outcome::Created => "created".to_string(),
            Outcome::Updated { status } => format!("updated:{}", status.as_str()),
            Outcome::Linked => "linked".to_string(),
            Outcome::Skipped(reason) => format!("skipped:{}", reason.as_str()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Outcome::Created => "create application".to_string(),
            Outcome::Updated { status } => format!("update status to {}", status.as_str()),
            Outcome::Linked => "link to existing application".to_string(),
            Outcome::Skipped(reason) => format!("skip ({})", reason.as_str()),
        }
    }
}

/// Fixed mapping from classified email type to the status it implies.
/// Unknown implies no change.
pub fn derive_status(email_type: EmailType) -> Option<(ApplicationStatus, Option<CloseReason>)> {
    match email_type {
        EmailType::Application => Some((ApplicationStatus::Applied, None)),
        EmailType::Interview => Some((ApplicationStatus::Interviewing, None)),
        EmailType::Offer => Some((ApplicationStatus::Offer, None)),
        EmailType::Rejection => Some((ApplicationStatus::Closed, Some(CloseReason::Rejected))),
        EmailType::Unknown => None,
    }
}

/// Monotonic status guard: only forward moves through the pipeline, plus
/// closing from any non-closed state. Closed never reopens here; that takes
/// a manual command.
pub fn should_transition(current: ApplicationStatus, target: ApplicationStatus) -> bool {
    if current == target {
        return false;
    }
    if current == ApplicationStatus::Closed {
        return false;
    }
    if target == ApplicationStatus::Closed {
        return true;
    }
    match (current.rank(), target.rank()) {
        (Some(c), Some(t)) => t > c,
        _ => false,
    }
}

/// Deterministic choice among applications competing for the same message:
/// an application whose role text appears verbatim (case-insensitive) in the
/// subject wins; remaining ties go to the application whose created_at is
/// closest to the message date, then to the lowest id. Returns an index into
/// `candidates`, which must be non-empty.
pub fn tie_break(
    candidates: &[Application],
    subject: &str,
    message_date: Option<DateTime<Utc>>,
) -> usize {
    let subject_lower = subject.to_lowercase();
    let role_hits: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, app)| {
            let role = app.role.trim().to_lowercase();
            !role.is_empty() && subject_lower.contains(&role)
        })
        .map(|(i, _)| i)
        .collect();

    let pool: Vec<usize> = if role_hits.is_empty() {
        (0..candidates.len()).collect()
    } else {
        role_hits
    };

    pool.into_iter()
        .min_by_key(|&i| {
            let app = &candidates[i];
            let distance = match (parse_db_timestamp(&app.created_at), message_date) {
                (Some(created), Some(msg)) => (msg - created).num_seconds().abs(),
                _ => i64::MAX,
            };
            (distance, app.id)
        })
        .unwrap_or(0)
}

/// SQLite `datetime('now')` strings, e.g. "2025-01-14 08:30:00".
pub(crate) fn parse_db_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// First link in the body that points at a known ATS domain. Confirmation
/// emails often carry the posting URL, which is the strongest match key we
/// have.
pub(crate) fn extract_job_url(body: &str) -> Option<String> {
    for token in body.split_whitespace() {
        let token = token.trim_matches(|c: char| {
            matches!(c, '<' | '>' | '(' | ')' | '[' | ']' | '"' | '\'' | ',' | '.' | ';')
        });
        if !token.starts_with("http://") && !token.starts_with("https://") {
            continue;
        }
        if ATS_DOMAINS.iter().any(|domain| token.contains(domain)) {
            return Some(token.to_string());
        }
    }
    None
}

pub struct Reconciler<'a> {
    db: &'a Database,
    min_confidence: f64,
    dry_run: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(db: &'a Database, min_confidence: f64, dry_run: bool) -> Self {
        Self {
            db,
            min_confidence,
            dry_run,
        }
    }

    /// Process one classified message end to end: match, derive the status
    /// transition, link, and record the message in the sync ledger. Every
    /// store write is an upsert, so re-running after a crash converges.
    pub fn reconcile(&self, msg: &FetchedEmail, verdict: &Verdict) -> Result<Outcome> {
        let classification = match verdict {
            Verdict::Degenerate => return self.skip(msg, SkipReason::Degenerate),
            Verdict::Parsed(c) => c,
        };

        if classification.confidence < self.min_confidence {
            log::debug!(
                "message {}: confidence {:.2} below threshold {:.2}",
                msg.id,
                classification.confidence,
                self.min_confidence
            );
            return self.skip(msg, SkipReason::LowConfidence);
        }

        let job_url = extract_job_url(&msg.body);
        let matched = self.find_match(job_url.as_deref(), classification)?;
        let existing_links = self.db.links_for_message(&msg.id)?;

        // Candidate set: everything this message is already linked to, plus
        // the fresh match.
        let mut candidates: Vec<Application> = Vec::new();
        for link in &existing_links {
            if candidates.iter().any(|a| a.id == link.application_id) {
                continue;
            }
            if let Some(app) = self.db.get_application(link.application_id)? {
                candidates.push(app);
            }
        }
        if let Some(app) = matched {
            if !candidates.iter().any(|a| a.id == app.id) {
                candidates.push(app);
            }
        }

        if candidates.is_empty() {
            return self.create_from(msg, classification, job_url.as_deref());
        }

        let winner_idx = if candidates.len() > 1 {
            let idx = tie_break(&candidates, &msg.subject, msg.date);
            log::info!(
                "message {} contested by {} applications; resolved to {} ({} / {})",
                msg.id,
                candidates.len(),
                candidates[idx].id,
                candidates[idx].company,
                candidates[idx].role
            );
            idx
        } else {
            0
        };
        let target = &candidates[winner_idx];

        let transition = derive_status(classification.email_type)
            .filter(|(status, _)| should_transition(target.status, *status));

        let outcome = match transition {
            Some((status, _)) => Outcome::Updated { status },
            None => Outcome::Linked,
        };

        if self.dry_run {
            return Ok(outcome);
        }

        if let Some((status, close_reason)) = transition {
            self.db.update_status(target.id, status, close_reason)?;
            log::info!(
                "application {} ({} / {}): {} -> {}",
                target.id,
                target.company,
                target.role,
                target.status.as_str(),
                status.as_str()
            );
        }

        self.db.link_email(target.id, msg, classification.email_type)?;
        for stray in existing_links
            .iter()
            .filter(|link| link.application_id != target.id)
        {
            self.db.relink_email(stray.id, target.id)?;
        }

        self.db.mark_processed(&msg.id, &outcome.ledger_result())?;
        Ok(outcome)
    }

    fn find_match(
        &self,
        job_url: Option<&str>,
        classification: &Classification,
    ) -> Result<Option<Application>> {
        if let Some(url) = job_url {
            if let Some(app) = self.db.find_by_url(url)? {
                return Ok(Some(app));
            }
        }
        if let (Some(company), Some(role)) =
            (&classification.company, &classification.role)
        {
            return self.db.find_by_company_role(company, role);
        }
        Ok(None)
    }

    fn create_from(
        &self,
        msg: &FetchedEmail,
        classification: &Classification,
        job_url: Option<&str>,
    ) -> Result<Outcome> {
        // Unknown-type mail never creates a tracked application.
        let Some((status, close_reason)) = derive_status(classification.email_type) else {
            return self.skip(msg, SkipReason::NotJobRelated);
        };
        let (Some(company), Some(role)) = (
            classification.company.as_deref(),
            classification.role.as_deref(),
        ) else {
            return self.skip(msg, SkipReason::MissingFields);
        };

        if self.dry_run {
            return Ok(Outcome::Created);
        }

        let id = self.db.create_application(&NewApplication {
            company,
            role,
            location: classification.location.as_deref(),
            status,
            close_reason,
            job_url,
            source_email_id: Some(&msg.id),
        })?;
        self.db.link_email(id, msg, classification.email_type)?;
        self.db
            .mark_processed(&msg.id, &Outcome::Created.ledger_result())?;
        log::info!(
            "created application {} ({} / {}) as {}",
            id,
            company,
            role,
            status.as_str()
        );
        Ok(Outcome::Created)
    }

    fn skip(&self, msg: &FetchedEmail, reason: SkipReason) -> Result<Outcome> {
        let outcome = Outcome::Skipped(reason);
        if !self.dry_run {
            // Explicit skips are still ledger entries so the next sync does
            // not pay to reclassify the same message.
            self.db.mark_processed(&msg.id, &outcome.ledger_result())?;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classification;
    use crate::db::NewApplication;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    fn msg(id: &str, subject: &str, body: &str) -> FetchedEmail {
        FetchedEmail {
            id: id.to_string(),
            subject: subject.to_string(),
            sender: "no-reply@hire.example".to_string(),
            date: Some(Utc.with_ymd_and_hms(2025, 1, 14, 10, 0, 0).unwrap()),
            snippet: String::new(),
            body: body.to_string(),
        }
    }

    fn verdict(
        email_type: EmailType,
        company: Option<&str>,
        role: Option<&str>,
        confidence: f64,
    ) -> Verdict {
        Verdict::Parsed(Classification {
            email_type,
            company: company.map(str::to_string),
            role: role.map(str::to_string),
            location: None,
            confidence,
        })
    }

    fn seed(db: &Database, company: &str, role: &str, status: ApplicationStatus) -> i64 {
        let close_reason = if status == ApplicationStatus::Closed {
            Some(CloseReason::Rejected)
        } else {
            None
        };
        db.create_application(&NewApplication {
            company,
            role,
            status,
            close_reason,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_derive_status_table() {
        assert_eq!(
            derive_status(EmailType::Application),
            Some((ApplicationStatus::Applied, None))
        );
        assert_eq!(
            derive_status(EmailType::Interview),
            Some((ApplicationStatus::Interviewing, None))
        );
        assert_eq!(
            derive_status(EmailType::Offer),
            Some((ApplicationStatus::Offer, None))
        );
        assert_eq!(
            derive_status(EmailType::Rejection),
            Some((ApplicationStatus::Closed, Some(CloseReason::Rejected)))
        );
        assert_eq!(derive_status(EmailType::Unknown), None);
    }

    #[test]
    fn test_should_transition_is_monotonic() {
        use ApplicationStatus::*;
        // Forward moves.
        assert!(should_transition(Saved, Applied));
        assert!(should_transition(Applied, Interviewing));
        assert!(should_transition(Interviewing, Offer));
        // No downgrades.
        assert!(!should_transition(Offer, Interviewing));
        assert!(!should_transition(Interviewing, Applied));
        assert!(!should_transition(Applied, Saved));
        // Same status is a no-op.
        assert!(!should_transition(Applied, Applied));
        // Closing is allowed from every non-closed state.
        for from in [Saved, Applied, Interviewing, Offer] {
            assert!(should_transition(from, Closed));
        }
        // Closed never leaves automatically.
        for to in [Saved, Applied, Interviewing, Offer, Closed] {
            assert!(!should_transition(Closed, to));
        }
    }

    #[test]
    fn test_creates_application_from_confirmation() {
        let db = test_db();
        let rec = Reconciler::new(&db, 0.6, false);

        let m = msg("m1", "Thank you for applying to Senior Engineer at Acme", "body");
        let v = verdict(EmailType::Application, Some("Acme"), Some("Senior Engineer"), 0.85);

        assert_eq!(rec.reconcile(&m, &v).unwrap(), Outcome::Created);

        let apps = db.list_applications(None, None).unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].company, "Acme");
        assert_eq!(apps[0].role, "Senior Engineer");
        assert_eq!(apps[0].status, ApplicationStatus::Applied);
        assert_eq!(apps[0].source_email_id.as_deref(), Some("m1"));
        assert_eq!(db.emails_for_application(apps[0].id).unwrap().len(), 1);
        assert!(db.is_processed("m1").unwrap());
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let db = test_db();
        let rec = Reconciler::new(&db, 0.6, false);

        let m = msg("m1", "Thank you for applying to Senior Engineer at Acme", "body");
        let v = verdict(EmailType::Application, Some("Acme"), Some("Senior Engineer"), 0.85);

        rec.reconcile(&m, &v).unwrap();
        let before = db.list_applications(None, None).unwrap();

        // Retry of the same message (crash-before-ledger scenario).
        assert_eq!(rec.reconcile(&m, &v).unwrap(), Outcome::Linked);

        let after = db.list_applications(None, None).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].status, before[0].status);
        assert_eq!(db.emails_for_application(after[0].id).unwrap().len(), 1);
    }

    #[test]
    fn test_interview_email_never_downgrades_offer() {
        let db = test_db();
        let id = seed(&db, "Acme", "Senior Engineer", ApplicationStatus::Offer);
        let rec = Reconciler::new(&db, 0.6, false);

        let m = msg("m1", "Interview follow-up", "body");
        let v = verdict(EmailType::Interview, Some("Acme"), Some("Senior Engineer"), 0.9);

        assert_eq!(rec.reconcile(&m, &v).unwrap(), Outcome::Linked);
        let app = db.get_application(id).unwrap().unwrap();
        assert_eq!(app.status, ApplicationStatus::Offer);
    }

    #[test]
    fn test_closed_application_stays_closed() {
        let db = test_db();
        let id = seed(&db, "Acme", "Senior Engineer", ApplicationStatus::Closed);
        let rec = Reconciler::new(&db, 0.6, false);

        let m = msg("m1", "Interview invitation", "body");
        let v = verdict(EmailType::Interview, Some("Acme"), Some("Senior Engineer"), 0.95);

        assert_eq!(rec.reconcile(&m, &v).unwrap(), Outcome::Linked);
        let app = db.get_application(id).unwrap().unwrap();
        assert_eq!(app.status, ApplicationStatus::Closed);
        assert_eq!(app.close_reason, Some(CloseReason::Rejected));
    }

    #[test]
    fn test_rejection_closes_with_reason() {
        let db = test_db();
        let id = seed(&db, "Acme", "Senior Engineer", ApplicationStatus::Interviewing);
        let rec = Reconciler::new(&db, 0.6, false);

        let m = msg("m1", "Update on your application", "body");
        let v = verdict(EmailType::Rejection, Some("Acme"), Some("Senior Engineer"), 0.9);

        assert_eq!(
            rec.reconcile(&m, &v).unwrap(),
            Outcome::Updated {
                status: ApplicationStatus::Closed
            }
        );
        let app = db.get_application(id).unwrap().unwrap();
        assert_eq!(app.status, ApplicationStatus::Closed);
        assert_eq!(app.close_reason, Some(CloseReason::Rejected));
    }

    #[test]
    fn test_low_confidence_rejection_is_not_destructive() {
        let db = test_db();
        let id = seed(&db, "Acme", "Senior Engineer", ApplicationStatus::Interviewing);
        let rec = Reconciler::new(&db, 0.6, false);

        let m = msg("m1", "Update on your application", "body");
        let v = verdict(EmailType::Rejection, Some("Acme"), Some("Senior Engineer"), 0.3);

        assert_eq!(
            rec.reconcile(&m, &v).unwrap(),
            Outcome::Skipped(SkipReason::LowConfidence)
        );
        let app = db.get_application(id).unwrap().unwrap();
        assert_eq!(app.status, ApplicationStatus::Interviewing);
        // Skips are still recorded so the message is not reclassified.
        assert!(db.is_processed("m1").unwrap());
    }

    #[test]
    fn test_degenerate_verdict_is_a_recorded_noop() {
        let db = test_db();
        let rec = Reconciler::new(&db, 0.6, false);

        let m = msg("m1", "anything", "body");
        assert_eq!(
            rec.reconcile(&m, &Verdict::Degenerate).unwrap(),
            Outcome::Skipped(SkipReason::Degenerate)
        );
        assert!(db.list_applications(None, None).unwrap().is_empty());
        assert!(db.is_processed("m1").unwrap());
    }

    #[test]
    fn test_unknown_type_links_but_never_creates() {
        let db = test_db();
        let rec = Reconciler::new(&db, 0.6, false);

        // No matching application: nothing to do.
        let m = msg("m1", "Your documents were received", "body");
        let v = verdict(EmailType::Unknown, Some("Acme"), Some("Senior Engineer"), 0.9);
        assert_eq!(
            rec.reconcile(&m, &v).unwrap(),
            Outcome::Skipped(SkipReason::NotJobRelated)
        );
        assert!(db.list_applications(None, None).unwrap().is_empty());

        // With a match it links without touching the status.
        let id = seed(&db, "Acme", "Senior Engineer", ApplicationStatus::Interviewing);
        let m2 = msg("m2", "Your documents were received", "body");
        assert_eq!(rec.reconcile(&m2, &v).unwrap(), Outcome::Linked);
        assert_eq!(
            db.get_application(id).unwrap().unwrap().status,
            ApplicationStatus::Interviewing
        );
        assert_eq!(db.emails_for_application(id).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_fields_cannot_create() {
        let db = test_db();
        let rec = Reconciler::new(&db, 0.6, false);

        let m = msg("m1", "Thanks for applying", "body");
        let v = verdict(EmailType::Application, Some("Acme"), None, 0.9);
        assert_eq!(
            rec.reconcile(&m, &v).unwrap(),
            Outcome::Skipped(SkipReason::MissingFields)
        );
        assert!(db.list_applications(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_rejection_with_role_in_subject_closes_only_that_application() {
        let db = test_db();
        let senior = seed(&db, "Acme", "Senior Engineer", ApplicationStatus::Applied);
        let staff = seed(&db, "Acme", "Staff Engineer", ApplicationStatus::Applied);
        let rec = Reconciler::new(&db, 0.6, false);

        let m = msg("m1", "Your Staff Engineer application at Acme", "body");
        let v = verdict(EmailType::Rejection, Some("Acme"), Some("Staff Engineer"), 0.9);

        rec.reconcile(&m, &v).unwrap();

        let staff_app = db.get_application(staff).unwrap().unwrap();
        assert_eq!(staff_app.status, ApplicationStatus::Closed);
        assert_eq!(staff_app.close_reason, Some(CloseReason::Rejected));

        let senior_app = db.get_application(senior).unwrap().unwrap();
        assert_eq!(senior_app.status, ApplicationStatus::Applied);
        assert_eq!(senior_app.close_reason, None);
        assert!(db.emails_for_application(senior).unwrap().is_empty());
    }

    #[test]
    fn test_conflicting_link_relinks_to_role_in_subject() {
        let db = test_db();
        let senior = seed(&db, "Acme", "Senior Engineer", ApplicationStatus::Applied);
        let staff = seed(&db, "Acme", "Staff Engineer", ApplicationStatus::Applied);
        let rec = Reconciler::new(&db, 0.6, false);

        // Mis-filed earlier: the message sits on the Senior application.
        let m = msg("m1", "Your Staff Engineer application at Acme", "body");
        db.link_email(senior, &m, EmailType::Rejection).unwrap();

        let v = verdict(EmailType::Rejection, Some("Acme"), Some("Staff Engineer"), 0.9);
        rec.reconcile(&m, &v).unwrap();

        let links = db.links_for_message("m1").unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].application_id, staff);
        assert!(db.emails_for_application(senior).unwrap().is_empty());

        // The status lands on the winner, not the old link.
        assert_eq!(
            db.get_application(staff).unwrap().unwrap().status,
            ApplicationStatus::Closed
        );
        assert_eq!(
            db.get_application(senior).unwrap().unwrap().status,
            ApplicationStatus::Applied
        );
    }

    #[test]
    fn test_tie_break_falls_back_to_closest_creation_date() {
        let db = test_db();
        let older = seed(&db, "Acme", "Senior Engineer", ApplicationStatus::Applied);
        let newer = seed(&db, "Acme", "Platform Engineer", ApplicationStatus::Applied);
        db.set_created_at(older, "2025-01-02 09:00:00").unwrap();
        db.set_created_at(newer, "2025-01-14 09:00:00").unwrap();

        let apps = vec![
            db.get_application(older).unwrap().unwrap(),
            db.get_application(newer).unwrap().unwrap(),
        ];

        // Subject names neither role; the message date (Jan 14 10:00) sits
        // right next to the newer application.
        let winner = tie_break(
            &apps,
            "Update on your application",
            Some(Utc.with_ymd_and_hms(2025, 1, 14, 10, 0, 0).unwrap()),
        );
        assert_eq!(apps[winner].id, newer);
    }

    #[test]
    fn test_tie_break_prefers_role_substring_over_date() {
        let db = test_db();
        let near = seed(&db, "Acme", "Senior Engineer", ApplicationStatus::Applied);
        let far = seed(&db, "Acme", "Staff Engineer", ApplicationStatus::Applied);
        db.set_created_at(near, "2025-01-14 09:59:00").unwrap();
        db.set_created_at(far, "2024-11-01 00:00:00").unwrap();

        let apps = vec![
            db.get_application(near).unwrap().unwrap(),
            db.get_application(far).unwrap().unwrap(),
        ];

        let winner = tie_break(
            &apps,
            "Regarding your staff engineer application",
            Some(Utc.with_ymd_and_hms(2025, 1, 14, 10, 0, 0).unwrap()),
        );
        assert_eq!(apps[winner].id, far);
    }

    #[test]
    fn test_tie_break_without_message_date_uses_lowest_id() {
        let db = test_db();
        let first = seed(&db, "Acme", "Senior Engineer", ApplicationStatus::Applied);
        let second = seed(&db, "Acme", "Platform Engineer", ApplicationStatus::Applied);

        let apps = vec![
            db.get_application(first).unwrap().unwrap(),
            db.get_application(second).unwrap().unwrap(),
        ];

        let winner = tie_break(&apps, "Update on your application", None);
        assert_eq!(apps[winner].id, first);
    }

    #[test]
    fn test_url_match_wins_over_company_role() {
        let db = test_db();
        let by_url = db
            .create_application(&NewApplication {
                company: "Acme Corporation",
                role: "Backend Engineer",
                status: ApplicationStatus::Applied,
                job_url: Some("https://boards.greenhouse.io/acme/jobs/4242"),
                ..Default::default()
            })
            .unwrap();
        // Decoy that would win a company/role match.
        seed(&db, "Acme", "Senior Engineer", ApplicationStatus::Applied);

        let rec = Reconciler::new(&db, 0.6, false);
        let m = msg(
            "m1",
            "Interview invitation",
            "Schedule here: https://boards.greenhouse.io/acme/jobs/4242, thanks!",
        );
        let v = verdict(EmailType::Interview, Some("Acme"), Some("Senior Engineer"), 0.9);

        rec.reconcile(&m, &v).unwrap();
        assert_eq!(
            db.get_application(by_url).unwrap().unwrap().status,
            ApplicationStatus::Interviewing
        );
        assert_eq!(db.emails_for_application(by_url).unwrap().len(), 1);
    }

    #[test]
    fn test_extract_job_url() {
        assert_eq!(
            extract_job_url("apply at https://boards.greenhouse.io/acme/jobs/1, cheers"),
            Some("https://boards.greenhouse.io/acme/jobs/1".to_string())
        );
        assert_eq!(
            extract_job_url("see <https://jobs.lever.co/globex/99>."),
            Some("https://jobs.lever.co/globex/99".to_string())
        );
        // Non-ATS links are not match keys.
        assert_eq!(extract_job_url("visit https://example.com/unsubscribe now"), None);
        assert_eq!(extract_job_url("no links here"), None);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let db = test_db();
        let rec = Reconciler::new(&db, 0.6, true);

        let m = msg("m1", "Thank you for applying to Senior Engineer at Acme", "body");
        let v = verdict(EmailType::Application, Some("Acme"), Some("Senior Engineer"), 0.85);

        assert_eq!(rec.reconcile(&m, &v).unwrap(), Outcome::Created);
        assert!(db.list_applications(None, None).unwrap().is_empty());
        assert!(!db.is_processed("m1").unwrap());

        // Skips in dry-run stay out of the ledger too.
        assert_eq!(
            rec.reconcile(&m, &Verdict::Degenerate).unwrap(),
            Outcome::Skipped(SkipReason::Degenerate)
        );
        assert!(!db.is_processed("m1").unwrap());
    }

    #[test]
    fn test_close_reason_invariant_across_operations() {
        let db = test_db();
        let rec = Reconciler::new(&db, 0.6, false);

        let sequences = [
            (EmailType::Application, 0.9),
            (EmailType::Interview, 0.9),
            (EmailType::Rejection, 0.9),
            (EmailType::Interview, 0.9), // stale, after close
            (EmailType::Offer, 0.9),     // stale, after close
        ];
        for (i, (email_type, confidence)) in sequences.iter().enumerate() {
            let m = msg(&format!("m{}", i), "About your Senior Engineer application", "b");
            let v = verdict(*email_type, Some("Acme"), Some("Senior Engineer"), *confidence);
            rec.reconcile(&m, &v).unwrap();

            for app in db.list_applications(None, None).unwrap() {
                assert_eq!(
                    app.status == ApplicationStatus::Closed,
                    app.close_reason.is_some(),
                    "invariant broken after step {}",
                    i
                );
            }
        }
    }
}
