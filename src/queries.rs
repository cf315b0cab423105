use chrono::{Duration, NaiveDate};

/// Applicant-tracking-system domains. Mail from these hosts is almost always
/// about an application, and a link into one of them doubles as the strongest
/// match key the reconciler has.
pub const ATS_DOMAINS: &[&str] = &[
    "greenhouse.io",
    "lever.co",
    "myworkday.com",
    "workday.com",
    "jobvite.com",
    "smartrecruiters.com",
    "ashbyhq.com",
    "icims.com",
    "taleo.net",
    "successfactors.com",
    "welcometothejungle.com",
    "wttj.co",
    "teamtailor.com",
    "recruitee.com",
    "flatchr.io",
];

/// One Gmail search query with a label for per-category diagnostics.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub label: &'static str,
    pub query: String,
}

/// Default lookback when no explicit resync date is given.
pub fn default_after(today: NaiveDate) -> NaiveDate {
    today - Duration::days(90)
}

fn format_after(date: NaiveDate) -> String {
    // Gmail wants slashes, not dashes.
    date.format("after:%Y/%m/%d").to_string()
}

/// Build the full query set for one sync run. Each category stays its own
/// query so result counts per category show up separately in the logs.
pub fn build_queries(after: NaiveDate) -> Vec<SearchQuery> {
    let after = format_after(after);
    let sets: Vec<(&'static str, &'static str)> = vec![
        (
            "applied (en)",
            r#"subject:("thank you for applying" OR "application received" OR "we received your application" OR "your application has been received")"#,
        ),
        (
            "applied confirmations (en)",
            r#"subject:("application submitted" OR "successfully applied" OR "your application to" OR "application confirmation")"#,
        ),
        (
            "applied (fr)",
            r#"subject:("candidature reçue" OR "votre candidature" OR "nous avons bien reçu votre candidature" OR "accusé de réception")"#,
        ),
        (
            "interview (en)",
            r#"subject:("interview invitation" OR "schedule your interview" OR "phone screen" OR "next steps in your application" OR "technical assessment")"#,
        ),
        (
            "interview (fr)",
            r#"subject:("invitation à un entretien" OR "entretien téléphonique" OR "premier échange" OR "prochaines étapes" OR "test technique")"#,
        ),
        (
            "rejection (en)",
            r#"subject:("unfortunately" OR "not moving forward" OR "we regret to inform" OR "decided to pursue other candidates")"#,
        ),
        (
            "rejection updates (en)",
            r#"subject:("decided not to proceed" OR "position has been filled" OR "no longer under consideration" OR "update on your application")"#,
        ),
        (
            "rejection (fr)",
            r#"subject:("malheureusement" OR "ne donnerons pas suite" OR "n'a pas été retenue" OR "suite à votre candidature")"#,
        ),
        (
            "offer (en)",
            r#"subject:("job offer" OR "offer letter" OR "pleased to offer you" OR "your offer from")"#,
        ),
        (
            "offer (fr)",
            r#"subject:("offre d'emploi" OR "proposition d'embauche" OR "promesse d'embauche" OR "votre offre")"#,
        ),
        (
            "recruiter outreach (en)",
            r#"subject:("your profile caught" OR "opportunity at" OR "reaching out about a role" OR "are you open to")"#,
        ),
        (
            "recruiter outreach (fr)",
            r#"subject:("votre profil" OR "une opportunité" OR "poste à pourvoir" OR "seriez-vous intéressé")"#,
        ),
    ];

    let mut queries: Vec<SearchQuery> = sets
        .into_iter()
        .map(|(label, q)| SearchQuery {
            label,
            query: format!("{} {}", q, after),
        })
        .collect();

    // Gmail caps how many OR terms one query takes well, so the ATS
    // allow-list is split into sender groups.
    let ats_labels = ["ats senders", "ats senders (more)", "ats senders (eu)"];
    for (chunk, label) in ATS_DOMAINS.chunks(5).zip(ats_labels) {
        queries.push(SearchQuery {
            label,
            query: format!("from:({}) {}", chunk.join(" OR "), after),
        });
    }

    queries.push(SearchQuery {
        label: "job boards",
        query: format!(
            r#"from:(linkedin.com OR indeed.com OR glassdoor.com) subject:(application OR candidature) {}"#,
            after
        ),
    });

    queries
}
