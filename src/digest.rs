use std::fmt::Write;

use crate::config::Config;
use crate::store;
use crate::table::Table;

pub const DIGEST_SPECIALTIES: [&str; 2] = ["HO", "PDH"];
pub const DIGEST_SUBJECT: &str = "Daily Locum Need Digest";

#[derive(Debug, Clone)]
pub struct DigestEntry {
    pub facility_name: String,
    pub city: String,
    pub state: String,
    pub specialty: String,
    pub score: f64,
}

/// Top-N rows per tracked specialty, by score descending.
pub fn select_top(scores: &Table, top_n: usize) -> Vec<DigestEntry> {
    let mut entries = Vec::new();
    for specialty in DIGEST_SPECIALTIES {
        let mut rows: Vec<usize> = (0..scores.len())
            .filter(|&i| scores.get(i, "specialty").unwrap_or("").trim() == specialty)
            .collect();
        rows.sort_by(|&a, &b| {
            score_of(scores, b)
                .partial_cmp(&score_of(scores, a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for &i in rows.iter().take(top_n) {
            entries.push(DigestEntry {
                facility_name: scores.get(i, "facility_name").unwrap_or("Unknown").to_string(),
                city: scores.get(i, "city").unwrap_or("").to_string(),
                state: scores.get(i, "state").unwrap_or("").to_string(),
                specialty: specialty.to_string(),
                score: score_of(scores, i),
            });
        }
    }
    entries
}

fn score_of(table: &Table, row: usize) -> f64 {
    table
        .get(row, "score")
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0.0)
}

pub fn build_email_body(entries: &[DigestEntry]) -> String {
    let mut html = String::from("<h3>Top Facilities Likely to Need Locum Coverage</h3><ul>");
    for entry in entries {
        let _ = write!(
            html,
            "<li><b>{}</b> in {}, {} &mdash; {} (score: {:.2})</li>",
            entry.facility_name, entry.city, entry.state, entry.specialty, entry.score
        );
    }
    html.push_str("</ul>");
    html
}

/// Sends the digest through the SendGrid v3 mail API and returns the
/// delivery status code. The missing-credential check happens before any
/// network traffic so dry failures stay clean.
pub fn send_via_sendgrid(config: &Config, html_body: &str) -> anyhow::Result<u16> {
    let api_key = config
        .sendgrid_api_key
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("missing SENDGRID_API_KEY"))?;
    anyhow::ensure!(!config.mail_to.is_empty(), "no digest recipients configured (MAIL_TO)");

    let payload = serde_json::json!({
        "personalizations": [{
            "to": config.mail_to.iter().map(|r| serde_json::json!({"email": r})).collect::<Vec<_>>(),
        }],
        "from": {"email": config.mail_from},
        "subject": DIGEST_SUBJECT,
        "content": [{"type": "text/html", "value": html_body}],
    });

    let response = reqwest::blocking::Client::new()
        .post("https://api.sendgrid.com/v3/mail/send")
        .bearer_auth(api_key)
        .json(&payload)
        .send()?;
    Ok(response.status().as_u16())
}

/// The digest run: load the store, pick the top rows, send (or print on a
/// dry run).
pub fn run_digest(config: &Config, dry_run: bool) -> anyhow::Result<()> {
    let scores = store::load_scores(&config.scores_path)?;
    let entries = select_top(&scores, config.digest_top_n);
    let body = build_email_body(&entries);

    if dry_run {
        println!("{body}");
        return Ok(());
    }

    let status = send_via_sendgrid(config, &body)?;
    tracing::info!("digest sent via SendGrid, status {status}");
    println!("Sent via SendGrid, status: {status}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold::Thresholds;

    fn scores_table() -> Table {
        Table::from_csv_str(
            "facility_id,facility_name,city,state,specialty,score\n\
             f1,General,Urbana,IL,HO,0.91\n\
             f2,Mercy,Peoria,IL,HO,0.45\n\
             f3,Childrens,Chicago,IL,PDH,0.77\n\
             f4,Lakeside,Madison,WI,HO,0.88\n",
        )
        .unwrap()
    }

    #[test]
    fn selects_top_n_per_specialty_by_score() {
        let entries = select_top(&scores_table(), 2);
        let names: Vec<&str> = entries.iter().map(|e| e.facility_name.as_str()).collect();
        assert_eq!(names, vec!["General", "Lakeside", "Childrens"]);
        assert_eq!(entries[0].specialty, "HO");
        assert_eq!(entries[2].specialty, "PDH");
    }

    #[test]
    fn body_lists_each_entry() {
        let entries = select_top(&scores_table(), 1);
        let body = build_email_body(&entries);
        assert!(body.contains("<b>General</b> in Urbana, IL"));
        assert!(body.contains("(score: 0.91)"));
        assert!(body.contains("Childrens"));
        assert!(!body.contains("Mercy"));
    }

    #[test]
    fn missing_credential_is_fatal_and_named() {
        let config = Config {
            features_path: "x".into(),
            scores_path: "x".into(),
            contacts_path: "x".into(),
            model_path: "x".into(),
            thresholds: Thresholds::new(0.70),
            digest_top_n: 20,
            mail_from: "ops@example.com".to_string(),
            mail_to: vec!["agent@example.com".to_string()],
            sendgrid_api_key: None,
        };
        let err = send_via_sendgrid(&config, "<p>body</p>").unwrap_err();
        assert!(err.to_string().contains("SENDGRID_API_KEY"));
    }
}
