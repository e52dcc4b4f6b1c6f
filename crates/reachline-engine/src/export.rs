//! Deterministic CSV export of persisted results.
//!
//! Exporting the same persisted result set twice must produce
//! byte-identical output: rows are sorted by item id, candidates by
//! descending confidence then address, and no timestamps or run-local
//! values appear in the output.

use reachline_types::item::{Candidate, ContactResult};

const HEADER: &str = "item_id,address,confidence,source,verify_status,is_best,fallback_used";

/// Render results as RFC-4180 CSV.
///
/// Items with no candidates still produce one row with empty candidate
/// columns, so the export covers the full population.
#[must_use]
pub fn export_csv(results: &[ContactResult]) -> String {
    let mut sorted: Vec<&ContactResult> = results.iter().collect();
    sorted.sort_by(|a, b| a.item_id.cmp(&b.item_id));

    let mut out = String::with_capacity(results.len() * 64);
    out.push_str(HEADER);
    out.push('\n');

    for result in sorted {
        let mut candidates: Vec<&Candidate> = result.candidates.iter().collect();
        candidates.sort_by(|a, b| {
            b.confidence
                .cmp(&a.confidence)
                .then_with(|| a.address.cmp(&b.address))
        });

        if candidates.is_empty() {
            out.push_str(&format!(
                "{},,,,,,{}\n",
                csv_field(result.item_id.as_str()),
                result.fallback_used,
            ));
            continue;
        }

        for candidate in candidates {
            let is_best = result
                .best
                .as_ref()
                .is_some_and(|best| best.address == candidate.address);
            out.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                csv_field(result.item_id.as_str()),
                csv_field(&candidate.address),
                candidate.confidence.as_str(),
                candidate.source.as_str(),
                candidate.verify_status.as_str(),
                is_best,
                result.fallback_used,
            ));
        }
    }

    out
}

/// Quote a field per RFC 4180 when it contains a comma, quote, or newline.
fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reachline_types::item::{CandidateSource, Confidence, ItemId, VerifyStatus};

    fn result(id: &str, addresses: &[(&str, Confidence)]) -> ContactResult {
        let candidates: Vec<Candidate> = addresses
            .iter()
            .map(|(addr, conf)| Candidate::new(*addr, *conf, CandidateSource::Scraped))
            .collect();
        ContactResult {
            item_id: ItemId::new(id),
            best: candidates.first().cloned(),
            candidates,
            fallback_used: false,
        }
    }

    #[test]
    fn export_is_idempotent() {
        let results = vec![
            result("d2", &[("b@d2.org", Confidence::Medium)]),
            result("d1", &[("a@d1.org", Confidence::High)]),
        ];
        let first = export_csv(&results);
        let second = export_csv(&results);
        assert_eq!(first, second);
    }

    #[test]
    fn rows_sorted_by_item_id_regardless_of_input_order() {
        let forward = vec![
            result("d1", &[("a@d1.org", Confidence::High)]),
            result("d2", &[("b@d2.org", Confidence::High)]),
        ];
        let reversed: Vec<ContactResult> = forward.iter().rev().cloned().collect();
        assert_eq!(export_csv(&forward), export_csv(&reversed));
    }

    #[test]
    fn candidates_sorted_by_confidence_then_address() {
        let results = vec![result(
            "d1",
            &[
                ("z@d1.org", Confidence::Low),
                ("m@d1.org", Confidence::High),
                ("a@d1.org", Confidence::Low),
            ],
        )];
        let csv = export_csv(&results);
        let lines: Vec<&str> = csv.lines().collect();
        assert!(lines[1].starts_with("d1,m@d1.org,high"));
        assert!(lines[2].starts_with("d1,a@d1.org,low"));
        assert!(lines[3].starts_with("d1,z@d1.org,low"));
    }

    #[test]
    fn empty_candidate_set_still_exports_the_item() {
        let results = vec![ContactResult {
            item_id: ItemId::new("d9"),
            candidates: vec![],
            best: None,
            fallback_used: true,
        }];
        let csv = export_csv(&results);
        assert!(csv.lines().nth(1).unwrap().starts_with("d9,"));
        assert!(csv.contains("true"));
    }

    #[test]
    fn best_candidate_flagged() {
        let mut r = result("d1", &[("a@d1.org", Confidence::High)]);
        r.candidates[0].verify_status = VerifyStatus::Verified;
        r.best = Some(r.candidates[0].clone());
        let csv = export_csv(&[r]);
        assert!(csv.contains("d1,a@d1.org,high,scraped,verified,true,false"));
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        let results = vec![result("d,1", &[("a@d1.org", Confidence::High)])];
        let csv = export_csv(&results);
        assert!(csv.contains("\"d,1\""));
    }

    #[test]
    fn header_is_first_line() {
        let csv = export_csv(&[]);
        assert_eq!(csv.lines().next().unwrap(), HEADER);
    }
}
