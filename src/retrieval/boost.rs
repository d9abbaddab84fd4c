//! Recency and identity boosts applied on top of RRF scores

use crate::retrieval::RankedHit;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::BTreeSet;

/// Boost parameters
#[derive(Debug, Clone, Copy)]
pub struct BoostConfig {
    /// Largest recency contribution (0.5 = +50%)
    pub max_recency_boost: f64,
    /// Age in days at which the recency boost reaches zero
    pub horizon_days: i64,
    /// Multiplier when a queried identity appears in the file name
    pub filename_boost: f64,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            max_recency_boost: 0.5,
            horizon_days: 365,
            filename_boost: 2.0,
        }
    }
}

/// Parse an ISO date or datetime into a calendar date
///
/// Accepts `2024-05-01`, `2024-05-01T10:00:00`, and RFC 3339 with offset or `Z`.
pub fn parse_modified_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if !raw.contains('T') {
        return NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok();
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc().date());
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| dt.date())
        .ok()
}

/// Recency boost for a chunk of the given age
///
/// `max * (1 - sqrt(days / horizon))` inside the horizon, `max` for
/// today or future dates, and zero past the horizon or when undated.
pub fn recency_boost(days_old: Option<i64>, config: &BoostConfig) -> f64 {
    let Some(days) = days_old else {
        return 0.0;
    };

    if days <= 0 {
        config.max_recency_boost
    } else if days >= config.horizon_days {
        0.0
    } else {
        let fraction = days as f64 / config.horizon_days as f64;
        config.max_recency_boost * (1.0 - fraction.sqrt())
    }
}

/// Age in whole days of `modified_date` relative to `today`
pub fn days_old(modified_date: Option<&str>, today: NaiveDate) -> Option<i64> {
    let date = parse_modified_date(modified_date?)?;
    Some((today - date).num_days())
}

/// Fill in `hybrid_score` from `rrf_score` for every hit
///
/// Unparseable or missing dates get a neutral boost. The identity
/// multiplier applies at most once per hit.
pub fn apply_boosts(
    hits: &mut [RankedHit],
    identities: &BTreeSet<String>,
    apply_recency: bool,
    today: NaiveDate,
    config: &BoostConfig,
) {
    for hit in hits.iter_mut() {
        let mut score = hit.rrf_score;

        if apply_recency {
            let age = days_old(hit.chunk.modified_date.as_deref(), today);
            score *= 1.0 + recency_boost(age, config);
        }

        if matches_identity(hit, identities) {
            tracing::debug!(
                "Filename boost applied: {} names a queried identity",
                hit.chunk.display_name()
            );
            score *= config.filename_boost;
        }

        hit.hybrid_score = score;
    }
}

fn matches_identity(hit: &RankedHit, identities: &BTreeSet<String>) -> bool {
    if identities.is_empty() {
        return false;
    }
    let file_name = hit.chunk.display_name().to_lowercase();
    !file_name.is_empty() && identities.iter().any(|name| file_name.contains(name.as_str()))
}

/// Sort hits by `hybrid_score` descending, keeping ties in input order
pub fn sort_by_hybrid_score(hits: &mut [RankedHit]) {
    hits.sort_by(|a, b| {
        b.hybrid_score
            .partial_cmp(&a.hybrid_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::Chunk;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn test_recency_bounds() {
        let config = BoostConfig::default();
        assert_eq!(recency_boost(Some(0), &config), 0.5);
        assert_eq!(recency_boost(Some(-3), &config), 0.5);
        assert_eq!(recency_boost(Some(365), &config), 0.0);
        assert_eq!(recency_boost(Some(900), &config), 0.0);
        assert_eq!(recency_boost(None, &config), 0.0);

        for days in 0..400 {
            let boost = recency_boost(Some(days), &config);
            assert!((0.0..=0.5).contains(&boost), "boost {} at {} days", boost, days);
        }

        let quarter = recency_boost(Some(365 / 4), &config);
        assert!((quarter - 0.5 * (1.0 - (91.0f64 / 365.0).sqrt())).abs() < 1e-12);
    }

    #[test]
    fn test_parse_modified_date() {
        let expected = NaiveDate::from_ymd_opt(2025, 5, 2);
        assert_eq!(parse_modified_date("2025-05-02"), expected);
        assert_eq!(parse_modified_date("2025-05-02T08:30:00"), expected);
        assert_eq!(parse_modified_date("2025-05-02T08:30:00Z"), expected);
        assert_eq!(parse_modified_date("2025-05-02T08:30:00.123+00:00"), expected);
        assert_eq!(parse_modified_date("yesterday"), None);
    }

    #[test]
    fn test_days_old() {
        assert_eq!(days_old(Some("2025-05-31"), today()), Some(1));
        assert_eq!(days_old(Some("garbage"), today()), None);
        assert_eq!(days_old(None, today()), None);
    }

    #[test]
    fn test_undated_chunks_are_neutral() {
        let mut hits = vec![RankedHit::new(Chunk::new("a::0", "x"), 0.02)];
        apply_boosts(&mut hits, &BTreeSet::new(), true, today(), &BoostConfig::default());
        assert_eq!(hits[0].hybrid_score, 0.02);
    }

    #[test]
    fn test_filename_boost_is_exact_and_applied_once() {
        let chunk = Chunk::for_file("/vault/People/Alex Jane.md", 0, "contact card");
        let mut hits = vec![RankedHit::new(chunk, 0.03)];
        let identities: BTreeSet<String> = ["alex".to_string(), "jane".to_string()].into();

        apply_boosts(&mut hits, &identities, false, today(), &BoostConfig::default());
        assert_eq!(hits[0].hybrid_score, 0.03 * 2.0);
    }

    #[test]
    fn test_recency_and_identity_compose() {
        let chunk = Chunk::for_file("/vault/Alex.md", 2, "x").with_modified_date("2025-06-01");
        let mut hits = vec![RankedHit::new(chunk, 0.01)];
        let identities: BTreeSet<String> = ["alex".to_string()].into();

        apply_boosts(&mut hits, &identities, true, today(), &BoostConfig::default());
        assert!((hits[0].hybrid_score - 0.01 * 1.5 * 2.0).abs() < 1e-12);
    }
}
