//! Device identifier normalization and matching.
//!
//! GenTL producers decorate device ids differently: some prepend module
//! tokens ("dev_", "DeviceModule"), some separate MAC octets with colons,
//! dashes or underscores, some append vendor suffixes. Normalization strips
//! all of that so the configured identifier can be matched by substring
//! containment against whatever the producer reports. The token list is not
//! exhaustive; it covers the producer stacks seen in the field so far.

use crate::error::{CamError, CamResult};
use crate::transport::DeviceInfo;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Module prefix/suffix tokens some producers add around the physical id.
#[allow(clippy::expect_used)]
static DEVICE_TOKENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(DEVICEMODULE?)|(DEV)").expect("static pattern"));

/// Separator characters that vary between producer stacks.
#[allow(clippy::expect_used)]
static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-.:,;_\s]").expect("static pattern"));

/// Normalize an identifier for comparison: uppercase, module tokens and
/// separator characters removed.
pub fn normalize_identifier(raw: &str) -> String {
    let upper = raw.to_uppercase();
    let no_tokens = DEVICE_TOKENS.replace_all(&upper, "");
    SEPARATORS.replace_all(&no_tokens, "").into_owned()
}

/// Collapse duplicate enumeration entries, keeping first occurrences.
///
/// Some producer/driver combinations report the same device twice; the
/// duplicate would otherwise look like a second matching camera. This is a
/// pure filtering step over the enumerated list, the provider's own cache is
/// never touched.
pub fn dedup_candidates(candidates: &[DeviceInfo]) -> Vec<DeviceInfo> {
    let mut seen: Vec<&str> = Vec::with_capacity(candidates.len());
    let mut unique = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if seen.contains(&candidate.id.as_str()) {
            debug!(id = %candidate.id, "dropping duplicate enumeration entry");
            continue;
        }
        seen.push(candidate.id.as_str());
        unique.push(candidate.clone());
    }
    unique
}

/// Select the single device to bind for `target` among `candidates`.
///
/// Candidates are deduplicated by raw id, then scanned in enumeration
/// order. The first candidate whose normalized id contains the normalized
/// target wins; any later match is logged as a conflict and skipped so the
/// session never binds more than one device. No match at all is a fatal
/// identity error.
pub fn select_device(target: &str, candidates: &[DeviceInfo]) -> CamResult<DeviceInfo> {
    let wanted = normalize_identifier(target);
    let mut selected: Option<DeviceInfo> = None;

    for candidate in dedup_candidates(candidates) {
        let normalized = normalize_identifier(&candidate.id);
        debug!(candidate = %normalized, target = %wanted, "comparing device identifier");

        if !normalized.contains(wanted.as_str()) {
            continue;
        }
        if let Some(bound) = &selected {
            warn!(
                candidate = %candidate.id,
                bound = %bound.id,
                "identifier also matches '{}', skipping; one device per session",
                candidate.id
            );
            continue;
        }
        selected = Some(candidate);
    }

    selected.ok_or_else(|| CamError::IdentifierMismatch {
        identifier: target.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str) -> DeviceInfo {
        DeviceInfo {
            id: id.to_string(),
            vendor: None,
            model: None,
        }
    }

    #[test]
    fn normalization_is_idempotent_on_typical_ids() {
        for raw in ["00:11:22:33:44:55", "dev_AA-BB-CC", "DeviceModule 0011.2233"] {
            let once = normalize_identifier(raw);
            assert_eq!(normalize_identifier(&once), once);
        }
    }

    #[test]
    fn matching_ignores_case_and_separators() {
        let candidates = [info("PREFIX_AABBCC_DEV")];
        let selected = select_device("aa:bb-cc", &candidates).unwrap();
        assert_eq!(selected.id, "PREFIX_AABBCC_DEV");
    }

    #[test]
    fn module_tokens_are_stripped() {
        assert_eq!(normalize_identifier("dev_00aabb"), "00AABB");
        assert_eq!(normalize_identifier("DeviceModule00aabb"), "00AABB");
    }

    #[test]
    fn duplicates_collapse_to_first_occurrence() {
        let candidates = [info("cam0"), info("cam0"), info("cam1")];
        let unique = dedup_candidates(&candidates);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].id, "cam0");
        assert_eq!(unique[1].id, "cam1");
    }

    #[test]
    fn first_match_wins_over_later_conflicts() {
        let candidates = [info("other"), info("AABBCC-first"), info("AABBCC-second")];
        let selected = select_device("AA:BB:CC", &candidates).unwrap();
        assert_eq!(selected.id, "AABBCC-first");
    }

    #[test]
    fn no_match_is_an_identity_error() {
        let candidates = [info("cam0"), info("cam1")];
        let err = select_device("ff:ee:dd", &candidates).unwrap_err();
        assert!(matches!(err, CamError::IdentifierMismatch { .. }));
    }
}
