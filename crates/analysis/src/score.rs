use pa_core::{FingerprintFlags, RiskLevel};

#[derive(Debug, Clone)]
pub struct ScoreInputs {
    pub tracker_count: i32,
    pub cookie_count: i32,
    pub is_https: bool,
    pub has_csp: bool,
    pub fingerprints: FingerprintFlags,
    pub any_tracking_param: bool,
    pub inline_tracker_scripts: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct PrivacyScore {
    pub score: i32,
    pub risk_level: RiskLevel,
}

/// Privacy score deduction table (spec.md §4.I "Privacy score"). Starts at 100,
/// applies fixed deductions, clamps to [0, 100].
pub fn compute(inputs: &ScoreInputs) -> PrivacyScore {
    let mut score: i32 = 100;

    score -= 8 * inputs.tracker_count;
    if inputs.cookie_count > 20 {
        score -= 10;
    }
    if !inputs.is_https {
        score -= 20;
    }
    if inputs.fingerprints.canvas {
        score -= 15;
    }
    if inputs.fingerprints.webgl {
        score -= 10;
    }
    if inputs.fingerprints.font {
        score -= 8;
    }
    if inputs.fingerprints.keylogger {
        score -= 15;
    }
    if inputs.fingerprints.form_snooping {
        score -= 8;
    }
    if !inputs.fingerprints.beacon_calls.is_empty() {
        score -= 8;
    }
    if inputs.fingerprints.service_worker {
        score -= 5;
    }
    if inputs.any_tracking_param {
        score -= 10;
    }
    if !inputs.has_csp {
        score -= 5;
    }
    if inputs.inline_tracker_scripts > 0 {
        score -= 5;
    }

    let score = score.clamp(0, 100);
    PrivacyScore { score, risk_level: RiskLevel::from_score(score) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline() -> ScoreInputs {
        ScoreInputs {
            tracker_count: 0,
            cookie_count: 0,
            is_https: true,
            has_csp: true,
            fingerprints: FingerprintFlags::default(),
            any_tracking_param: false,
            inline_tracker_scripts: 0,
        }
    }

    #[test]
    fn clean_site_scores_100_low_risk() {
        let result = compute(&baseline());
        assert_eq!(result.score, 100);
        assert_eq!(result.risk_level, RiskLevel::Low);
    }

    #[test]
    fn http_without_csp_deducts_25() {
        let mut inputs = baseline();
        inputs.is_https = false;
        inputs.has_csp = false;
        let result = compute(&inputs);
        assert_eq!(result.score, 75);
    }

    #[test]
    fn score_never_goes_below_zero() {
        let mut inputs = baseline();
        inputs.tracker_count = 50;
        inputs.is_https = false;
        inputs.fingerprints.canvas = true;
        inputs.fingerprints.webgl = true;
        inputs.fingerprints.font = true;
        inputs.fingerprints.keylogger = true;
        inputs.fingerprints.form_snooping = true;
        let result = compute(&inputs);
        assert_eq!(result.score, 0);
        assert_eq!(result.risk_level, RiskLevel::High);
    }

    #[test]
    fn heavily_tracked_site_is_high_risk() {
        let mut inputs = baseline();
        inputs.tracker_count = 8;
        inputs.cookie_count = 25;
        let result = compute(&inputs);
        assert_eq!(result.score, 100 - 64 - 10);
        assert_eq!(result.risk_level, RiskLevel::High);
    }
}
