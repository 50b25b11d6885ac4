/// Scoring Engine - Pure Arithmetic
///
/// Knows nothing about execution, containers or persistence. Everything
/// here is a total function over small integers, clamped to 0..=100.

/// Automated score from the test pass ratio. Zero total means zero score.
pub fn auto_score(passed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    clamp((f64::from(passed) / f64::from(total)) * 100.0)
}

/// Manual rubric score from four 0-5 ratings; missing ratings count as 0.
pub fn manual_score(ratings: [Option<u8>; 4]) -> u8 {
    let sum: u32 = ratings
        .iter()
        .map(|r| u32::from(r.unwrap_or(0).min(5)))
        .sum();
    clamp(f64::from(sum) / 20.0 * 100.0)
}

/// Weighted combination of automatic and manual scores.
pub fn final_score(auto: u8, manual: u8) -> u8 {
    clamp(f64::from(auto) * 0.4 + f64::from(manual) * 0.6)
}

/// Interviewer override takes precedence over the computed auto score.
/// Precedence only; nothing is recomputed.
pub fn effective_auto_score(computed: u8, adjusted: Option<u8>) -> u8 {
    match adjusted {
        Some(score) => score.min(100),
        None => computed,
    }
}

fn clamp(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_score_zero_total() {
        assert_eq!(auto_score(0, 0), 0);
    }

    #[test]
    fn test_auto_score_all_passed() {
        for total in [1, 3, 17] {
            assert_eq!(auto_score(total, total), 100);
        }
    }

    #[test]
    fn test_auto_score_partial() {
        assert_eq!(auto_score(3, 5), 60);
        assert_eq!(auto_score(1, 3), 33);
        assert_eq!(auto_score(2, 3), 67);
    }

    #[test]
    fn test_auto_score_monotonic_in_passed() {
        let total = 7;
        let mut last = 0;
        for passed in 0..=total {
            let score = auto_score(passed, total);
            assert!(score >= last);
            last = score;
        }
    }

    #[test]
    fn test_manual_score_full_marks() {
        assert_eq!(manual_score([Some(5), Some(5), Some(5), Some(5)]), 100);
    }

    #[test]
    fn test_manual_score_missing_ratings_count_as_zero() {
        assert_eq!(manual_score([None, None, None, None]), 0);
        assert_eq!(manual_score([Some(4), None, Some(2), None]), 30);
    }

    #[test]
    fn test_manual_score_out_of_range_rating_is_capped() {
        assert_eq!(manual_score([Some(9), Some(5), Some(5), Some(5)]), 100);
    }

    #[test]
    fn test_final_score_weighting() {
        assert_eq!(final_score(100, 100), 100);
        assert_eq!(final_score(0, 0), 0);
        assert_eq!(final_score(100, 0), 40);
        assert_eq!(final_score(0, 100), 60);
        assert_eq!(final_score(60, 75), 69);
    }

    #[test]
    fn test_final_score_in_range_for_all_inputs() {
        for auto in (0..=100).step_by(10) {
            for manual in (0..=100).step_by(10) {
                let score = final_score(auto, manual);
                assert!(score <= 100);
            }
        }
    }

    #[test]
    fn test_effective_auto_score_override_precedence() {
        assert_eq!(effective_auto_score(40, None), 40);
        assert_eq!(effective_auto_score(40, Some(85)), 85);
        assert_eq!(effective_auto_score(40, Some(250)), 100);
    }
}
