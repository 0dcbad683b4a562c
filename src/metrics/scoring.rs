//! Score preparation applied before metrics see a prediction

/// Replace non-finite scores: `NaN` and `-inf` become 0, `+inf` becomes 1.
pub fn sanitize_scores(scores: &mut [f64]) {
    for score in scores.iter_mut() {
        if score.is_nan() || *score == f64::NEG_INFINITY {
            *score = 0.0;
        } else if *score == f64::INFINITY {
            *score = 1.0;
        }
    }
}

/// Scale scores linearly onto `[0, 1]`.
///
/// Min and max are taken over finite values only; non-finite values are left
/// in place. A constant series maps to all zeros.
pub fn scale_min_max(scores: &mut [f64]) {
    let (min, max) = scores
        .iter()
        .filter(|s| s.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &s| {
            (lo.min(s), hi.max(s))
        });
    if !min.is_finite() {
        return;
    }

    let range = max - min;
    for score in scores.iter_mut().filter(|s| s.is_finite()) {
        *score = if range > 0.0 { (*score - min) / range } else { 0.0 };
    }
}

/// Prepare a raw prediction for scoring.
///
/// Scaling (when `normalize` is set) runs before non-finite values are
/// replaced, so an infinite score cannot flatten the finite ones.
#[must_use]
pub fn prepare_scores(mut scores: Vec<f64>, normalize: bool) -> Vec<f64> {
    if normalize {
        scale_min_max(&mut scores);
    }
    sanitize_scores(&mut scores);
    scores
}
