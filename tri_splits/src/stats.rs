//! Small numeric helpers shared by the scatter chart: least-squares trend
//! fitting and the padded/nice axis domain math.

/// Fraction of the data span added on each side of a padded domain.
pub const PAD_FRAC: f64 = 0.2;
/// A padded domain never spans less than this fraction of the data bounds.
pub const MIN_FRACTION: f64 = 0.25;
/// Brush selections narrower than this many pixels on either axis cancel.
pub const MIN_BRUSH_PX: f64 = 4.0;

const SPAN_FLOOR: f64 = 1e-9;

/// Ordinary least-squares fit of y on x.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrendFit {
    pub slope: f64,
    pub intercept: f64,
    pub correlation: f64,
}

impl TrendFit {
    pub fn y_at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Closed-form OLS over (x, y) pairs. Returns `None` for fewer than two
/// points. A zero x-variance fit degrades to a horizontal line through
/// the mean of y with zero correlation rather than dividing by zero.
pub fn ols(points: &[(f64, f64)]) -> Option<TrendFit> {
    let n = points.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_xx, mut sum_yy) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for &(x, y) in points {
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_xx += x * x;
        sum_yy += y * y;
    }
    let denom = n_f * sum_xx - sum_x * sum_x;
    if denom == 0.0 {
        return Some(TrendFit {
            slope: 0.0,
            intercept: sum_y / n_f,
            correlation: 0.0,
        });
    }
    let slope = (n_f * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n_f;
    let r_denom = (denom * (n_f * sum_yy - sum_y * sum_y)).sqrt();
    let correlation = if r_denom == 0.0 {
        0.0
    } else {
        (n_f * sum_xy - sum_x * sum_y) / r_denom
    };
    Some(TrendFit {
        slope,
        intercept,
        correlation,
    })
}

/// (min, max) of a value sequence, ignoring non-finite entries.
pub fn extent<I: IntoIterator<Item = f64>>(values: I) -> Option<(f64, f64)> {
    let mut bounds: Option<(f64, f64)> = None;
    for v in values {
        if !v.is_finite() {
            continue;
        }
        bounds = Some(match bounds {
            None => (v, v),
            Some((lo, hi)) => (lo.min(v), hi.max(v)),
        });
    }
    bounds
}

/// Round `max` up to a visually tidy axis limit: the next multiple of a
/// power-of-ten step sized to the magnitude of the value.
pub fn nice_extent(max: f64) -> f64 {
    if !max.is_finite() || max <= 0.0 {
        return 1.0;
    }
    let step = 10f64.powf(max.log10().floor());
    let scaled = (max / step).ceil();
    // A limit flush against the data reads badly; bump one more step.
    let scaled = if (max / step).fract() == 0.0 {
        scaled + 1.0
    } else {
        scaled
    };
    scaled * step
}

/// Pad `[lo, hi]` outward by [`PAD_FRAC`] of its span, enforce a minimum
/// width of [`MIN_FRACTION`] of the clamp bounds' span, then shift and clamp
/// the window back inside `[bound_lo, bound_hi]`.
pub fn padded_domain(lo: f64, hi: f64, bound_lo: f64, bound_hi: f64) -> (f64, f64) {
    let span = (hi - lo).max(SPAN_FLOOR);
    let mut start = lo - span * PAD_FRAC;
    let mut end = hi + span * PAD_FRAC;

    let min_width = (bound_hi - bound_lo).max(SPAN_FLOOR) * MIN_FRACTION;
    if end - start < min_width {
        let mid = (start + end) / 2.0;
        start = mid - min_width / 2.0;
        end = mid + min_width / 2.0;
    }

    if start < bound_lo {
        end += bound_lo - start;
        start = bound_lo;
    }
    if end > bound_hi {
        start -= end - bound_hi;
        end = bound_hi;
    }
    (start.max(bound_lo), end.min(bound_hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ols_recovers_exact_line() {
        let pts = [(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)];
        let fit = ols(&pts).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!((fit.correlation - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ols_correlation_stays_bounded() {
        let pts = [(1.0, 4.0), (2.0, 1.0), (3.0, 7.0), (4.0, 2.0), (5.0, 9.0)];
        let fit = ols(&pts).unwrap();
        assert!(fit.correlation >= -1.0 && fit.correlation <= 1.0 + 1e-12);
    }

    #[test]
    fn ols_vertical_points_degrade_gracefully() {
        let fit = ols(&[(5.0, 1.0), (5.0, 9.0)]).unwrap();
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.intercept, 5.0);
        assert_eq!(fit.correlation, 0.0);
    }

    #[test]
    fn ols_needs_two_points() {
        assert!(ols(&[]).is_none());
        assert!(ols(&[(1.0, 2.0)]).is_none());
    }

    #[test]
    fn extent_skips_non_finite() {
        let (lo, hi) = extent([3.0, f64::NAN, -1.0, 7.0]).unwrap();
        assert_eq!((lo, hi), (-1.0, 7.0));
        assert!(extent([f64::NAN]).is_none());
    }

    #[test]
    fn nice_extent_rounds_up() {
        assert_eq!(nice_extent(87.0), 90.0);
        assert_eq!(nice_extent(100.0), 200.0);
        assert_eq!(nice_extent(0.0), 1.0);
    }

    #[test]
    fn padded_domain_widens_and_centers() {
        let (lo, hi) = padded_domain(10.0, 20.0, 0.0, 100.0);
        assert!(hi - lo >= 25.0);
        let mid = (lo + hi) / 2.0;
        assert!((mid - 15.0).abs() < 1e-9);
    }

    #[test]
    fn padded_domain_clamps_to_bounds() {
        let (lo, hi) = padded_domain(0.0, 5.0, 0.0, 100.0);
        assert!(lo >= 0.0);
        assert!(hi <= 100.0);
        assert!(hi - lo >= 25.0);

        let (lo, hi) = padded_domain(98.0, 100.0, 0.0, 100.0);
        assert_eq!(hi, 100.0);
        assert!(hi - lo >= 25.0);
    }

    #[test]
    fn padded_domain_survives_zero_span() {
        let (lo, hi) = padded_domain(50.0, 50.0, 0.0, 100.0);
        assert!(lo < 50.0 && hi > 50.0);
    }
}
