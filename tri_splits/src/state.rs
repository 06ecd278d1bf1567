//! Per-chart interaction state and the pure view computations the renderers
//! consume. Nothing here draws: each `*_view` function maps (dataset, state)
//! to a plain description of what the chart should show.

use crate::divisions::{division_averages, DivisionAverage};
use crate::stats::{extent, nice_extent, ols, padded_domain, TrendFit, MIN_BRUSH_PX, PAD_FRAC};
use crate::{row_splits, Dataset, Metric, Split, TriError};

/// The athlete selected when the dataset contains them, matching the
/// sample data this tool ships with.
pub const DEFAULT_ATHLETE: &str = "Reed, Tim";

/// Which scatter axis a control is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// Selections driving the split-times bar chart.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitsState {
    pub athlete_a: String,
    pub athlete_b: Option<String>,
}

impl SplitsState {
    /// Initial selection: the default athlete when present, otherwise the
    /// first name in sorted order. The comparison slot starts empty.
    pub fn default_for(dataset: &Dataset) -> Self {
        let names = dataset.athlete_names();
        let athlete_a = if names.iter().any(|n| n == DEFAULT_ATHLETE) {
            DEFAULT_ATHLETE.to_string()
        } else {
            names.first().cloned().unwrap_or_default()
        };
        Self {
            athlete_a,
            athlete_b: None,
        }
    }

    /// First athlete other than the primary, used to seed the comparison
    /// dropdown when the user turns it on.
    pub fn suggest_comparison(&self, dataset: &Dataset) -> Option<String> {
        dataset
            .athlete_names()
            .into_iter()
            .find(|n| *n != self.athlete_a)
    }
}

/// One bar series in the splits chart.
#[derive(Clone, Debug, PartialEq)]
pub struct AthleteSplits {
    pub name: String,
    pub splits: Vec<Split>,
}

impl AthleteSplits {
    pub fn secs_for(&self, metric: Metric) -> Option<f64> {
        self.splits
            .iter()
            .find(|s| s.metric == metric)
            .map(|s| s.secs)
    }
}

/// Everything the splits bar chart needs to draw. `categories` holds only
/// the metrics at least one selected athlete has a value for.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitsView {
    pub title: String,
    pub categories: Vec<Metric>,
    pub series: Vec<AthleteSplits>,
    pub y_max: f64,
}

pub fn splits_view(dataset: &Dataset, state: &SplitsState) -> Result<SplitsView, TriError> {
    let mut series = Vec::with_capacity(2);
    let primary = dataset
        .athlete(&state.athlete_a)
        .ok_or_else(|| TriError::UnknownAthlete(state.athlete_a.clone()))?;
    series.push(AthleteSplits {
        name: primary.name.clone(),
        splits: row_splits(primary),
    });
    if let Some(name_b) = &state.athlete_b {
        let secondary = dataset
            .athlete(name_b)
            .ok_or_else(|| TriError::UnknownAthlete(name_b.clone()))?;
        series.push(AthleteSplits {
            name: secondary.name.clone(),
            splits: row_splits(secondary),
        });
    }

    let title = match &state.athlete_b {
        Some(b) => format!("Split Times - {} vs {}", state.athlete_a, b),
        None => format!("Split Times - {}", state.athlete_a),
    };
    let all_secs = series.iter().flat_map(|a| a.splits.iter().map(|s| s.secs));
    let y_max = nice_extent(extent(all_secs).map(|(_, hi)| hi).unwrap_or(0.0));

    let categories: Vec<Metric> = Metric::ALL
        .iter()
        .copied()
        .filter(|&metric| series.iter().any(|a| a.secs_for(metric).is_some()))
        .collect();

    Ok(SplitsView {
        title,
        categories,
        series,
        y_max,
    })
}

/// A zoomed axis window in data coordinates (seconds on both axes).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomWindow {
    pub x: (f64, f64),
    pub y: (f64, f64),
}

/// Selections driving the metric-vs-metric scatter chart.
#[derive(Clone, Debug, PartialEq)]
pub struct ScatterState {
    pub x_metric: Metric,
    pub y_metric: Metric,
    pub trend: bool,
    pub zoom: Option<ZoomWindow>,
}

impl Default for ScatterState {
    fn default() -> Self {
        Self {
            x_metric: Metric::Bike,
            y_metric: Metric::Run,
            trend: true,
            zoom: None,
        }
    }
}

impl ScatterState {
    /// Bind a metric to an axis. Any active zoom window is meaningless
    /// under the new metric and is dropped. If the assignment would leave
    /// both axes on the same metric, the axis the user did NOT touch moves
    /// to the first remaining candidate.
    pub fn set_axis_metric(&mut self, axis: Axis, metric: Metric) {
        self.zoom = None;
        match axis {
            Axis::X => self.x_metric = metric,
            Axis::Y => self.y_metric = metric,
        }
        if self.x_metric == self.y_metric {
            let replacement = Metric::SCATTER
                .iter()
                .copied()
                .find(|m| *m != metric)
                .unwrap_or(Metric::Swim);
            match axis {
                Axis::X => self.y_metric = replacement,
                Axis::Y => self.x_metric = replacement,
            }
        }
    }

    pub fn clear_zoom(&mut self) {
        self.zoom = None;
    }
}

/// One athlete's position on the scatter chart.
#[derive(Clone, Debug, PartialEq)]
pub struct ScatterPoint {
    pub name: String,
    pub x: f64,
    pub y: f64,
}

/// All rows where both axis metrics parse. Rows missing either time are
/// left off the chart rather than plotted at zero.
pub fn scatter_points(dataset: &Dataset, x_metric: Metric, y_metric: Metric) -> Vec<ScatterPoint> {
    dataset
        .rows()
        .iter()
        .filter_map(|row| {
            let x = row.metric_secs(x_metric)?;
            let y = row.metric_secs(y_metric)?;
            Some(ScatterPoint {
                name: row.name.clone(),
                x,
                y,
            })
        })
        .collect()
}

/// Everything the scatter chart needs to draw. `points` is already
/// restricted to the zoom window, and `trend` is fit over those visible
/// points only.
#[derive(Clone, Debug, PartialEq)]
pub struct ScatterView {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub points: Vec<ScatterPoint>,
    pub x_domain: (f64, f64),
    pub y_domain: (f64, f64),
    pub trend: Option<TrendFit>,
}

impl ScatterView {
    /// Trend line endpoints spanning the visible x range.
    pub fn trend_endpoints(&self) -> Option<((f64, f64), (f64, f64))> {
        let fit = self.trend?;
        let (lo, hi) = self.x_domain;
        Some(((lo, fit.y_at(lo)), (hi, fit.y_at(hi))))
    }
}

pub fn scatter_view(dataset: &Dataset, state: &ScatterState) -> ScatterView {
    let all = scatter_points(dataset, state.x_metric, state.y_metric);
    let x_bounds = extent(all.iter().map(|p| p.x)).unwrap_or((0.0, 1.0));
    let y_bounds = extent(all.iter().map(|p| p.y)).unwrap_or((0.0, 1.0));

    let (x_domain, y_domain) = match state.zoom {
        Some(window) => (window.x, window.y),
        None => (pad_out(x_bounds), pad_out(y_bounds)),
    };

    let points: Vec<ScatterPoint> = all
        .into_iter()
        .filter(|p| {
            p.x >= x_domain.0 && p.x <= x_domain.1 && p.y >= y_domain.0 && p.y <= y_domain.1
        })
        .collect();

    let trend = if state.trend {
        ols(&points.iter().map(|p| (p.x, p.y)).collect::<Vec<_>>())
    } else {
        None
    };

    ScatterView {
        title: format!("{} vs {}", state.x_metric, state.y_metric),
        x_label: format!("{} time", state.x_metric),
        y_label: format!("{} time", state.y_metric),
        points,
        x_domain,
        y_domain,
        trend,
    }
}

/// Unzoomed axes sit a little off the data on both sides.
fn pad_out((lo, hi): (f64, f64)) -> (f64, f64) {
    let pad = (hi - lo).max(1e-9) * PAD_FRAC;
    (lo - pad, hi + pad)
}

/// Map a pixel-space brush rectangle into a data-space zoom window.
/// Selections thinner than [`MIN_BRUSH_PX`] on either side are treated as a
/// stray click and cancel the brush. Pixel y grows downward, data y upward.
pub fn brush_zoom(
    corner_a: (f64, f64),
    corner_b: (f64, f64),
    plot_size: (f64, f64),
    x_domain: (f64, f64),
    y_domain: (f64, f64),
) -> Option<ZoomWindow> {
    let (plot_w, plot_h) = plot_size;
    if plot_w <= 0.0 || plot_h <= 0.0 {
        return None;
    }
    let px_lo = corner_a.0.min(corner_b.0);
    let px_hi = corner_a.0.max(corner_b.0);
    let py_lo = corner_a.1.min(corner_b.1);
    let py_hi = corner_a.1.max(corner_b.1);
    if px_hi - px_lo < MIN_BRUSH_PX || py_hi - py_lo < MIN_BRUSH_PX {
        return None;
    }

    let x_at = |px: f64| x_domain.0 + (px / plot_w) * (x_domain.1 - x_domain.0);
    let y_at = |py: f64| y_domain.0 + ((plot_h - py) / plot_h) * (y_domain.1 - y_domain.0);
    Some(ZoomWindow {
        x: (x_at(px_lo), x_at(px_hi)),
        // The top pixel edge is the high data value.
        y: (y_at(py_hi), y_at(py_lo)),
    })
}

/// Pad a raw data-space window and clamp it inside the data bounds, so a
/// tight brush still leaves some context around the selected points.
pub fn zoom_to(window: ZoomWindow, x_bounds: (f64, f64), y_bounds: (f64, f64)) -> ZoomWindow {
    ZoomWindow {
        x: padded_domain(window.x.0, window.x.1, x_bounds.0, x_bounds.1),
        y: padded_domain(window.y.0, window.y.1, y_bounds.0, y_bounds.1),
    }
}

/// Everything the division-averages bar chart needs to draw.
#[derive(Clone, Debug, PartialEq)]
pub struct DivisionsView {
    pub title: String,
    pub bars: Vec<DivisionAverage>,
    pub y_max: f64,
}

pub fn divisions_view(dataset: &Dataset) -> DivisionsView {
    let bars = division_averages(dataset.rows());
    let y_max = nice_extent(
        extent(bars.iter().map(|b| b.mean_overall_secs))
            .map(|(_, hi)| hi)
            .unwrap_or(0.0),
    );
    DivisionsView {
        title: "Average Overall Time by Division".to_string(),
        bars,
        y_max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let csv = "Name,Gender,Division,Swim,Bike,Run,Overall\n\
                   \"Reed, Tim\",Male,MPRO,0:44:02,4:31:27,2:47:57,8:07:59\n\
                   \"Doe, Jane\",Female,F35-39,1:02:10,5:40:00,3:30:00,10:20:45\n\
                   \"Ax, Bo\",Male,M40-44,1:10:00,5:50:00,3:40:00,10:50:00\n";
        Dataset::from_bytes(csv.as_bytes()).unwrap()
    }

    #[test]
    fn default_splits_state_prefers_known_athlete() {
        let state = SplitsState::default_for(&sample());
        assert_eq!(state.athlete_a, "Reed, Tim");
        assert_eq!(state.athlete_b, None);
    }

    #[test]
    fn default_splits_state_falls_back_to_first_name() {
        let csv = "Name,Gender,Division,Swim,Bike,Run,Overall\n\
                   Zed,Male,MPRO,0:44:02,4:31:27,2:47:57,8:07:59\n\
                   Abe,Male,MPRO,0:45:00,4:40:00,2:50:00,8:20:00\n";
        let dataset = Dataset::from_bytes(csv.as_bytes()).unwrap();
        let state = SplitsState::default_for(&dataset);
        assert_eq!(state.athlete_a, "Abe");
    }

    #[test]
    fn suggested_comparison_skips_primary() {
        let dataset = sample();
        let state = SplitsState::default_for(&dataset);
        assert_eq!(state.suggest_comparison(&dataset).as_deref(), Some("Ax, Bo"));
    }

    #[test]
    fn splits_view_single_and_comparison_titles() {
        let dataset = sample();
        let mut state = SplitsState::default_for(&dataset);
        let view = splits_view(&dataset, &state).unwrap();
        assert_eq!(view.title, "Split Times - Reed, Tim");
        assert_eq!(view.series.len(), 1);

        state.athlete_b = Some("Doe, Jane".to_string());
        let view = splits_view(&dataset, &state).unwrap();
        assert_eq!(view.title, "Split Times - Reed, Tim vs Doe, Jane");
        assert_eq!(view.series.len(), 2);
        assert!(view.y_max >= 10.0 * 3600.0 + 20.0 * 60.0 + 45.0);
    }

    #[test]
    fn splits_view_drops_empty_categories() {
        let csv = "Name,Gender,Division,Swim,Bike,Run,Overall\n\
                   A,Male,MPRO,,4:31:27,2:47:57,\n";
        let dataset = Dataset::from_bytes(csv.as_bytes()).unwrap();
        let state = SplitsState {
            athlete_a: "A".to_string(),
            athlete_b: None,
        };
        let view = splits_view(&dataset, &state).unwrap();
        assert_eq!(view.categories, vec![Metric::Bike, Metric::Run]);
    }

    #[test]
    fn splits_view_rejects_unknown_athlete() {
        let dataset = sample();
        let state = SplitsState {
            athlete_a: "Nobody".to_string(),
            athlete_b: None,
        };
        assert!(matches!(
            splits_view(&dataset, &state),
            Err(TriError::UnknownAthlete(_))
        ));
    }

    #[test]
    fn axis_change_reassigns_the_untouched_axis() {
        let mut state = ScatterState::default();
        // x Bike, y Run. Setting x to Run collides, so y moves off Run.
        state.set_axis_metric(Axis::X, Metric::Run);
        assert_eq!(state.x_metric, Metric::Run);
        assert_eq!(state.y_metric, Metric::Swim);

        // Setting y to the current x moves x instead.
        state.set_axis_metric(Axis::Y, Metric::Run);
        assert_eq!(state.y_metric, Metric::Run);
        assert_eq!(state.x_metric, Metric::Swim);
    }

    #[test]
    fn axis_change_without_collision_keeps_both() {
        let mut state = ScatterState::default();
        state.set_axis_metric(Axis::X, Metric::Swim);
        assert_eq!(state.x_metric, Metric::Swim);
        assert_eq!(state.y_metric, Metric::Run);
    }

    #[test]
    fn axis_change_drops_zoom() {
        let mut state = ScatterState::default();
        state.zoom = Some(ZoomWindow {
            x: (0.0, 1.0),
            y: (0.0, 1.0),
        });
        state.set_axis_metric(Axis::X, Metric::Swim);
        assert_eq!(state.zoom, None);
    }

    #[test]
    fn scatter_points_drop_rows_missing_either_metric() {
        let csv = "Name,Gender,Division,Swim,Bike,Run,Overall\n\
                   A,Male,MPRO,0:30:00,4:00:00,3:00:00,7:45:00\n\
                   B,Male,MPRO,,4:10:00,3:05:00,7:50:00\n";
        let dataset = Dataset::from_bytes(csv.as_bytes()).unwrap();
        assert_eq!(scatter_points(&dataset, Metric::Swim, Metric::Run).len(), 1);
        assert_eq!(scatter_points(&dataset, Metric::Bike, Metric::Run).len(), 2);
    }

    #[test]
    fn scatter_view_fits_trend_over_visible_points_only() {
        let csv = "Name,Gender,Division,Swim,Bike,Run,Overall\n\
                   A,Male,MPRO,0:30:00,1:00:00,1:00:00,3:00:00\n\
                   B,Male,MPRO,0:31:00,2:00:00,2:00:00,5:00:00\n\
                   C,Male,MPRO,0:32:00,3:00:00,3:00:00,7:00:00\n\
                   D,Male,MPRO,0:33:00,9:00:00,1:00:00,11:00:00\n";
        let dataset = Dataset::from_bytes(csv.as_bytes()).unwrap();
        let mut state = ScatterState::default();

        let full = scatter_view(&dataset, &state);
        assert_eq!(full.points.len(), 4);

        // Zoom to exclude the outlier D; the remaining points are collinear.
        state.zoom = Some(ZoomWindow {
            x: (0.0, 4.0 * 3600.0),
            y: (0.0, 4.0 * 3600.0),
        });
        let zoomed = scatter_view(&dataset, &state);
        assert_eq!(zoomed.points.len(), 3);
        let fit = zoomed.trend.unwrap();
        assert!((fit.correlation - 1.0).abs() < 1e-9);
        assert!((fit.slope - 1.0).abs() < 1e-9);
    }

    #[test]
    fn scatter_view_trend_off() {
        let dataset = sample();
        let state = ScatterState {
            trend: false,
            ..ScatterState::default()
        };
        assert!(scatter_view(&dataset, &state).trend.is_none());
    }

    #[test]
    fn brush_cancels_degenerate_selections() {
        let domain = (0.0, 100.0);
        assert!(brush_zoom((10.0, 10.0), (12.0, 80.0), (200.0, 200.0), domain, domain).is_none());
        assert!(brush_zoom((10.0, 10.0), (80.0, 12.0), (200.0, 200.0), domain, domain).is_none());
    }

    #[test]
    fn brush_maps_pixels_with_inverted_y() {
        let window = brush_zoom(
            (50.0, 150.0),
            (150.0, 50.0),
            (200.0, 200.0),
            (0.0, 100.0),
            (0.0, 100.0),
        )
        .unwrap();
        assert_eq!(window.x, (25.0, 75.0));
        // Pixel rows 50..150 on a 200 px plot are data 25..75, low first.
        assert_eq!(window.y, (25.0, 75.0));
    }

    #[test]
    fn zoom_to_pads_and_clamps() {
        let window = ZoomWindow {
            x: (10.0, 20.0),
            y: (95.0, 100.0),
        };
        let zoomed = zoom_to(window, (0.0, 100.0), (0.0, 100.0));
        assert!(zoomed.x.1 - zoomed.x.0 >= 25.0);
        assert!(zoomed.y.1 <= 100.0);
        assert!(zoomed.y.1 - zoomed.y.0 >= 25.0);
    }

    #[test]
    fn divisions_view_sorts_and_labels() {
        let view = divisions_view(&sample());
        assert_eq!(view.bars.len(), 3);
        assert_eq!(view.bars[0].division, "MPRO");
        assert_eq!(view.bars[0].label(), "MPRO (Male)");
        assert!(view.y_max >= view.bars.iter().map(|b| b.mean_overall_secs).fold(0.0, f64::max));
    }
}
