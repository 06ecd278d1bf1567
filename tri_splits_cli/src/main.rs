use std::fs;
use std::fs::File;
use std::io::{self, Write};
use std::panic;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle, FontTransform};
use rayon::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tri_splits::{
    divisions_view, format_hms, format_hms_short, parse_hms, scatter_view, splits_view, zoom_to,
    Dataset, DivisionsView, Metric, ScatterState, ScatterView, SplitsState, SplitsView,
    ZoomWindow,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Triathlon split-time chart CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the per-athlete split-times bar chart
    Splits(SplitsArgs),
    /// Render the metric-vs-metric scatter chart with optional trend line
    Scatter(ScatterArgs),
    /// Render or tabulate average Overall time by division and gender
    Divisions(DivisionsArgs),
    /// Render all three charts into a directory
    Report(ReportArgs),
}

#[derive(Parser, Debug)]
struct SplitsArgs {
    /// Results CSV to load
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Athlete name (defaults to the dataset's initial selection)
    #[arg(long)]
    athlete: Option<String>,

    /// Second athlete to compare against
    #[arg(long)]
    compare: Option<String>,

    /// Output image path (.png or .svg)
    #[arg(short, long, default_value = "splits.png", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct ScatterArgs {
    /// Results CSV to load
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Metric on the x axis
    #[arg(long, value_enum, default_value_t = MetricOpt::Bike)]
    x_metric: MetricOpt,

    /// Metric on the y axis
    #[arg(long, value_enum, default_value_t = MetricOpt::Run)]
    y_metric: MetricOpt,

    /// Disable the least-squares trend line
    #[arg(long, action = ArgAction::SetTrue)]
    no_trend: bool,

    /// Zoom window as four H:MM:SS times: x-lo,x-hi,y-lo,y-hi
    #[arg(long)]
    zoom: Option<String>,

    /// Output image path (.png or .svg)
    #[arg(short, long, default_value = "scatter.png", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct DivisionsArgs {
    /// Results CSV to load
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Output image path (.png or .svg)
    #[arg(short, long, default_value = "divisions.png", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Also write the averages as CSV (`-` for stdout)
    #[arg(long, value_hint = ValueHint::FilePath)]
    table: Option<PathBuf>,

    /// Also write the averages as JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    json: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct ReportArgs {
    /// Results CSV to load
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Directory to place splits.png, scatter.png and divisions.png
    #[arg(short, long, default_value = "report", value_hint = ValueHint::DirPath)]
    out_dir: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MetricOpt {
    Swim,
    Bike,
    Run,
}

impl From<MetricOpt> for Metric {
    fn from(value: MetricOpt) -> Self {
        match value {
            MetricOpt::Swim => Metric::Swim,
            MetricOpt::Bike => Metric::Bike,
            MetricOpt::Run => Metric::Run,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Splits(args) => args.verbose,
        Command::Scatter(args) => args.verbose,
        Command::Divisions(args) => args.verbose,
        Command::Report(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Splits(args) => handle_splits(args),
        Command::Scatter(args) => handle_scatter(args),
        Command::Divisions(args) => handle_divisions(args),
        Command::Report(args) => handle_report(args),
    }
}

fn load_dataset(path: &Path) -> Result<Dataset> {
    let dataset =
        Dataset::from_path(path).with_context(|| format!("failed to load {}", path.display()))?;
    info!(
        "Loaded {} rows ({} athletes)",
        dataset.rows().len(),
        dataset.athlete_names().len()
    );
    Ok(dataset)
}

fn handle_splits(args: SplitsArgs) -> Result<()> {
    let dataset = load_dataset(&args.input)?;
    let mut state = SplitsState::default_for(&dataset);
    if let Some(name) = args.athlete {
        state.athlete_a = name;
    }
    state.athlete_b = args.compare;

    let view = splits_view(&dataset, &state)?;
    render_chart_guard(ChartSpec::Splits(&view), &args.output).map_err(|err| anyhow!(err))?;
    info!("Wrote chart: {}", args.output.display());
    Ok(())
}

fn handle_scatter(args: ScatterArgs) -> Result<()> {
    let dataset = load_dataset(&args.input)?;
    let mut state = ScatterState::default();
    state.x_metric = args.x_metric.into();
    state.y_metric = args.y_metric.into();
    state.trend = !args.no_trend;
    if state.x_metric == state.y_metric {
        return Err(anyhow!("x and y metrics must differ"));
    }

    if let Some(zoom_str) = args.zoom.as_ref() {
        let window = parse_zoom(zoom_str)?;
        // Fit the requested window against the unzoomed view's data bounds.
        let full = scatter_view(&dataset, &state);
        state.zoom = Some(zoom_to(window, full.x_domain, full.y_domain));
    }

    let view = scatter_view(&dataset, &state);
    if view.points.is_empty() {
        warn!(
            "No rows have both {} and {} times",
            state.x_metric, state.y_metric
        );
    }
    if let Some(fit) = view.trend {
        info!(
            "Trend over {} visible points: slope {:.4}, r {:.3}",
            view.points.len(),
            fit.slope,
            fit.correlation
        );
    }
    render_chart_guard(ChartSpec::Scatter(&view), &args.output).map_err(|err| anyhow!(err))?;
    info!("Wrote chart: {}", args.output.display());
    Ok(())
}

fn handle_divisions(args: DivisionsArgs) -> Result<()> {
    let dataset = load_dataset(&args.input)?;
    let view = divisions_view(&dataset);
    info!("{} division/gender groups", view.bars.len());

    if let Some(table_path) = args.table.as_ref() {
        if table_path.as_os_str() == "-" {
            write_division_table(&view, csv::Writer::from_writer(io::stdout().lock()))?;
        } else {
            let file = File::create(table_path)
                .with_context(|| format!("failed to create {}", table_path.display()))?;
            write_division_table(&view, csv::Writer::from_writer(file))?;
            info!("Wrote table: {}", table_path.display());
        }
    }

    if let Some(json_path) = args.json.as_ref() {
        let text = serde_json::to_string_pretty(&view.bars)?;
        fs::write(json_path, text)
            .with_context(|| format!("failed to write {}", json_path.display()))?;
        info!("Wrote JSON: {}", json_path.display());
    }

    render_chart_guard(ChartSpec::Divisions(&view), &args.output).map_err(|err| anyhow!(err))?;
    info!("Wrote chart: {}", args.output.display());
    Ok(())
}

fn handle_report(args: ReportArgs) -> Result<()> {
    let dataset = load_dataset(&args.input)?;
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    let splits = splits_view(&dataset, &SplitsState::default_for(&dataset))?;
    let scatter = scatter_view(&dataset, &ScatterState::default());
    let divisions = divisions_view(&dataset);

    let jobs: Vec<(PathBuf, ChartSpec)> = vec![
        (args.out_dir.join("splits.png"), ChartSpec::Splits(&splits)),
        (args.out_dir.join("scatter.png"), ChartSpec::Scatter(&scatter)),
        (
            args.out_dir.join("divisions.png"),
            ChartSpec::Divisions(&divisions),
        ),
    ];

    let failures: Vec<String> = jobs
        .par_iter()
        .filter_map(|(path, spec)| match render_chart_guard(*spec, path) {
            Ok(()) => {
                info!("Wrote chart: {}", path.display());
                None
            }
            Err(err) => Some(format!("{}: {}", path.display(), err)),
        })
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("report rendering failed: {}", failures.join("; ")))
    }
}

/// Four comma-separated H:MM:SS tokens: x-lo,x-hi,y-lo,y-hi.
fn parse_zoom(input: &str) -> Result<ZoomWindow> {
    let parts: Vec<f64> = input
        .split(',')
        .map(|token| {
            parse_hms(token).ok_or_else(|| anyhow!("invalid zoom time '{}'", token.trim()))
        })
        .collect::<Result<Vec<f64>>>()?;
    if parts.len() != 4 {
        return Err(anyhow!(
            "--zoom expects 4 comma separated times, got {}",
            parts.len()
        ));
    }
    if parts[0] >= parts[1] || parts[2] >= parts[3] {
        return Err(anyhow!("--zoom bounds must be ascending on each axis"));
    }
    Ok(ZoomWindow {
        x: (parts[0], parts[1]),
        y: (parts[2], parts[3]),
    })
}

fn write_division_table<W: Write>(view: &DivisionsView, mut writer: csv::Writer<W>) -> Result<()> {
    writer.write_record(["division", "gender", "mean_overall", "mean_overall_s"])?;
    for bar in &view.bars {
        writer.write_record([
            bar.division.clone(),
            bar.gender.label().to_string(),
            bar.formatted_mean(),
            format!("{:.1}", bar.mean_overall_secs),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Clone, Copy)]
enum ChartSpec<'a> {
    Splits(&'a SplitsView),
    Scatter(&'a ScatterView),
    Divisions(&'a DivisionsView),
}

enum ChartKind {
    Png,
    Svg,
}

fn chart_kind(path: &Path) -> Result<ChartKind, String> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png")
        .to_ascii_lowercase()
        .as_str()
    {
        "png" => Ok(ChartKind::Png),
        "svg" => Ok(ChartKind::Svg),
        other => Err(format!("unsupported image extension '{}'", other)),
    }
}

/// Plotting backends can panic on malformed font setups, so the whole
/// render runs under catch_unwind.
fn render_chart_guard(spec: ChartSpec, path: &Path) -> Result<(), String> {
    let render = || -> Result<(), String> { render_chart(spec, path) };
    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn render_chart(spec: ChartSpec, path: &Path) -> Result<(), String> {
    let kind = chart_kind(path)?;
    let size = (1100, 650);
    match kind {
        ChartKind::Png => {
            let root = BitMapBackend::new(path, size).into_drawing_area();
            draw_spec(root, spec).map_err(|e| format!("plotting error: {}", e))
        }
        ChartKind::Svg => {
            let root = SVGBackend::new(path, size).into_drawing_area();
            draw_spec(root, spec).map_err(|e| format!("plotting error: {}", e))
        }
    }
}

fn draw_spec<DB>(root: DrawingArea<DB, plotters::coord::Shift>, spec: ChartSpec) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    match spec {
        ChartSpec::Splits(view) => draw_splits(root, view),
        ChartSpec::Scatter(view) => draw_scatter(root, view),
        ChartSpec::Divisions(view) => draw_divisions(root, view),
    }
}

fn draw_splits<DB>(root: DrawingArea<DB, plotters::coord::Shift>, view: &SplitsView) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let n_cats = view.categories.len().max(1);
    let mut chart = ChartBuilder::on(&root)
        .margin(25)
        .caption(
            &view.title,
            FontDesc::new(FontFamily::SansSerif, 24.0, FontStyle::Normal),
        )
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(0.0..n_cats as f64, 0.0..view.y_max)?;

    let categories = view.categories.clone();
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n_cats)
        .x_label_formatter(&|v| {
            let idx = v.floor() as usize;
            categories
                .get(idx)
                .map(|m| m.to_string())
                .unwrap_or_default()
        })
        .y_label_formatter(&|v| format_hms_short(*v))
        .label_style(FontDesc::new(
            FontFamily::SansSerif,
            16.0,
            FontStyle::Normal,
        ))
        .draw()?;

    let palette = [RGBColor(31, 119, 180), RGBColor(255, 127, 14)];
    let group_width = 0.8 / view.series.len() as f64;
    for (series_idx, athlete) in view.series.iter().enumerate() {
        let color = palette[series_idx % palette.len()];
        let bars = view.categories.iter().enumerate().filter_map(|(cat, &metric)| {
            let secs = athlete.secs_for(metric)?;
            let x0 = cat as f64 + 0.1 + series_idx as f64 * group_width;
            Some(Rectangle::new(
                [(x0, 0.0), (x0 + group_width, secs)],
                color.filled(),
            ))
        });
        chart
            .draw_series(bars)?
            .label(athlete.name.clone())
            .legend(move |(x, y)| Rectangle::new([(x, y - 6), (x + 14, y + 6)], color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.7))
        .border_style(BLACK.mix(0.3))
        .label_font(FontDesc::new(
            FontFamily::SansSerif,
            16.0,
            FontStyle::Normal,
        ))
        .position(SeriesLabelPosition::UpperLeft)
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_scatter<DB>(root: DrawingArea<DB, plotters::coord::Shift>, view: &ScatterView) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(25)
        .caption(
            &view.title,
            FontDesc::new(FontFamily::SansSerif, 24.0, FontStyle::Normal),
        )
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(
            view.x_domain.0..view.x_domain.1,
            view.y_domain.0..view.y_domain.1,
        )?;

    chart
        .configure_mesh()
        .x_desc(view.x_label.clone())
        .y_desc(view.y_label.clone())
        .x_label_formatter(&|v| format_hms_short(*v))
        .y_label_formatter(&|v| format_hms_short(*v))
        .label_style(FontDesc::new(
            FontFamily::SansSerif,
            16.0,
            FontStyle::Normal,
        ))
        .draw()?;

    chart.draw_series(
        view.points
            .iter()
            .map(|p| Circle::new((p.x, p.y), 4, RGBColor(31, 119, 180).mix(0.7).filled())),
    )?;

    if let Some(fit) = view.trend {
        if let Some((start, end)) = view.trend_endpoints() {
            chart
                .draw_series(LineSeries::new(
                    [start, end].into_iter(),
                    RGBColor(214, 39, 40).stroke_width(2),
                ))?
                .label(format!("trend (r = {:.2})", fit.correlation))
                .legend(|(x, y)| {
                    PathElement::new(vec![(x, y), (x + 30, y)], RGBColor(214, 39, 40))
                });

            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.7))
                .border_style(BLACK.mix(0.3))
                .label_font(FontDesc::new(
                    FontFamily::SansSerif,
                    16.0,
                    FontStyle::Normal,
                ))
                .position(SeriesLabelPosition::UpperLeft)
                .draw()?;
        }
    }

    root.present()?;
    Ok(())
}

fn draw_divisions<DB>(
    root: DrawingArea<DB, plotters::coord::Shift>,
    view: &DivisionsView,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let n_bars = view.bars.len().max(1);
    let mut chart = ChartBuilder::on(&root)
        .margin(25)
        .caption(
            &view.title,
            FontDesc::new(FontFamily::SansSerif, 24.0, FontStyle::Normal),
        )
        .set_label_area_size(LabelAreaPosition::Left, 70)
        .set_label_area_size(LabelAreaPosition::Bottom, 90)
        .build_cartesian_2d(0.0..n_bars as f64, 0.0..view.y_max)?;

    let labels: Vec<String> = view.bars.iter().map(|b| b.label()).collect();
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n_bars)
        .x_label_formatter(&|v| {
            let idx = v.floor() as usize;
            labels.get(idx).cloned().unwrap_or_default()
        })
        .y_label_formatter(&|v| format_hms_short(*v))
        .label_style(FontDesc::new(
            FontFamily::SansSerif,
            13.0,
            FontStyle::Normal,
        ))
        .x_label_style(
            FontDesc::new(FontFamily::SansSerif, 12.0, FontStyle::Normal)
                .transform(FontTransform::Rotate90),
        )
        .draw()?;

    chart.draw_series(view.bars.iter().enumerate().map(|(idx, bar)| {
        let color = match bar.gender.letter() {
            'F' => RGBColor(214, 39, 40),
            _ => RGBColor(31, 119, 180),
        };
        let x0 = idx as f64 + 0.15;
        Rectangle::new(
            [(x0, 0.0), (x0 + 0.7, bar.mean_overall_secs)],
            color.filled(),
        )
    }))?;

    // Value labels above each bar.
    chart.draw_series(view.bars.iter().enumerate().map(|(idx, bar)| {
        Text::new(
            format_hms(bar.mean_overall_secs),
            (idx as f64 + 0.5, bar.mean_overall_secs + view.y_max * 0.01),
            FontDesc::new(FontFamily::SansSerif, 11.0, FontStyle::Normal).color(&BLACK),
        )
    }))?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_parses_four_times() {
        let window = parse_zoom("4:00:00,5:00:00,2:30:00,3:30:00").unwrap();
        assert_eq!(window.x, (4.0 * 3600.0, 5.0 * 3600.0));
        assert_eq!(window.y, (2.5 * 3600.0, 3.5 * 3600.0));
    }

    #[test]
    fn zoom_rejects_wrong_arity_and_order() {
        assert!(parse_zoom("1:00:00,2:00:00").is_err());
        assert!(parse_zoom("2:00:00,1:00:00,0:00:00,1:00:00").is_err());
    }
}
