//! # Chart Rendering
//!
//! Turns the result CSV into SVG charts comparing transfer modes. Rows are
//! de-duplicated first (the last row for a configuration wins) because the
//! store keeps every re-run. Failed points (NaN) are left out of the lines.

use crate::benchmark::ExperimentKind;
use crate::cli::TransferMode;
use crate::results::{ResultRow, ResultStore};
use anyhow::{anyhow, Context, Result};
use plotters::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

type DrawResult<T> = Result<T, Box<dyn std::error::Error>>;

/// One line of a chart: mode label and (x, y) points sorted by x
type Series = (String, Vec<(f64, f64)>);

/// Keep the last row of every (experiment, mode, msg, window, iters).
pub fn dedup_latest(rows: Vec<ResultRow>) -> Vec<ResultRow> {
    let mut latest: BTreeMap<(String, TransferMode, u64, u64, u64), ResultRow> = BTreeMap::new();
    for row in rows {
        let key = (row.experiment.clone(), row.mode, row.msg, row.window, row.iters);
        latest.insert(key, row);
    }
    latest.into_values().collect()
}

/// Renders every chart the stored data supports into one directory.
///
/// ## Charts
///
/// | Experiment | File | Content |
/// |---|---|---|
/// | baseline | `baseline_throughput.svg` | GiB/s bar per mode |
/// | window sweep | `sweep_msg{msg}_{gib,mops}.svg` | metric vs window, one line per mode |
/// | message-size sweep | `msg_sweep_{gib,mops}_w{window}.svg` | metric vs log2 message size |
///
/// Existing files with the same name are overwritten.
pub struct ReportRenderer {
    plot_dir: PathBuf,
}

impl ReportRenderer {
    pub fn new<P: AsRef<Path>>(plot_dir: P) -> Self {
        Self {
            plot_dir: plot_dir.as_ref().to_path_buf(),
        }
    }

    /// Load `store` and write all charts.
    ///
    /// Experiments with no rows in the store are skipped with an info log,
    /// so an empty or partial store is not an error.
    ///
    /// ## Returns
    /// - `Ok(paths)` with every chart written, in baseline, window sweep,
    ///   message-size sweep order
    /// - `Err` if the store cannot be read or a chart cannot be drawn
    pub fn render(&self, store: &ResultStore) -> Result<Vec<PathBuf>> {
        let rows = dedup_latest(store.load()?);
        std::fs::create_dir_all(&self.plot_dir)
            .with_context(|| format!("Failed to create plot directory {}", self.plot_dir.display()))?;

        let mut written = Vec::new();
        written.extend(self.render_baseline(&rows)?);
        written.extend(self.render_window_sweep(&rows)?);
        written.extend(self.render_msg_sweep(&rows)?);

        info!("Plotting finished, {} charts saved to: {:?}", written.len(), self.plot_dir);
        Ok(written)
    }

    fn render_baseline(&self, rows: &[ResultRow]) -> Result<Vec<PathBuf>> {
        let base: Vec<&ResultRow> = rows
            .iter()
            .filter(|r| r.experiment == ExperimentKind::Baseline.tag())
            .collect();
        if base.is_empty() {
            info!("No baseline data; skipping baseline chart");
            return Ok(Vec::new());
        }

        let bars: Vec<(String, f64)> = base
            .iter()
            .map(|r| (format!("{} ({}B, w={})", r.mode, r.msg, r.window), r.gib))
            .collect();
        let path = self.plot_dir.join("baseline_throughput.svg");
        draw_bars(&path, "Baseline throughput", "Throughput (GiB/s)", &bars)
            .map_err(|e| anyhow!("Failed to render {}: {}", path.display(), e))?;
        Ok(vec![path])
    }

    fn render_window_sweep(&self, rows: &[ResultRow]) -> Result<Vec<PathBuf>> {
        let sweep: Vec<&ResultRow> = rows
            .iter()
            .filter(|r| r.experiment == ExperimentKind::WindowSweep.tag())
            .collect();
        if sweep.is_empty() {
            info!("No window sweep data; skipping window charts");
            return Ok(Vec::new());
        }

        let mut sizes: Vec<u64> = sweep.iter().map(|r| r.msg).collect();
        sizes.sort_unstable();
        sizes.dedup();

        let mut written = Vec::new();
        for msg in sizes {
            let sub: Vec<&ResultRow> = sweep.iter().copied().filter(|r| r.msg == msg).collect();
            for (metric, y_desc, pick) in metrics() {
                let series = series_by_mode(&sub, |r| r.window as f64, pick);
                let path = self.plot_dir.join(format!("sweep_msg{}_{}.svg", msg, metric));
                let caption = format!("{} vs window (msg={} bytes)", y_desc, msg);
                draw_lines(
                    &path,
                    &caption,
                    "window size (outstanding requests)",
                    y_desc,
                    &series,
                    false,
                )
                .map_err(|e| anyhow!("Failed to render {}: {}", path.display(), e))?;
                written.push(path);
            }
        }
        Ok(written)
    }

    fn render_msg_sweep(&self, rows: &[ResultRow]) -> Result<Vec<PathBuf>> {
        let sweep: Vec<&ResultRow> = rows
            .iter()
            .filter(|r| r.experiment == ExperimentKind::MsgSweep.tag())
            .collect();
        if sweep.is_empty() {
            info!("No msg_sweep data; skipping message-size charts");
            return Ok(Vec::new());
        }

        let mut windows: Vec<u64> = sweep.iter().map(|r| r.window).collect();
        windows.sort_unstable();
        windows.dedup();

        let mut written = Vec::new();
        for window in windows {
            let sub: Vec<&ResultRow> = sweep.iter().copied().filter(|r| r.window == window).collect();
            for (metric, y_desc, pick) in metrics() {
                let series = series_by_mode(&sub, |r| (r.msg as f64).log2(), pick);
                let path = self
                    .plot_dir
                    .join(format!("msg_sweep_{}_w{}.svg", metric, window));
                let caption = format!("{} vs message size (window={})", y_desc, window);
                draw_lines(&path, &caption, "Message size (bytes)", y_desc, &series, true)
                    .map_err(|e| anyhow!("Failed to render {}: {}", path.display(), e))?;
                written.push(path);
            }
        }
        Ok(written)
    }
}

/// File suffix, axis label and value accessor for each plotted metric
fn metrics() -> [(&'static str, &'static str, fn(&ResultRow) -> f64); 2] {
    fn gib(r: &ResultRow) -> f64 {
        r.gib
    }
    fn mops(r: &ResultRow) -> f64 {
        r.mops
    }
    [
        ("gib", "Throughput (GiB/s)", gib),
        ("mops", "Operations (Mops)", mops),
    ]
}

/// Group rows into one series per mode, dropping missing values.
fn series_by_mode(
    rows: &[&ResultRow],
    x: impl Fn(&ResultRow) -> f64,
    y: fn(&ResultRow) -> f64,
) -> Vec<Series> {
    let mut by_mode: BTreeMap<TransferMode, Vec<(f64, f64)>> = BTreeMap::new();
    for row in rows {
        let value = y(row);
        if value.is_finite() {
            by_mode.entry(row.mode).or_default().push((x(row), value));
        }
    }
    by_mode
        .into_iter()
        .map(|(mode, mut points)| {
            points.sort_by(|a, b| a.0.total_cmp(&b.0));
            (mode.to_string(), points)
        })
        .collect()
}

/// Padded (min, max) of `values`, or (0, 1) when there are none
fn axis_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() {
        return (0.0, 1.0);
    }
    if (max - min).abs() < f64::EPSILON {
        return (min - 1.0, max + 1.0);
    }
    let pad = (max - min) * 0.05;
    (min - pad, max + pad)
}

/// Line chart with one series per mode and circle markers at each point.
///
/// With `x_log2` the x values are exponents and tick labels show `2^x`.
fn draw_lines(
    path: &Path,
    caption: &str,
    x_desc: &str,
    y_desc: &str,
    series: &[Series],
    x_log2: bool,
) -> DrawResult<()> {
    let root = SVGBackend::new(path, (1024, 640)).into_drawing_area();
    root.fill(&WHITE)?;

    let (x_min, x_max) = axis_range(series.iter().flat_map(|(_, p)| p.iter().map(|&(x, _)| x)));
    let y_max = series
        .iter()
        .flat_map(|(_, p)| p.iter().map(|&(_, y)| y))
        .fold(0.0, f64::max);
    let y_max = if y_max > 0.0 { y_max * 1.1 } else { 1.0 };

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 24))
        .margin(16)
        .x_label_area_size(48)
        .y_label_area_size(64)
        .build_cartesian_2d(x_min..x_max, 0.0..y_max)?;

    let x_fmt = |v: &f64| {
        if x_log2 {
            format!("{:.0}", 2f64.powf(*v))
        } else {
            format!("{:.0}", v)
        }
    };
    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc(y_desc)
        .x_label_formatter(&x_fmt)
        .draw()?;

    for (idx, (label, points)) in series.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        chart
            .draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))?
            .label(label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        chart.draw_series(points.iter().map(|&p| Circle::new(p, 4, color.filled())))?;
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Bar chart with one labelled bar per entry; NaN bars are left empty
fn draw_bars(path: &Path, caption: &str, y_desc: &str, bars: &[(String, f64)]) -> DrawResult<()> {
    let root = SVGBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let y_max = bars
        .iter()
        .map(|&(_, v)| v)
        .filter(|v| v.is_finite())
        .fold(0.0, f64::max);
    let y_max = if y_max > 0.0 { y_max * 1.1 } else { 1.0 };

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 24))
        .margin(16)
        .x_label_area_size(48)
        .y_label_area_size(64)
        .build_cartesian_2d((0..bars.len() as i32).into_segmented(), 0.0..y_max)?;

    let x_fmt = |v: &SegmentValue<i32>| match v {
        SegmentValue::CenterOf(i) => bars
            .get(*i as usize)
            .map(|(label, _)| label.clone())
            .unwrap_or_default(),
        _ => String::new(),
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .y_desc(y_desc)
        .x_label_formatter(&x_fmt)
        .draw()?;

    chart.draw_series(bars.iter().enumerate().filter(|(_, (_, v))| v.is_finite()).map(
        |(i, &(_, v))| {
            let color = Palette99::pick(i).to_rgba();
            let i = i as i32;
            Rectangle::new(
                [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), v)],
                color.filled(),
            )
        },
    ))?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(experiment: &str, mode: TransferMode, msg: u64, window: u64, gib: f64) -> ResultRow {
        ResultRow {
            experiment: experiment.to_string(),
            mode,
            msg,
            window,
            iters: 1000,
            mops: gib * 2.0,
            gib,
        }
    }

    #[test]
    fn test_dedup_keeps_last_occurrence() {
        let rows = vec![
            row("sweep", TransferMode::Write, 32, 1, 1.0),
            row("sweep", TransferMode::Send, 32, 1, 2.0),
            row("sweep", TransferMode::Write, 32, 1, 3.0),
        ];
        let deduped = dedup_latest(rows);
        assert_eq!(deduped.len(), 2);
        let write = deduped.iter().find(|r| r.mode == TransferMode::Write).unwrap();
        assert_eq!(write.gib, 3.0);
    }

    #[test]
    fn test_series_skip_missing_and_sort_by_x() {
        let rows = vec![
            row("sweep", TransferMode::Write, 32, 8, 2.0),
            row("sweep", TransferMode::Write, 32, 1, 1.0),
            row("sweep", TransferMode::Send, 32, 1, f64::NAN),
        ];
        let refs: Vec<&ResultRow> = rows.iter().collect();
        let series = series_by_mode(&refs, |r| r.window as f64, |r| r.gib);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].0, "write");
        assert_eq!(series[0].1, vec![(1.0, 1.0), (8.0, 2.0)]);
    }

    #[test]
    fn test_axis_range_handles_degenerate_input() {
        assert_eq!(axis_range(std::iter::empty()), (0.0, 1.0));
        assert_eq!(axis_range([4.0].into_iter()), (3.0, 5.0));
        let (lo, hi) = axis_range([0.0, 10.0].into_iter());
        assert!(lo < 0.0 && hi > 10.0);
    }

    #[test]
    fn test_render_writes_expected_files() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("results.csv"));
        store
            .append(&[
                row("baseline", TransferMode::Write, 8192, 64, 10.0),
                row("baseline", TransferMode::Send, 8192, 64, f64::NAN),
                row("sweep", TransferMode::Write, 32, 1, 0.1),
                row("sweep", TransferMode::Send, 32, 2, 0.2),
                row("msg_sweep", TransferMode::Write, 64, 4, 0.5),
                row("msg_sweep", TransferMode::Write, 128, 4, 0.9),
            ])
            .unwrap();

        let plot_dir = dir.path().join("plots");
        let written = ReportRenderer::new(&plot_dir).render(&store).unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "baseline_throughput.svg",
                "sweep_msg32_gib.svg",
                "sweep_msg32_mops.svg",
                "msg_sweep_gib_w4.svg",
                "msg_sweep_mops_w4.svg",
            ]
        );
        assert!(written.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_render_without_data_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("results.csv"));
        store.append(&[]).unwrap();
        let written = ReportRenderer::new(dir.path().join("plots")).render(&store).unwrap();
        assert!(written.is_empty());
    }
}
