//! 学習過程の損失グラフ。

use crate::logger::LogEvent;
use plotters::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

/// メトリクス名ごとの `(epoch, value)` 系列。
pub type LossSeries = BTreeMap<String, Vec<(usize, f64)>>;

/// 実験ログのイベント列からメトリクスの系列を取り出します。
pub fn series_from_events(events: &[LogEvent]) -> LossSeries {
    let mut series = LossSeries::new();
    for event in events {
        if let LogEvent::Metrics { epoch, metrics } = event {
            for (name, value) in metrics {
                series.entry(name.clone()).or_default().push((*epoch, *value));
            }
        }
    }
    series
}

const COLORS: [RGBColor; 4] = [RED, BLUE, GREEN, MAGENTA];

/// 損失の系列を対数スケールのグラフとしてPNGファイルに出力します。
///
/// 対数を取れない0以下の値は描画しません。
pub fn plot_loss_history(
    series: &LossSeries,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let points: Vec<(usize, f64)> = series
        .values()
        .flatten()
        .filter(|(_, v)| *v > 0.0)
        .map(|&(e, v)| (e, v.log10()))
        .collect();
    if points.is_empty() {
        return Err("no positive loss values to plot".into());
    }
    let max_epoch = points.iter().map(|(e, _)| *e).max().unwrap_or(0) + 1;
    let min_log = points.iter().map(|(_, v)| *v).fold(f64::INFINITY, f64::min) - 0.5;
    let max_log = points.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max) + 0.5;

    let root = BitMapBackend::new(output, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Loss History", ("sans-serif", 40).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0..max_epoch, min_log..max_log)?;
    chart
        .configure_mesh()
        .y_desc("Loss (log10 scale)")
        .x_desc("Epoch")
        .draw()?;

    for (i, (name, values)) in series.iter().enumerate() {
        let color = COLORS[i % COLORS.len()];
        chart
            .draw_series(LineSeries::new(
                values
                    .iter()
                    .filter(|(_, v)| *v > 0.0)
                    .map(|&(e, v)| (e, v.log10())),
                &color,
            ))?
            .label(name.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}
