//! SVG figures for the export bundle

use std::fmt::Write;

const WIDTH: f64 = 900.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 30.0;
const MARGIN_BOTTOM: f64 = 40.0;

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn open_svg(out: &mut String, width: f64, height: f64, title: &str) {
    let _ = write!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif" font-size="11">"#,
        w = width,
        h = height
    );
    let _ = write!(
        out,
        r#"<rect width="100%" height="100%" fill="white"/><text x="{}" y="18" font-size="14">{}</text>"#,
        MARGIN_LEFT,
        escape_xml(title)
    );
}

/// Polyline through `points`, dropping non-finite ones
fn polyline(out: &mut String, points: impl Iterator<Item = (f64, f64)>, stroke: &str, width: f64) {
    let coords: Vec<String> = points
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| format!("{:.1},{:.1}", x, y))
        .collect();
    if coords.len() < 2 {
        return;
    }
    let _ = write!(
        out,
        r#"<polyline fill="none" stroke="{}" stroke-width="{}" points="{}"/>"#,
        stroke,
        width,
        coords.join(" ")
    );
}

/// Evenly spaced indices, at most `max_points` of them
fn decimate(len: usize, max_points: usize) -> Vec<usize> {
    let step = len.div_ceil(max_points.max(1)).max(1);
    (0..len).step_by(step).collect()
}

fn span(values: &[f64]) -> (f64, f64) {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (-1.0, 1.0);
    }
    if hi - lo <= f64::EPSILON {
        return (lo - 1.0, hi + 1.0);
    }
    (lo, hi)
}

/// Stacked traces, raw in grey with filtered overlaid
///
/// Each channel gets its own row scaled to the joint range of both traces.
pub fn signals_svg(
    names: &[String],
    raw: &[&[f64]],
    filtered: &[&[f64]],
    sampling_rate: f64,
    seconds: f64,
    max_points: usize,
) -> String {
    let row_height = 60.0;
    let plot_width = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let height = MARGIN_TOP + MARGIN_BOTTOM + row_height * names.len().max(1) as f64;
    let shown = raw
        .first()
        .map_or(0, |r| r.len())
        .min((seconds * sampling_rate).ceil() as usize);
    let indices = decimate(shown, max_points);
    let x_of = |i: usize| MARGIN_LEFT + plot_width * i as f64 / shown.max(2).saturating_sub(1) as f64;

    let mut out = String::new();
    open_svg(&mut out, WIDTH, height, "Raw (grey) and filtered (blue) signals");

    for (row, name) in names.iter().enumerate() {
        let top = MARGIN_TOP + row_height * row as f64;
        let raw_row = raw.get(row).copied().unwrap_or(&[]);
        let filtered_row = filtered.get(row).copied().unwrap_or(&[]);
        let window: Vec<f64> = raw_row
            .iter()
            .take(shown)
            .chain(filtered_row.iter().take(shown))
            .copied()
            .collect();
        let (lo, hi) = span(&window);
        let y_of = |v: f64| top + row_height * 0.9 - (v - lo) / (hi - lo) * row_height * 0.8;

        let _ = write!(
            out,
            r#"<text x="{}" y="{:.1}" text-anchor="end">{}</text>"#,
            MARGIN_LEFT - 6.0,
            top + row_height / 2.0,
            escape_xml(name)
        );
        polyline(
            &mut out,
            indices.iter().filter(|&&i| i < raw_row.len()).map(|&i| (x_of(i), y_of(raw_row[i]))),
            "#999999",
            0.8,
        );
        polyline(
            &mut out,
            indices
                .iter()
                .filter(|&&i| i < filtered_row.len())
                .map(|&i| (x_of(i), y_of(filtered_row[i]))),
            "#1f77b4",
            0.8,
        );
    }

    let _ = write!(
        out,
        r#"<text x="{}" y="{:.1}">Time (0 to {:.1} s)</text></svg>"#,
        MARGIN_LEFT,
        height - 10.0,
        shown as f64 / sampling_rate
    );
    out
}

/// Mean spectra on a log10 power axis
pub fn psd_svg(freqs: &[f64], raw: &[f64], filtered: &[f64]) -> String {
    let height = 400.0;
    let plot_width = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = height - MARGIN_TOP - MARGIN_BOTTOM;
    let log = |p: f64| if p > 0.0 { p.log10() } else { f64::NAN };

    let logs: Vec<f64> = raw.iter().chain(filtered).map(|&p| log(p)).collect();
    let (lo, hi) = span(&logs);
    let f_max = freqs.last().copied().filter(|f| *f > 0.0).unwrap_or(1.0);
    let x_of = |f: f64| MARGIN_LEFT + plot_width * f / f_max;
    let y_of = |v: f64| MARGIN_TOP + plot_height * (1.0 - (v - lo) / (hi - lo));

    let mut out = String::new();
    open_svg(&mut out, WIDTH, height, "Mean power spectral density (log10)");
    let _ = write!(
        out,
        r##"<rect x="{}" y="{}" width="{}" height="{}" fill="none" stroke="#cccccc"/>"##,
        MARGIN_LEFT, MARGIN_TOP, plot_width, plot_height
    );
    polyline(
        &mut out,
        freqs.iter().zip(raw).map(|(&f, &p)| (x_of(f), y_of(log(p)))),
        "#999999",
        1.2,
    );
    polyline(
        &mut out,
        freqs.iter().zip(filtered).map(|(&f, &p)| (x_of(f), y_of(log(p)))),
        "#1f77b4",
        1.2,
    );
    let _ = write!(
        out,
        r#"<text x="{}" y="{}">Frequency (0 to {:.0} Hz)</text><text x="6" y="{}">{:.1}</text><text x="6" y="{}">{:.1}</text></svg>"#,
        MARGIN_LEFT,
        height - 10.0,
        f_max,
        MARGIN_TOP + 10.0,
        hi,
        height - MARGIN_BOTTOM,
        lo
    );
    out
}

/// Diverging colour for a correlation in [-1, 1]
fn correlation_colour(r: f64) -> String {
    let r = if r.is_finite() { r.clamp(-1.0, 1.0) } else { 0.0 };
    let fade = |strength: f64| (255.0 * (1.0 - strength)).round() as u8;
    let (red, green, blue) = if r >= 0.0 {
        (255, fade(r), fade(r))
    } else {
        (fade(-r), fade(-r), 255)
    };
    format!("#{:02x}{:02x}{:02x}", red, green, blue)
}

/// Correlation heat map
pub fn connectivity_svg(names: &[String], matrix: &[Vec<f64>]) -> String {
    let n = matrix.len().max(1);
    let cell = (600.0 / n as f64).clamp(8.0, 48.0);
    let size = MARGIN_LEFT + cell * n as f64 + MARGIN_RIGHT;
    let height = MARGIN_TOP + cell * n as f64 + MARGIN_BOTTOM;

    let mut out = String::new();
    open_svg(&mut out, size, height, "Channel correlation");
    for (i, row) in matrix.iter().enumerate() {
        for (j, &r) in row.iter().enumerate() {
            let _ = write!(
                out,
                r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}"><title>{} / {}: {:.3}</title></rect>"#,
                MARGIN_LEFT + cell * j as f64,
                MARGIN_TOP + cell * i as f64,
                cell,
                cell,
                correlation_colour(r),
                escape_xml(names.get(i).map_or("", String::as_str)),
                escape_xml(names.get(j).map_or("", String::as_str)),
                r
            );
        }
    }
    for (i, name) in names.iter().enumerate().take(matrix.len()) {
        let _ = write!(
            out,
            r#"<text x="{}" y="{:.1}" text-anchor="end">{}</text>"#,
            MARGIN_LEFT - 4.0,
            MARGIN_TOP + cell * (i as f64 + 0.6),
            escape_xml(name)
        );
    }
    out.push_str("</svg>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("Ch{}", i)).collect()
    }

    #[test]
    fn test_signals_svg_has_one_row_per_channel() {
        let raw: Vec<Vec<f64>> = (0..3).map(|c| (0..500).map(|i| (i * (c + 1)) as f64).collect()).collect();
        let raw_rows: Vec<&[f64]> = raw.iter().map(Vec::as_slice).collect();
        let svg = signals_svg(&names(3), &raw_rows, &raw_rows, 100.0, 2.0, 50);

        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<polyline").count(), 6);
        assert!(svg.contains(">Ch2<"));
    }

    #[test]
    fn test_psd_svg_skips_zero_power() {
        let freqs = [0.0, 1.0, 2.0, 3.0];
        let svg = psd_svg(&freqs, &[0.0, 1.0, 0.1, 0.01], &[0.0, 0.5, 0.05, 0.005]);
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert!(!svg.contains("NaN"));
    }

    #[test]
    fn test_connectivity_cells_and_escaping() {
        let matrix = vec![vec![1.0, -0.5], vec![-0.5, 1.0]];
        let svg = connectivity_svg(&["A&B".to_string(), "C".to_string()], &matrix);
        assert_eq!(svg.matches("<rect x=").count(), 4);
        assert!(svg.contains("A&amp;B"));
        assert!(svg.contains("#ff0000"));
    }

    #[test]
    fn test_colour_scale() {
        assert_eq!(correlation_colour(1.0), "#ff0000");
        assert_eq!(correlation_colour(-1.0), "#0000ff");
        assert_eq!(correlation_colour(0.0), "#ffffff");
        assert_eq!(correlation_colour(f64::NAN), "#ffffff");
    }

    #[test]
    fn test_decimate() {
        assert_eq!(decimate(10, 5), vec![0, 2, 4, 6, 8]);
        assert_eq!(decimate(3, 100), vec![0, 1, 2]);
        assert!(decimate(0, 10).is_empty());
    }
}
