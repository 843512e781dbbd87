//! HTML report rendering

use eeg_core::{EegError, EegResult};
use eeg_processing::{FeatureBundle, FeatureFamily, PreprocessReport};
use serde::Serialize;
use tera::{Context, Tera};

const REPORT_TEMPLATE: &str = include_str!("../templates/report.html.tera");
const TEMPLATE_NAME: &str = "report.html";

/// One metric across channels, values already formatted
#[derive(Debug, Clone, Serialize)]
pub struct MetricRow {
    pub name: String,
    pub values: Vec<String>,
}

/// A titled table of metrics
#[derive(Debug, Clone, Serialize)]
pub struct FeatureTable {
    pub title: String,
    pub rows: Vec<MetricRow>,
}

impl FeatureTable {
    fn from_family(title: &str, family: &FeatureFamily, format: fn(f64) -> String) -> Self {
        Self {
            title: title.to_string(),
            rows: family
                .iter()
                .map(|(name, values)| MetricRow {
                    name: name.clone(),
                    values: values.iter().map(|&v| format(v)).collect(),
                })
                .collect(),
        }
    }
}

/// Inline SVG figures
#[derive(Debug, Clone, Default, Serialize)]
pub struct Figures {
    pub signals: String,
    pub psd: String,
    pub connectivity: String,
}

/// Everything the report shows
#[derive(Debug, Clone, Serialize)]
pub struct ReportContext {
    pub run_id: String,
    pub generated_at: String,
    pub source: Option<String>,
    pub sampling_rate: f64,
    pub duration_secs: f64,
    pub n_samples: usize,
    pub channel_names: Vec<String>,
    pub auxiliary_names: Vec<String>,
    /// "fresh" or a description of the recovery
    pub freshness: String,
    pub preprocessing: PreprocessReport,
    pub band_powers: FeatureTable,
    pub feature_tables: Vec<FeatureTable>,
    pub connectivity: Vec<MetricRow>,
    /// Peak frequency of the mean filtered spectrum (Hz)
    pub dominant_frequency: f64,
    pub figures: Figures,
}

fn scientific(v: f64) -> String {
    format!("{:.3e}", v)
}

fn fixed(v: f64) -> String {
    format!("{:.4}", v)
}

impl ReportContext {
    /// Feature sections of the context, built from a bundle
    pub fn tables(bundle: &FeatureBundle) -> (FeatureTable, Vec<FeatureTable>, Vec<MetricRow>) {
        let band_powers = FeatureTable::from_family("Band powers (mean PSD)", &bundle.band_powers, scientific);
        let tables = vec![
            FeatureTable::from_family("Temporal", &bundle.temporal, fixed),
            FeatureTable::from_family("Statistical", &bundle.statistical, fixed),
            FeatureTable::from_family("Complexity", &bundle.complexity, fixed),
        ];
        let connectivity = bundle
            .channel_names
            .iter()
            .zip(&bundle.connectivity)
            .map(|(name, row)| MetricRow {
                name: name.clone(),
                values: row.iter().map(|&r| format!("{:.3}", r)).collect(),
            })
            .collect();
        (band_powers, tables, connectivity)
    }
}

/// Turns a report context into a document
pub trait ReportRenderer: Send + Sync {
    fn render(&self, context: &ReportContext) -> EegResult<String>;
}

/// Tera-backed HTML renderer
pub struct HtmlReportRenderer {
    tera: Tera,
}

impl HtmlReportRenderer {
    pub fn new() -> EegResult<Self> {
        Self::with_template(REPORT_TEMPLATE)
    }

    /// Renderer using a caller-supplied template source
    pub fn with_template(template: &str) -> EegResult<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, template)
            .map_err(|e| EegError::export("report", format!("Failed to load report template: {}", e)))?;
        Ok(Self { tera })
    }
}

impl ReportRenderer for HtmlReportRenderer {
    fn render(&self, context: &ReportContext) -> EegResult<String> {
        let context = Context::from_serialize(context)
            .map_err(|e| EegError::export("report", format!("Failed to build report context: {}", e)))?;
        self.tera
            .render(TEMPLATE_NAME, &context)
            .map_err(|e| EegError::export("report", format!("Failed to render report: {}", e)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use eeg_processing::PreprocessParams;
    use std::collections::BTreeMap;

    pub(crate) fn sample_bundle() -> FeatureBundle {
        let family = |name: &str, values: [f64; 2]| {
            let mut map = BTreeMap::new();
            map.insert(name.to_string(), values.to_vec());
            map
        };
        FeatureBundle {
            band_powers: family("alpha", [2.5e-3, 1.0e-3]),
            connectivity: vec![vec![1.0, 0.25], vec![0.25, 1.0]],
            temporal: family("mean", [0.0, 0.1]),
            statistical: family("rms", [1.0, 2.0]),
            complexity: family("sample_entropy", [1.2, 0.9]),
            channel_names: vec!["O1".to_string(), "O<2>".to_string()],
        }
    }

    pub(crate) fn sample_context() -> ReportContext {
        let bundle = sample_bundle();
        let (band_powers, feature_tables, connectivity) = ReportContext::tables(&bundle);
        ReportContext {
            run_id: "run-1".into(),
            generated_at: "2024-01-01T00:00:00Z".into(),
            source: Some("abc123".into()),
            sampling_rate: 256.0,
            duration_secs: 8.0,
            n_samples: 2048,
            channel_names: bundle.channel_names.clone(),
            auxiliary_names: vec!["EOG".into()],
            freshness: "fresh".into(),
            preprocessing: PreprocessReport {
                params: PreprocessParams::default(),
                bad_channels: Default::default(),
                n_components: 2,
                ica_iterations: 12,
                ica_converged: true,
                ica_explained_variance: 0.97,
                detections: Default::default(),
                quality_score: 0.82,
                stage_timings_ms: BTreeMap::new(),
            },
            band_powers,
            feature_tables,
            connectivity,
            dominant_frequency: 10.0,
            figures: Figures {
                signals: "<svg id=\"signals\"></svg>".into(),
                psd: "<svg id=\"psd\"></svg>".into(),
                connectivity: "<svg id=\"conn\"></svg>".into(),
            },
        }
    }

    #[test]
    fn test_tables_format_values() {
        let (bands, tables, connectivity) = ReportContext::tables(&sample_bundle());
        assert_eq!(bands.rows[0].values, vec!["2.500e-3", "1.000e-3"]);
        assert_eq!(tables.len(), 3);
        assert_eq!(tables[1].rows[0].values[1], "2.0000");
        assert_eq!(connectivity[0].values, vec!["1.000", "0.250"]);
    }

    #[test]
    fn test_html_report_contains_sections() {
        let html = HtmlReportRenderer::new().unwrap().render(&sample_context()).unwrap();

        assert!(html.contains("run-1"));
        assert!(html.contains("Band powers"));
        assert!(html.contains("alpha"));
        assert!(html.contains("0.82"));
        // figures are embedded verbatim, channel names escaped
        assert!(html.contains("<svg id=\"psd\"></svg>"));
        assert!(html.contains("O&lt;2&gt;"));
    }

    #[test]
    fn test_broken_template_is_export_error() {
        assert!(matches!(
            HtmlReportRenderer::with_template("{% for x in %}"),
            Err(EegError::Export { .. })
        ));
        let renderer = HtmlReportRenderer::with_template("{{ missing.field }}").unwrap();
        assert!(matches!(renderer.render(&sample_context()), Err(EegError::Export { .. })));
    }
}
