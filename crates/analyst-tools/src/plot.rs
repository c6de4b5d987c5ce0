//! plot tool

use std::fmt::Write as _;

use async_trait::async_trait;
use serde_json::{json, Value};

use analyst_core::error::CoreError;
use analyst_core::tool::{FieldSpec, FieldType, Tool, ToolContext, ToolInput, ToolSpec};
use analyst_core::types::Artifact;

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 360.0;
const MARGIN: f64 = 40.0;

/// Renders a line chart of one y column over the x column as SVG bytes.
/// x values are treated as evenly spaced categories.
pub struct PlotTool;

#[async_trait]
impl Tool for PlotTool {
    fn function_name(&self) -> &str {
        "plot"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "Plot",
            "plot",
            "Render a line chart of a numeric column over a category column",
        )
        .with_input(FieldSpec::new("data", FieldType::Table))
        .with_input(
            FieldSpec::new("x", FieldType::String).with_description("Category/label column"),
        )
        .with_input(FieldSpec::new("y", FieldType::String).with_description("Numeric column"))
        .with_input(
            FieldSpec::new("title", FieldType::String).with_default(json!("")),
        )
        .with_output(FieldSpec::new("chart", FieldType::Chart))
        .protected()
    }

    async fn run(&self, input: ToolInput, _ctx: ToolContext) -> Result<Vec<Artifact>, CoreError> {
        let table = input.require_table("data")?;
        let x = input.require_str("x")?;
        let y = input.require_str("y")?;
        let title = input.require_str("title")?;

        let labels: Vec<String> = table
            .column_values(x)
            .ok_or_else(|| CoreError::missing_field(x))?
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        let values: Vec<f64> = table
            .column_values(y)
            .ok_or_else(|| CoreError::missing_field(y))?
            .iter()
            .filter_map(|v| v.as_f64())
            .collect();
        if values.len() != table.rows.len() {
            return Err(CoreError::missing_field(y));
        }

        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let span = if max > min { max - min } else { 1.0 };
        let step = if values.len() > 1 {
            (WIDTH - 2.0 * MARGIN) / (values.len() - 1) as f64
        } else {
            0.0
        };

        let mut points = String::new();
        for (i, value) in values.iter().enumerate() {
            let px = MARGIN + step * i as f64;
            let py = HEIGHT - MARGIN - (value - min) / span * (HEIGHT - 2.0 * MARGIN);
            let _ = write!(points, "{:.1},{:.1} ", px, py);
        }

        let mut svg = String::new();
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}">"#,
            WIDTH as u32, HEIGHT as u32
        );
        if !title.is_empty() {
            let _ = writeln!(
                svg,
                r#"<text x="{}" y="20" text-anchor="middle">{}</text>"#,
                (WIDTH / 2.0) as u32,
                title
            );
        }
        let _ = writeln!(
            svg,
            r#"<polyline fill="none" stroke="steelblue" stroke-width="2" points="{}"/>"#,
            points.trim_end()
        );
        for (i, label) in labels.iter().enumerate() {
            let px = MARGIN + step * i as f64;
            let _ = writeln!(
                svg,
                r#"<text x="{:.1}" y="{:.1}" font-size="10" text-anchor="middle">{}</text>"#,
                px,
                HEIGHT - MARGIN / 2.0,
                label
            );
        }
        svg.push_str("</svg>\n");

        Ok(vec![Artifact::ChartImage {
            bytes: svg.into_bytes(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_core::tool::ToolValue;
    use analyst_core::types::TableData;

    #[test]
    fn test_plot_renders_svg_with_points_and_labels() {
        tokio_test::block_on(async {
            let table = Artifact::Table(TableData::new(
                vec!["month".to_string(), "total".to_string()],
                vec![
                    vec![json!("2026-01"), json!(15.0)],
                    vec![json!("2026-02"), json!(7.5)],
                ],
            ));
            let input = ToolInput::new()
                .with("data", ToolValue::from(table))
                .with("x", ToolValue::from(json!("month")))
                .with("y", ToolValue::from(json!("total")))
                .with("title", ToolValue::from(json!("Sales")));
            let outputs = PlotTool.run(input, ToolContext::new("r", "s")).await.unwrap();

            let Artifact::ChartImage { bytes } = &outputs[0] else {
                panic!("expected chart output");
            };
            let svg = std::str::from_utf8(bytes).unwrap();
            assert!(svg.starts_with("<svg"));
            assert!(svg.contains("polyline"));
            assert!(svg.contains("Sales"));
            assert!(svg.contains("2026-02"));
        });
    }

    #[test]
    fn test_non_numeric_y_column_is_rejected() {
        tokio_test::block_on(async {
            let table = Artifact::Table(TableData::new(
                vec!["month".to_string(), "note".to_string()],
                vec![vec![json!("2026-01"), json!("n/a")]],
            ));
            let input = ToolInput::new()
                .with("data", ToolValue::from(table))
                .with("x", ToolValue::from(json!("month")))
                .with("y", ToolValue::from(json!("note")))
                .with("title", ToolValue::from(json!("")));
            let err = PlotTool
                .run(input, ToolContext::new("r", "s"))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "missing_upstream_data");
        });
    }
}
