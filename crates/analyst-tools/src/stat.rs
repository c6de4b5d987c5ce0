//! stat_test tool

use async_trait::async_trait;
use serde_json::json;

use analyst_core::error::CoreError;
use analyst_core::tool::{FieldSpec, FieldType, Tool, ToolContext, ToolInput, ToolSpec};
use analyst_core::types::{Artifact, TableData};

/// Pearson correlation or Welch's t-test between two numeric columns.
pub struct StatTestTool;

fn numeric_column(table: &TableData, name: &str) -> Result<Vec<f64>, CoreError> {
    let values: Vec<f64> = table
        .column_values(name)
        .ok_or_else(|| CoreError::missing_field(name))?
        .iter()
        .filter_map(|v| v.as_f64())
        .collect();
    if values.len() != table.rows.len() {
        return Err(CoreError::missing_field(name));
    }
    Ok(values)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64], mean: f64) -> f64 {
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (values.len() - 1) as f64
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let mean_a = mean(a);
    let mean_b = mean(b);
    let cov: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum();
    let var_a: f64 = a.iter().map(|x| (x - mean_a) * (x - mean_a)).sum();
    let var_b: f64 = b.iter().map(|y| (y - mean_b) * (y - mean_b)).sum();
    let denom = (var_a * var_b).sqrt();
    (denom > 0.0).then(|| cov / denom)
}

/// Welch's t statistic for unequal variances.
fn welch_t(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    let mean_a = mean(a);
    let mean_b = mean(b);
    let se = (variance(a, mean_a) / a.len() as f64 + variance(b, mean_b) / b.len() as f64).sqrt();
    (se > 0.0).then(|| (mean_a - mean_b) / se)
}

#[async_trait]
impl Tool for StatTestTool {
    fn function_name(&self) -> &str {
        "stat_test"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "Statistical Test",
            "stat_test",
            "Pearson correlation or Welch's t-test between two numeric columns",
        )
        .with_input(FieldSpec::new("data", FieldType::Table))
        .with_input(FieldSpec::new("a", FieldType::String).with_description("First column"))
        .with_input(FieldSpec::new("b", FieldType::String).with_description("Second column"))
        .with_input(
            FieldSpec::new("test", FieldType::String)
                .with_description("pearson or t_test")
                .with_default(json!("pearson")),
        )
        .with_output(FieldSpec::new("statistic", FieldType::Number))
        .protected()
    }

    async fn run(&self, input: ToolInput, _ctx: ToolContext) -> Result<Vec<Artifact>, CoreError> {
        let table = input.require_table("data")?;
        let a = numeric_column(table, input.require_str("a")?)?;
        let b = numeric_column(table, input.require_str("b")?)?;
        let test = input.require_str("test")?;

        let statistic = match test {
            "pearson" => pearson(&a, &b),
            "t_test" => welch_t(&a, &b),
            other => {
                return Err(CoreError::internal(format!(
                    "unsupported test '{}'",
                    other
                )))
            }
        }
        .ok_or_else(|| CoreError::no_rows())?;

        Ok(vec![Artifact::scalar(json!({
            "test": test,
            "statistic": statistic,
        }))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_core::tool::ToolValue;

    fn linear_table() -> Artifact {
        Artifact::Table(TableData::new(
            vec!["x".to_string(), "y".to_string()],
            (0..8)
                .map(|i| vec![json!(i as f64), json!(3.0 * i as f64 - 2.0)])
                .collect(),
        ))
    }

    #[test]
    fn test_pearson_on_perfectly_linear_data() {
        tokio_test::block_on(async {
            let input = ToolInput::new()
                .with("data", ToolValue::from(linear_table()))
                .with("a", ToolValue::from(json!("x")))
                .with("b", ToolValue::from(json!("y")))
                .with("test", ToolValue::from(json!("pearson")));
            let outputs = StatTestTool
                .run(input, ToolContext::new("r", "s"))
                .await
                .unwrap();
            let value = outputs[0].as_scalar().unwrap();
            assert!((value["statistic"].as_f64().unwrap() - 1.0).abs() < 1e-9);
        });
    }

    #[test]
    fn test_welch_t_is_zero_for_identical_samples() {
        tokio_test::block_on(async {
            let table = Artifact::Table(TableData::new(
                vec!["a".to_string(), "b".to_string()],
                vec![
                    vec![json!(1.0), json!(1.0)],
                    vec![json!(2.0), json!(2.0)],
                    vec![json!(3.0), json!(3.0)],
                ],
            ));
            let input = ToolInput::new()
                .with("data", ToolValue::from(table))
                .with("a", ToolValue::from(json!("a")))
                .with("b", ToolValue::from(json!("b")))
                .with("test", ToolValue::from(json!("t_test")));
            let outputs = StatTestTool
                .run(input, ToolContext::new("r", "s"))
                .await
                .unwrap();
            let value = outputs[0].as_scalar().unwrap();
            assert!(value["statistic"].as_f64().unwrap().abs() < 1e-9);
        });
    }

    #[test]
    fn test_unsupported_test_name_is_rejected() {
        tokio_test::block_on(async {
            let input = ToolInput::new()
                .with("data", ToolValue::from(linear_table()))
                .with("a", ToolValue::from(json!("x")))
                .with("b", ToolValue::from(json!("y")))
                .with("test", ToolValue::from(json!("anova")));
            let err = StatTestTool
                .run(input, ToolContext::new("r", "s"))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("anova"));
        });
    }
}
