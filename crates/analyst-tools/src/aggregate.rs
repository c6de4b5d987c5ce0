//! aggregate tool

use async_trait::async_trait;
use serde_json::{json, Value};

use analyst_core::error::CoreError;
use analyst_core::tool::{FieldSpec, FieldType, Tool, ToolContext, ToolInput, ToolSpec};
use analyst_core::types::Artifact;

/// Group-by reduction over one value column. Groups keep first-seen order.
pub struct AggregateTool;

fn reduce(op: &str, values: &[f64]) -> Option<f64> {
    match op {
        "sum" => Some(values.iter().sum()),
        "avg" => {
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        "count" => Some(values.len() as f64),
        "min" => values.iter().cloned().reduce(f64::min),
        "max" => values.iter().cloned().reduce(f64::max),
        _ => None,
    }
}

#[async_trait]
impl Tool for AggregateTool {
    fn function_name(&self) -> &str {
        "aggregate"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "Aggregate",
            "aggregate",
            "Group a table by one column and reduce a value column (sum/avg/count/min/max)",
        )
        .with_input(FieldSpec::new("data", FieldType::Table))
        .with_input(
            FieldSpec::new("group_by", FieldType::String).with_description("Column to group on"),
        )
        .with_input(
            FieldSpec::new("value", FieldType::String).with_description("Numeric column to reduce"),
        )
        .with_input(
            FieldSpec::new("agg", FieldType::String)
                .with_description("sum, avg, count, min, or max")
                .with_default(json!("sum")),
        )
        .with_output(FieldSpec::new("result", FieldType::Table))
        .protected()
    }

    async fn run(&self, input: ToolInput, _ctx: ToolContext) -> Result<Vec<Artifact>, CoreError> {
        let table = input.require_table("data")?;
        let group_by = input.require_str("group_by")?;
        let value = input.require_str("value")?;
        let agg = input.require_str("agg")?;

        let group_idx = table
            .column_index(group_by)
            .ok_or_else(|| CoreError::missing_field(group_by))?;
        let value_idx = table
            .column_index(value)
            .ok_or_else(|| CoreError::missing_field(value))?;

        // First-seen group order keeps output deterministic without sorting.
        let mut order: Vec<String> = Vec::new();
        let mut buckets: std::collections::HashMap<String, Vec<f64>> =
            std::collections::HashMap::new();
        for row in &table.rows {
            let key = match row.get(group_idx) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => continue,
            };
            let number = row.get(value_idx).and_then(Value::as_f64);
            let Some(number) = number else {
                return Err(CoreError::missing_field(value));
            };
            if !buckets.contains_key(&key) {
                order.push(key.clone());
            }
            buckets.entry(key).or_default().push(number);
        }

        let mut rows = Vec::with_capacity(order.len());
        for key in order {
            let values = &buckets[&key];
            let reduced = reduce(agg, values).ok_or_else(|| {
                CoreError::internal(format!("unsupported aggregation '{}'", agg))
            })?;
            rows.push(vec![json!(key), json!(reduced)]);
        }

        Ok(vec![Artifact::table(
            vec![group_by.to_string(), format!("{}_{}", agg, value)],
            rows,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_core::tool::ToolValue;
    use analyst_core::types::TableData;

    fn orders() -> Artifact {
        Artifact::Table(TableData::new(
            vec!["month".to_string(), "amount".to_string()],
            vec![
                vec![json!("2026-02"), json!(7.5)],
                vec![json!("2026-01"), json!(10.0)],
                vec![json!("2026-01"), json!(5.0)],
            ],
        ))
    }

    #[test]
    fn test_sum_keeps_first_seen_group_order() {
        tokio_test::block_on(async {
            let input = ToolInput::new()
                .with("data", ToolValue::from(orders()))
                .with("group_by", ToolValue::from(json!("month")))
                .with("value", ToolValue::from(json!("amount")))
                .with("agg", ToolValue::from(json!("sum")));
            let outputs = AggregateTool
                .run(input, ToolContext::new("r", "s"))
                .await
                .unwrap();
            let table = outputs[0].as_table().unwrap();
            assert_eq!(table.columns, vec!["month", "sum_amount"]);
            assert_eq!(
                table.rows,
                vec![
                    vec![json!("2026-02"), json!(7.5)],
                    vec![json!("2026-01"), json!(15.0)],
                ]
            );
        });
    }

    #[test]
    fn test_unknown_column_is_missing_upstream_data() {
        tokio_test::block_on(async {
            let input = ToolInput::new()
                .with("data", ToolValue::from(orders()))
                .with("group_by", ToolValue::from(json!("region")))
                .with("value", ToolValue::from(json!("amount")))
                .with("agg", ToolValue::from(json!("sum")));
            let err = AggregateTool
                .run(input, ToolContext::new("r", "s"))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "missing_upstream_data");
            assert!(err.to_string().contains("'region'"));
        });
    }

    #[test]
    fn test_unsupported_aggregation_is_rejected() {
        tokio_test::block_on(async {
            let input = ToolInput::new()
                .with("data", ToolValue::from(orders()))
                .with("group_by", ToolValue::from(json!("month")))
                .with("value", ToolValue::from(json!("amount")))
                .with("agg", ToolValue::from(json!("median")));
            let err = AggregateTool
                .run(input, ToolContext::new("r", "s"))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("median"));
        });
    }
}
