//! Data-quality rule evaluation.
//!
//! Rules arrive as a JSON array; each entry names a rule kind and its
//! parameters. A rule that cannot be understood fails its own result entry
//! instead of the whole call.

use crate::{EngineContext, EngineError, Result};
use flatfile_store::{quote_identifier, quote_string_literal};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

#[derive(Debug, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
enum QualityRule {
    NotNull { column: String },
    Unique { column: String },
    Min { column: String, value: f64 },
    Max { column: String, value: f64 },
    AllowedValues { column: String, values: Vec<JsonValue> },
    RowCountMin { value: u64 },
}

impl EngineContext {
    /// Evaluate `rules_json` against dataset `name`.
    pub fn evaluate_quality_rules(&self, name: &str, rules_json: &str) -> Result<JsonValue> {
        if !self.registry().contains(name) {
            return Err(EngineError::UnknownDataset(name.to_string()));
        }
        let entries: Vec<JsonValue> = serde_json::from_str(rules_json)
            .map_err(|err| EngineError::MalformedInput(format!("quality rules: {err}")))?;

        let columns: Vec<String> = self
            .store()
            .table_columns(name)
            .map_err(|err| EngineError::Sql(err.to_string()))?
            .into_iter()
            .map(|column| column.name)
            .collect();

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let label = entry
                .get("rule")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();
            let column = entry
                .get("column")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let rule: QualityRule = match serde_json::from_value(entry) {
                Ok(rule) => rule,
                Err(err) => {
                    results.push(json!({
                        "rule": label,
                        "column": column,
                        "passed": false,
                        "violationCount": 0,
                        "message": format!("unrecognized rule: {err}"),
                    }));
                    continue;
                }
            };
            results.push(self.evaluate_rule(name, &columns, &label, rule)?);
        }

        Ok(json!({ "dataset": name, "results": results }))
    }

    fn evaluate_rule(
        &self,
        dataset: &str,
        columns: &[String],
        label: &str,
        rule: QualityRule,
    ) -> Result<JsonValue> {
        let table = quote_identifier(dataset);

        let (column, violations_sql): (Option<String>, Option<String>) = match &rule {
            QualityRule::NotNull { column } => (
                Some(column.clone()),
                Some(format!(
                    "SELECT COUNT(*) FROM {table} WHERE {} IS NULL",
                    quote_identifier(column)
                )),
            ),
            QualityRule::Unique { column } => {
                let ident = quote_identifier(column);
                (
                    Some(column.clone()),
                    Some(format!(
                        "SELECT COALESCE(SUM(n), 0) FROM (SELECT COUNT(*) AS n FROM {table} \
                         WHERE {ident} IS NOT NULL GROUP BY {ident} HAVING COUNT(*) > 1)"
                    )),
                )
            }
            QualityRule::Min { column, value } => (
                Some(column.clone()),
                Some(format!(
                    "SELECT COUNT(*) FROM {table} WHERE {} < {value}",
                    quote_identifier(column)
                )),
            ),
            QualityRule::Max { column, value } => (
                Some(column.clone()),
                Some(format!(
                    "SELECT COUNT(*) FROM {table} WHERE {} > {value}",
                    quote_identifier(column)
                )),
            ),
            QualityRule::AllowedValues { column, values } => {
                let mut literals = Vec::with_capacity(values.len());
                for value in values {
                    match value {
                        JsonValue::String(text) => literals.push(quote_string_literal(text)),
                        JsonValue::Number(number) => literals.push(number.to_string()),
                        JsonValue::Bool(flag) => {
                            literals.push((if *flag { "1" } else { "0" }).to_string())
                        }
                        other => {
                            return Ok(json!({
                                "rule": label,
                                "column": column,
                                "passed": false,
                                "violationCount": 0,
                                "message": format!("unsupported allowed value: {other}"),
                            }));
                        }
                    }
                }
                let ident = quote_identifier(column);
                (
                    Some(column.clone()),
                    Some(format!(
                        "SELECT COUNT(*) FROM {table} WHERE {ident} IS NOT NULL \
                         AND {ident} NOT IN ({})",
                        literals.join(", ")
                    )),
                )
            }
            QualityRule::RowCountMin { .. } => (None, None),
        };

        if let Some(column) = &column {
            if !columns.iter().any(|c| c == column) {
                return Ok(json!({
                    "rule": label,
                    "column": column,
                    "passed": false,
                    "violationCount": 0,
                    "message": format!("no column named `{column}`"),
                }));
            }
        }

        let violation_count = match (&rule, violations_sql) {
            (QualityRule::RowCountMin { value }, _) => {
                let rows = self
                    .store()
                    .row_count(dataset)
                    .map_err(|err| EngineError::Sql(err.to_string()))?;
                value.saturating_sub(rows)
            }
            (_, Some(sql)) => self.count_scalar(&sql)?,
            (_, None) => 0,
        };

        Ok(json!({
            "rule": label,
            "column": column,
            "passed": violation_count == 0,
            "violationCount": violation_count,
            "message": JsonValue::Null,
        }))
    }

    fn count_scalar(&self, sql: &str) -> Result<u64> {
        let output = self
            .store()
            .query(sql)
            .map_err(|err| EngineError::Sql(err.to_string()))?;
        Ok(output
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(|value| value.as_u64())
            .unwrap_or(0))
    }
}
