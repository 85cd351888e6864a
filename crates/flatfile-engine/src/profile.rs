//! Per-column dataset profiling, computed with aggregate SQL in the store.

use crate::{EngineContext, EngineError, Result};
use flatfile_store::quote_identifier;
use serde_json::{json, Value as JsonValue};

impl EngineContext {
    /// Summary statistics for every column of `name`: non-null, null and
    /// distinct counts plus min/max as the store orders them.
    pub fn profile_dataset(&self, name: &str) -> Result<JsonValue> {
        if !self.registry().contains(name) {
            return Err(EngineError::UnknownDataset(name.to_string()));
        }
        let columns = self
            .store()
            .table_columns(name)
            .map_err(|err| EngineError::Sql(err.to_string()))?;
        let row_count = self
            .store()
            .row_count(name)
            .map_err(|err| EngineError::Sql(err.to_string()))?;

        let table = quote_identifier(name);
        let mut profiles = Vec::with_capacity(columns.len());
        for column in &columns {
            let ident = quote_identifier(&column.name);
            let sql = format!(
                "SELECT COUNT({ident}), COUNT(DISTINCT {ident}), MIN({ident}), MAX({ident}) \
                 FROM {table}"
            );
            let output = self
                .store()
                .query(&sql)
                .map_err(|err| EngineError::Sql(err.to_string()))?;
            let row = output
                .rows
                .first()
                .ok_or_else(|| EngineError::Internal("profile query returned no row".into()))?;
            let non_null = row[0].as_u64().unwrap_or(0);
            profiles.push(json!({
                "name": column.name,
                "type": column.ty,
                "nonNullCount": non_null,
                "nullCount": row_count.saturating_sub(non_null),
                "distinctCount": row[1].as_u64().unwrap_or(0),
                "min": row[2].clone(),
                "max": row[3].clone(),
            }));
        }

        Ok(json!({
            "dataset": name,
            "rowCount": row_count,
            "columns": profiles,
        }))
    }
}
