//! Column-type inference shared by the text-based importers.

use flatfile_store::{CellValue, ColumnAffinity};

/// Running tally of the value kinds seen in one column.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ColumnTally {
    pub integers: u64,
    pub reals: u64,
    pub texts: u64,
}

impl ColumnTally {
    pub fn observe(&mut self, value: &CellValue) {
        match value {
            CellValue::Null => {}
            CellValue::Integer(_) => self.integers += 1,
            CellValue::Real(_) => self.reals += 1,
            CellValue::Text(_) => self.texts += 1,
        }
    }

    /// Majority affinity, with ties broken toward the wider type.
    pub fn affinity(&self) -> ColumnAffinity {
        let max = self.integers.max(self.reals).max(self.texts);
        if max == 0 || self.texts == max {
            ColumnAffinity::Text
        } else if self.reals == max {
            ColumnAffinity::Real
        } else {
            ColumnAffinity::Integer
        }
    }
}

/// Interpret one raw text field: empty fields are NULL, lexical integers and
/// reals become typed values, everything else stays text.
pub(crate) fn parse_text_field(field: &str) -> CellValue {
    if field.is_empty() {
        return CellValue::Null;
    }
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return CellValue::Text(field.to_string());
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return CellValue::Integer(int);
    }
    if let Ok(real) = trimmed.parse::<f64>() {
        if real.is_finite() {
            return CellValue::Real(real);
        }
    }
    CellValue::Text(field.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_parsing() {
        assert_eq!(parse_text_field(""), CellValue::Null);
        assert_eq!(parse_text_field("42"), CellValue::Integer(42));
        assert_eq!(parse_text_field("-1.5"), CellValue::Real(-1.5));
        assert_eq!(parse_text_field("inf"), CellValue::Text("inf".to_string()));
        assert_eq!(parse_text_field("DE"), CellValue::Text("DE".to_string()));
    }

    #[test]
    fn majority_affinity() {
        let mut tally = ColumnTally::default();
        for value in [
            CellValue::Integer(1),
            CellValue::Integer(2),
            CellValue::Real(0.5),
            CellValue::Null,
        ] {
            tally.observe(&value);
        }
        assert_eq!(tally.affinity(), ColumnAffinity::Integer);

        let mut mixed = ColumnTally::default();
        mixed.observe(&CellValue::Integer(1));
        mixed.observe(&CellValue::Text("x".to_string()));
        assert_eq!(mixed.affinity(), ColumnAffinity::Text);

        assert_eq!(ColumnTally::default().affinity(), ColumnAffinity::Text);
    }
}
