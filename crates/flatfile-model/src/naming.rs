//! Canonical dataset naming.
//!
//! Default names are a pure function of the source file name and the object
//! inside it, so a manifest round-trip reproduces the same registry keys.

/// SQLite keywords, per <https://sqlite.org/lang_keywords.html>. A dataset may
/// not be renamed to any of these.
const RESERVED_WORDS: &[&str] = &[
    "abort", "action", "add", "after", "all", "alter", "always", "analyze", "and", "as", "asc",
    "attach", "autoincrement", "before", "begin", "between", "by", "cascade", "case", "cast",
    "check", "collate", "column", "commit", "conflict", "constraint", "create", "cross",
    "current", "current_date", "current_time", "current_timestamp", "database", "default",
    "deferrable", "deferred", "delete", "desc", "detach", "distinct", "do", "drop", "each",
    "else", "end", "escape", "except", "exclude", "exclusive", "exists", "explain", "fail",
    "filter", "first", "following", "for", "foreign", "from", "full", "generated", "glob",
    "group", "groups", "having", "if", "ignore", "immediate", "in", "index", "indexed",
    "initially", "inner", "insert", "instead", "intersect", "into", "is", "isnull", "join",
    "key", "last", "left", "like", "limit", "match", "materialized", "natural", "no", "not",
    "nothing", "notnull", "null", "nulls", "of", "offset", "on", "or", "order", "others",
    "outer", "over", "partition", "plan", "pragma", "preceding", "primary", "query", "raise",
    "range", "recursive", "references", "regexp", "reindex", "release", "rename", "replace",
    "restrict", "returning", "right", "rollback", "row", "rows", "savepoint", "select", "set",
    "table", "temp", "temporary", "then", "ties", "to", "transaction", "trigger", "unbounded",
    "union", "unique", "update", "using", "vacuum", "values", "view", "virtual", "when",
    "where", "window", "with", "without",
];

/// Lowercase `raw` and collapse every run of non-alphanumeric characters into
/// a single underscore, trimming underscores at both ends. Inputs with no
/// alphanumeric content sanitize to `"unnamed"`.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    if out.is_empty() {
        return "unnamed".to_string();
    }
    // A leading digit would not survive as a bare SQL identifier.
    if out.as_bytes()[0].is_ascii_digit() {
        out.insert(0, '_');
    }
    out
}

/// File name without directories and without the final extension.
pub fn file_stem(file_name: &str) -> &str {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    }
}

/// Derive the canonical dataset name for an object produced from `file_name`.
///
/// Multi-object sources qualify the file stem with the object name
/// (`sales__sheet1`). Single-object sources use the bare stem when they are
/// the workbook's base file and the full file name once attached on top of an
/// existing workbook, so `a.csv` and `a.tsv` attached together stay distinct.
pub fn default_dataset_name(file_name: &str, object_name: Option<&str>, base: bool) -> String {
    match object_name {
        Some(object) => format!(
            "{}__{}",
            sanitize_identifier(file_stem(file_name)),
            sanitize_identifier(object)
        ),
        None if base => sanitize_identifier(file_stem(file_name)),
        None => sanitize_identifier(file_name),
    }
}

/// Whether `name` can serve as a dataset's technical name: a bare SQL
/// identifier that is not an SQLite keyword.
pub fn is_valid_dataset_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return false;
    }
    !RESERVED_WORDS.contains(&name.to_ascii_lowercase().as_str())
}

/// Resolve a name collision by appending `_2`, `_3`, ... in order.
///
/// `taken` reports whether a candidate is already claimed; the original
/// `candidate` is returned untouched when free.
pub fn resolve_name_collision(candidate: &str, mut taken: impl FnMut(&str) -> bool) -> String {
    if !taken(candidate) {
        return candidate.to_string();
    }
    let mut suffix = 2u64;
    loop {
        let attempt = format!("{candidate}_{suffix}");
        if !taken(&attempt) {
            return attempt;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sanitize_basics() {
        assert_eq!(sanitize_identifier("Orders 2024.v2"), "orders_2024_v2");
        assert_eq!(sanitize_identifier("__weird--name__"), "weird_name");
        assert_eq!(sanitize_identifier("!!!"), "unnamed");
        assert_eq!(sanitize_identifier("2024"), "_2024");
    }

    #[test]
    fn stems() {
        assert_eq!(file_stem("orders.csv"), "orders");
        assert_eq!(file_stem("dir/sub/orders.csv"), "orders");
        assert_eq!(file_stem("archive.tar.gz"), "archive.tar");
        assert_eq!(file_stem(".hidden"), ".hidden");
        assert_eq!(file_stem("noext"), "noext");
    }

    #[test]
    fn default_names() {
        assert_eq!(default_dataset_name("orders.csv", None, true), "orders");
        assert_eq!(
            default_dataset_name("customers.csv", None, false),
            "customers_csv"
        );
        assert_eq!(
            default_dataset_name("Sales Q1.xlsx", Some("West Region"), false),
            "sales_q1__west_region"
        );
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_dataset_name("orders"));
        assert!(is_valid_dataset_name("_tmp2"));
        assert!(!is_valid_dataset_name(""));
        assert!(!is_valid_dataset_name("2fast"));
        assert!(!is_valid_dataset_name("has space"));
        assert!(!is_valid_dataset_name("select"));
        assert!(!is_valid_dataset_name("TABLE"));
    }

    #[test]
    fn collision_suffixes() {
        let taken = ["orders", "orders_2"];
        let resolved = resolve_name_collision("orders", |name| taken.contains(&name));
        assert_eq!(resolved, "orders_3");
        let free = resolve_name_collision("customers", |name| taken.contains(&name));
        assert_eq!(free, "customers");
    }

    proptest! {
        #[test]
        fn sanitized_names_are_valid_identifiers(raw in ".{0,64}") {
            let cleaned = sanitize_identifier(&raw);
            prop_assert!(!cleaned.is_empty());
            let mut chars = cleaned.chars();
            let first = chars.next().unwrap();
            prop_assert!(first.is_ascii_lowercase() || first == '_');
            prop_assert!(chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
        }

        #[test]
        fn sanitize_is_idempotent(raw in ".{0,64}") {
            let once = sanitize_identifier(&raw);
            prop_assert_eq!(sanitize_identifier(&once), once);
        }
    }
}
