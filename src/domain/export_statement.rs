//! Builds the `COPY ... TO STDOUT` statement for an export request.
//!
//! Identifiers and the predicate are spliced in verbatim. Callers that do not
//! trust their input should run `request_validation::check_identifiers` first.

use crate::domain::entities::{ExportRequest, ExportStatement};

/// Builds the inner `SELECT` for a request.
///
/// An empty column list projects `*`; an absent or empty filter adds no
/// `WHERE` clause at all.
pub fn build_select(request: &ExportRequest) -> String {
    let projection = if request.columns.is_empty() {
        "*".to_string()
    } else {
        request.columns.join(", ")
    };

    let mut sql = format!(
        "SELECT {} FROM {}.{}.{}",
        projection, request.database, request.schema, request.table
    );

    if let Some(filter) = request.filter.as_deref().filter(|f| !f.is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(filter);
    }

    sql
}

/// Wraps the `SELECT` for server-side CSV streaming with every field quoted.
pub fn build_export_statement(request: &ExportRequest, include_header: bool) -> ExportStatement {
    let select = build_select(request);
    let options = if include_header {
        "FORMAT CSV, HEADER, FORCE_QUOTE *"
    } else {
        "FORMAT CSV, FORCE_QUOTE *"
    };
    let copy = format!("COPY ({}) TO STDOUT WITH ({})", select, options);

    ExportStatement { select, copy }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::LogicalDatabase;

    fn request(columns: &[&str], filter: Option<&str>) -> ExportRequest {
        ExportRequest {
            database: LogicalDatabase::Main,
            schema: "public".to_string(),
            table: "users".to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            filter: filter.map(String::from),
        }
    }

    #[test]
    fn test_wildcard_without_filter() {
        let stmt = build_export_statement(&request(&[], None), false);
        assert_eq!(stmt.select, "SELECT * FROM main.public.users");
        assert_eq!(
            stmt.copy,
            "COPY (SELECT * FROM main.public.users) TO STDOUT WITH (FORMAT CSV, FORCE_QUOTE *)"
        );
    }

    #[test]
    fn test_empty_filter_adds_no_where() {
        let sql = build_select(&request(&[], Some("")));
        assert_eq!(sql, "SELECT * FROM main.public.users");
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn test_projection_keeps_column_order() {
        let sql = build_select(&request(&["email", "id", "created_at"], None));
        assert_eq!(sql, "SELECT email, id, created_at FROM main.public.users");
    }

    #[test]
    fn test_filter_is_appended_verbatim_once() {
        let filter = "created_at >= '2024-01-01' AND status IN ('a', 'b')";
        let sql = build_select(&request(&["id"], Some(filter)));
        assert_eq!(
            sql,
            format!("SELECT id FROM main.public.users WHERE {}", filter)
        );
        assert_eq!(sql.matches(" WHERE ").count(), 1);
    }

    #[test]
    fn test_users_scenario() {
        let stmt = build_export_statement(&request(&["id", "email"], Some("active = true")), false);
        assert_eq!(
            stmt.select,
            "SELECT id, email FROM main.public.users WHERE active = true"
        );
        assert_eq!(
            stmt.copy,
            "COPY (SELECT id, email FROM main.public.users WHERE active = true) TO STDOUT WITH (FORMAT CSV, FORCE_QUOTE *)"
        );
    }

    #[test]
    fn test_header_option() {
        let stmt = build_export_statement(&request(&[], None), true);
        assert!(stmt.copy.ends_with("WITH (FORMAT CSV, HEADER, FORCE_QUOTE *)"));
    }

    #[test]
    fn test_deterministic() {
        let req = request(&["a", "b"], Some("a > 1"));
        assert_eq!(
            build_export_statement(&req, false),
            build_export_statement(&req, false)
        );
    }

    #[test]
    fn test_uses_logical_database_qualifier() {
        let mut req = request(&[], None);
        req.database = LogicalDatabase::Properties;
        assert_eq!(build_select(&req), "SELECT * FROM properties.public.users");
    }
}
