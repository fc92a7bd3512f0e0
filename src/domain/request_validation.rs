//! Optional allow-listing of SQL identifiers in export requests.
//!
//! Off by default: the exporter trusts its callers. When enabled, schema,
//! table and column names must be plain identifiers. The filter predicate is
//! never checked.

use crate::domain::entities::ExportRequest;
use crate::domain::errors::{ExportError, Result};
use regex::Regex;
use std::sync::LazyLock;

/// PostgreSQL silently truncates identifiers longer than this (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Unquoted identifier of at most `MAX_IDENTIFIER_LENGTH` bytes.
static IDENTIFIER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]{0,62}$").unwrap());

pub fn check_identifiers(request: &ExportRequest) -> Result<()> {
    let names = [("schema", &request.schema), ("table", &request.table)]
        .into_iter()
        .chain(request.columns.iter().map(|c| ("column", c)));

    for (what, name) in names {
        if !IDENTIFIER_REGEX.is_match(name) {
            return Err(ExportError::InvalidRequest(format!(
                "{} name {:?} is not a plain identifier of at most {} characters",
                what, name, MAX_IDENTIFIER_LENGTH
            )));
        }
    }
    Ok(())
}
