//! Column-role resolution for the roster table.
//!
//! Roster files and tables arrive with whatever headers the registrar
//! exported. These heuristics pick the identifier, name, gender and
//! nationality columns by substring rules, in declaration order. The
//! first-two-columns fallback for identity resolution is a silent
//! degrade that verification depends on; do not tighten it.

/// Exact lower-cased aliases accepted for the identifier column when the
/// substring rule does not fire.
const ID_ALIASES: &[&str] = &["studentno", "student_no", "student_id", "studentid", "id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Id,
    Name,
    Gender,
    Nationality,
}

fn matches_role(label: &str, role: ColumnRole) -> bool {
    let lower = label.to_lowercase();
    match role {
        ColumnRole::Id => {
            (lower.contains("student")
                && (lower.contains("number") || lower.contains("no") || lower.contains("id")))
                || ID_ALIASES.contains(&lower.as_str())
        }
        ColumnRole::Name => lower.contains("name") && !lower.contains("nick"),
        ColumnRole::Gender => lower.contains("gender"),
        ColumnRole::Nationality => lower.contains("national"),
    }
}

/// First column (in declaration order) matching the role's rules.
pub fn resolve(columns: &[String], role: ColumnRole) -> Option<&str> {
    columns
        .iter()
        .find(|label| matches_role(label, role))
        .map(|s| s.as_str())
}

/// Identifier and name columns for verification. When either role fails
/// to resolve, BOTH fall back to the first and second declared columns.
/// Returns `None` only when fewer than two columns exist.
pub fn identity_columns(columns: &[String]) -> Option<(String, String)> {
    let id = resolve(columns, ColumnRole::Id);
    let name = resolve(columns, ColumnRole::Name);

    match (id, name) {
        (Some(id), Some(name)) => Some((id.to_string(), name.to_string())),
        _ if columns.len() >= 2 => Some((columns[0].clone(), columns[1].clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn id_substring_rule_beats_alias_order() {
        let columns = cols(&["Nickname", "Student Number", "Name"]);
        assert_eq!(resolve(&columns, ColumnRole::Id), Some("Student Number"));
    }

    #[test]
    fn id_alias_set_matches_exactly() {
        let columns = cols(&["studentno", "Name"]);
        assert_eq!(resolve(&columns, ColumnRole::Id), Some("studentno"));
        // "ident" is not in the alias set and lacks "student"
        let columns = cols(&["ident", "Name"]);
        assert_eq!(resolve(&columns, ColumnRole::Id), None);
    }

    #[test]
    fn name_rule_skips_nicknames() {
        let columns = cols(&["Nickname", "Full Name"]);
        assert_eq!(resolve(&columns, ColumnRole::Name), Some("Full Name"));
    }

    #[test]
    fn first_match_wins_in_declaration_order() {
        let columns = cols(&["Gender", "Gender (self-reported)"]);
        assert_eq!(resolve(&columns, ColumnRole::Gender), Some("Gender"));
    }

    #[test]
    fn nationality_matches_national_prefix() {
        let columns = cols(&["Name", "Nationality"]);
        assert_eq!(
            resolve(&columns, ColumnRole::Nationality),
            Some("Nationality")
        );
    }

    #[test]
    fn identity_resolves_both_roles() {
        let columns = cols(&["Student ID", "Name", "Gender"]);
        assert_eq!(
            identity_columns(&columns),
            Some(("Student ID".to_string(), "Name".to_string()))
        );
    }

    #[test]
    fn identity_falls_back_to_first_two_columns() {
        // Neither role resolves; both degrade to positional columns.
        let columns = cols(&["Matric", "Person", "Gender"]);
        assert_eq!(
            identity_columns(&columns),
            Some(("Matric".to_string(), "Person".to_string()))
        );
    }

    #[test]
    fn partial_resolution_still_degrades_both() {
        // Name resolves but the identifier does not; the fallback
        // replaces both, matching the historical behavior.
        let columns = cols(&["Matric", "Gender", "Full Name"]);
        assert_eq!(
            identity_columns(&columns),
            Some(("Matric".to_string(), "Gender".to_string()))
        );
    }

    #[test]
    fn identity_fails_below_two_columns() {
        assert_eq!(identity_columns(&cols(&["Whatever"])), None);
        assert_eq!(identity_columns(&[]), None);
    }
}
