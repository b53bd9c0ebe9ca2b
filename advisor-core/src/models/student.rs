use serde::{Deserialize, Serialize};

/// One row of the roster table, as an ordered list of (column, value)
/// pairs. Column order follows the table's declaration order, which
/// matters for the column-resolution fallback. Records are snapshots;
/// nothing in the core mutates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    fields: Vec<(String, String)>,
}

impl StudentRecord {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Value of a column by exact name.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Render the record as "Column: value" lines for prompt context.
    pub fn display_block(&self) -> String {
        self.fields
            .iter()
            .map(|(c, v)| format!("{}: {}", c, v))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
