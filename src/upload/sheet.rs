use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Column positions of an org upload sheet
pub const COL_CODE: usize = 0;
pub const COL_DESCRIPTION: usize = 1;
pub const COL_PARENT_CODE: usize = 2;
pub const COL_DOMAIN: usize = 3;

/// One row of a decoded spreadsheet. Cells arrive as JSON scalars; numbers
/// and booleans are kept in their textual form, nulls become empty cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SheetRow(Vec<String>);

impl SheetRow {
    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(cells.into_iter().map(Into::into).collect())
    }

    /// Missing trailing cells read as empty
    pub fn cell(&self, index: usize) -> &str {
        self.0.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|c| c.trim().is_empty())
    }
}

impl<'de> Deserialize<'de> for SheetRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let cells = Vec::<Value>::deserialize(deserializer)?;
        Ok(Self(
            cells
                .into_iter()
                .map(|cell| match cell {
                    Value::Null => String::new(),
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
        ))
    }
}

/// Request body of the upload endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadSheet {
    #[serde(default)]
    pub rows: Vec<SheetRow>,
}
