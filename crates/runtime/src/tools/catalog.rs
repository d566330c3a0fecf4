//! The fixed set of database tools offered to the model.

use std::str::FromStr;
use std::sync::LazyLock;

use serde_json::json;
use thiserror::Error;

use crate::model::ToolSpec;

static CATALOG: LazyLock<Vec<ToolSpec>> =
    LazyLock::new(|| ToolName::ALL.into_iter().map(ToolName::spec).collect());

/// Tool specifications in the order they are offered to the model.
pub fn describe_tools() -> &'static [ToolSpec] {
    &CATALOG
}

/// Name of a tool in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    QueryDatabase,
    GetTables,
    DescribeTable,
}

#[derive(Debug, Clone, Error)]
#[error("unknown tool: {0}")]
pub struct UnknownTool(pub String);

impl ToolName {
    pub const ALL: [ToolName; 3] = [Self::QueryDatabase, Self::GetTables, Self::DescribeTable];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::QueryDatabase => "query_database",
            Self::GetTables => "get_tables",
            Self::DescribeTable => "describe_table",
        }
    }

    fn spec(self) -> ToolSpec {
        let (description, parameters) = match self {
            Self::QueryDatabase => (
                "Run an SQL statement against the database and return the result rows",
                json!({
                    "type": "object",
                    "properties": {
                        "sql": {
                            "type": "string",
                            "description": "The SQL statement to execute"
                        }
                    },
                    "required": ["sql"]
                }),
            ),
            Self::GetTables => (
                "List all tables in the database",
                json!({
                    "type": "object",
                    "properties": {}
                }),
            ),
            Self::DescribeTable => (
                "Show the column structure of a table",
                json!({
                    "type": "object",
                    "properties": {
                        "table_name": {
                            "type": "string",
                            "description": "Name of the table to describe"
                        }
                    },
                    "required": ["table_name"]
                }),
            ),
        };

        ToolSpec {
            name: self.as_str().to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

impl FromStr for ToolName {
    type Err = UnknownTool;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| UnknownTool(s.to_string()))
    }
}
