//! Synthetic table store: named tables of JSON records served through four
//! read-only tools on a [`SyntheticTransport`].

use serde_json::{Map, Value, json};

use crate::{error::Result, synthetic::SyntheticTransport, types::McpToolDef};

#[derive(Debug, Default, Clone)]
pub struct RecordStore {
    tables: Map<String, Value>,
    next_id: u64,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a table. Records without an `id` get `rec<N>`.
    pub fn add_table(&mut self, name: impl Into<String>, records: Vec<Value>) -> &mut Self {
        let records = records
            .into_iter()
            .map(|mut record| {
                if let Some(obj) = record.as_object_mut()
                    && !obj.contains_key("id")
                {
                    self.next_id += 1;
                    obj.insert("id".into(), json!(format!("rec{}", self.next_id)));
                }
                record
            })
            .collect();
        self.tables.insert(name.into(), Value::Array(records));
        self
    }

    pub fn tool_defs() -> Vec<McpToolDef> {
        let table_name = json!({"type": "string", "description": "Name of the table"});
        vec![
            McpToolDef::new(
                "list_records",
                "List all records in a table. Returns records and total count.",
                json!({
                    "type": "object",
                    "properties": {
                        "table_name": table_name,
                        "max_records": {"type": "integer", "description": "Max records to return"},
                    },
                    "required": ["table_name"],
                }),
            ),
            McpToolDef::new(
                "search_records",
                "Search for records matching a query string across all fields.",
                json!({
                    "type": "object",
                    "properties": {
                        "table_name": table_name,
                        "query": {"type": "string", "description": "Search query"},
                        "field": {"type": "string", "description": "Specific field to search"},
                    },
                    "required": ["table_name", "query"],
                }),
            ),
            McpToolDef::new(
                "count_records",
                "Count total records in a table.",
                json!({
                    "type": "object",
                    "properties": {"table_name": table_name},
                    "required": ["table_name"],
                }),
            ),
            McpToolDef::new(
                "get_record",
                "Get a specific record by ID.",
                json!({
                    "type": "object",
                    "properties": {
                        "table_name": table_name,
                        "record_id": {"type": "string", "description": "Record ID"},
                    },
                    "required": ["table_name", "record_id"],
                }),
            ),
        ]
    }

    /// Serve the store as a synthetic backend called `name`.
    pub fn into_backend(self, name: impl Into<String>) -> SyntheticTransport {
        let handlers: [fn(&mut Value, &Value) -> Result<String>; 4] =
            [list_records, search_records, count_records, get_record];
        Self::tool_defs().into_iter().zip(handlers).fold(
            SyntheticTransport::new(name).with_data(Value::Object(self.tables)),
            |backend, (tool, handler)| backend.with_tool(tool, handler),
        )
    }

    /// A small candidates table used by the demo.
    pub fn sample() -> Self {
        let mut store = Self::new();
        store.add_table("Candidates", vec![
            json!({"Name": "Alice Johnson", "Email": "alice@example.com", "Status": "Active", "Role": "Senior Engineer", "Experience_Years": 5}),
            json!({"Name": "Bob Smith", "Email": "bob@example.com", "Status": "Interviewing", "Role": "Product Designer", "Experience_Years": 3}),
            json!({"Name": "Carol Williams", "Email": "carol@example.com", "Status": "Active", "Role": "Product Manager", "Experience_Years": 7}),
            json!({"Name": "David Brown", "Email": "david@example.com", "Status": "Rejected", "Role": "Junior Engineer", "Experience_Years": 1}),
            json!({"Name": "Eve Davis", "Email": "eve@example.com", "Status": "Active", "Role": "Data Scientist", "Experience_Years": 4}),
            json!({"Name": "Frank Miller", "Email": "frank@example.com", "Status": "Offer Extended", "Role": "Senior Engineer", "Experience_Years": 8}),
        ]);
        store
    }
}

fn table<'a>(data: &'a Value, args: &Value) -> std::result::Result<&'a Vec<Value>, String> {
    let name = args["table_name"].as_str().unwrap_or_default();
    data.get(name)
        .and_then(Value::as_array)
        .ok_or_else(|| json!({"error": format!("Table '{name}' not found")}).to_string())
}

/// Lowercased text of a field, with strings unquoted.
fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_lowercase(),
        other => other.to_string().to_lowercase(),
    }
}

fn list_records(data: &mut Value, args: &Value) -> Result<String> {
    let records = match table(data, args) {
        Ok(records) => records,
        Err(missing) => return Ok(missing),
    };
    let limit = args["max_records"]
        .as_u64()
        .filter(|n| *n > 0)
        .map_or(records.len(), |n| n as usize);
    let shown: Vec<&Value> = records.iter().take(limit).collect();
    Ok(json!({"records": shown, "total": records.len()}).to_string())
}

fn search_records(data: &mut Value, args: &Value) -> Result<String> {
    let records = match table(data, args) {
        Ok(records) => records,
        Err(missing) => return Ok(missing),
    };
    let query = args["query"].as_str().unwrap_or_default().to_lowercase();
    let field = args["field"].as_str();
    let matches: Vec<&Value> = records
        .iter()
        .filter(|record| match field {
            Some(field) => record
                .get(field)
                .map(field_text)
                .unwrap_or_default()
                .contains(&query),
            None => record
                .as_object()
                .is_some_and(|obj| obj.values().any(|v| field_text(v).contains(&query))),
        })
        .collect();
    Ok(json!({"records": matches, "count": matches.len()}).to_string())
}

fn count_records(data: &mut Value, args: &Value) -> Result<String> {
    Ok(match table(data, args) {
        Ok(records) => json!({"count": records.len()}).to_string(),
        Err(missing) => missing,
    })
}

fn get_record(data: &mut Value, args: &Value) -> Result<String> {
    let records = match table(data, args) {
        Ok(records) => records,
        Err(missing) => return Ok(missing),
    };
    let record_id = args["record_id"].as_str().unwrap_or_default();
    Ok(
        match records.iter().find(|r| r["id"].as_str() == Some(record_id)) {
            Some(record) => json!({"record": record}).to_string(),
            None => json!({"error": format!("Record '{record_id}' not found")}).to_string(),
        },
    )
}
