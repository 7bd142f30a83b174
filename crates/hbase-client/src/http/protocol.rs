//! HBase Avro gateway protocol
//!
//! The protocol text is sent verbatim in every handshake. Locally each
//! message gets three standalone schemas (request record, response, error
//! union) with the protocol's named types inlined, so the binary codec never
//! has to resolve cross-schema references.

use crate::error::{HBaseError, Result};
use apache_avro::Schema;
use md5::{Digest, Md5};
use serde_json::{json, Value as Json};
use std::collections::{HashMap, HashSet};

/// Types and messages of the `HBase` Avro protocol used by this client
pub const HBASE_PROTOCOL: &str = r#"{
  "protocol": "HBase",
  "namespace": "org.apache.hadoop.hbase.avro.generated",
  "types": [
    {"type": "enum", "name": "ACompressionAlgorithm", "symbols": ["LZO", "GZ", "NONE"]},
    {"type": "record", "name": "AFamilyDescriptor", "fields": [
      {"name": "name", "type": "bytes"},
      {"name": "compression", "type": ["ACompressionAlgorithm", "null"]},
      {"name": "maxVersions", "type": ["int", "null"]},
      {"name": "blocksize", "type": ["int", "null"]},
      {"name": "inMemory", "type": ["boolean", "null"]},
      {"name": "timeToLive", "type": ["int", "null"]},
      {"name": "blockCacheEnabled", "type": ["boolean", "null"]}
    ]},
    {"type": "record", "name": "ATableDescriptor", "fields": [
      {"name": "name", "type": "bytes"},
      {"name": "families", "type": [{"type": "array", "items": "AFamilyDescriptor"}, "null"]},
      {"name": "maxFileSize", "type": ["long", "null"]},
      {"name": "memStoreFlushSize", "type": ["long", "null"]},
      {"name": "rootRegion", "type": ["boolean", "null"]},
      {"name": "metaRegion", "type": ["boolean", "null"]},
      {"name": "metaTable", "type": ["boolean", "null"]},
      {"name": "readOnly", "type": ["boolean", "null"]},
      {"name": "deferredLogFlush", "type": ["boolean", "null"]}
    ]},
    {"type": "record", "name": "AColumn", "fields": [
      {"name": "family", "type": "bytes"},
      {"name": "qualifier", "type": ["bytes", "null"]}
    ]},
    {"type": "record", "name": "ATimeRange", "fields": [
      {"name": "minStamp", "type": "long"},
      {"name": "maxStamp", "type": "long"}
    ]},
    {"type": "record", "name": "AGet", "fields": [
      {"name": "row", "type": "bytes"},
      {"name": "columns", "type": [{"type": "array", "items": "AColumn"}, "null"]},
      {"name": "timestamp", "type": ["long", "null"]},
      {"name": "timerange", "type": ["ATimeRange", "null"]},
      {"name": "maxVersions", "type": ["int", "null"]}
    ]},
    {"type": "record", "name": "AResultEntry", "fields": [
      {"name": "family", "type": "bytes"},
      {"name": "qualifier", "type": "bytes"},
      {"name": "value", "type": "bytes"},
      {"name": "timestamp", "type": "long"}
    ]},
    {"type": "record", "name": "AResult", "fields": [
      {"name": "row", "type": "bytes"},
      {"name": "entries", "type": {"type": "array", "items": "AResultEntry"}}
    ]},
    {"type": "record", "name": "AColumnValue", "fields": [
      {"name": "family", "type": "bytes"},
      {"name": "qualifier", "type": "bytes"},
      {"name": "value", "type": "bytes"},
      {"name": "timestamp", "type": ["long", "null"]}
    ]},
    {"type": "record", "name": "APut", "fields": [
      {"name": "row", "type": "bytes"},
      {"name": "columnValues", "type": {"type": "array", "items": "AColumnValue"}}
    ]},
    {"type": "record", "name": "ADelete", "fields": [
      {"name": "row", "type": "bytes"},
      {"name": "columns", "type": [{"type": "array", "items": "AColumn"}, "null"]}
    ]},
    {"type": "record", "name": "AScan", "fields": [
      {"name": "startRow", "type": ["bytes", "null"]},
      {"name": "stopRow", "type": ["bytes", "null"]},
      {"name": "columns", "type": [{"type": "array", "items": "AColumn"}, "null"]},
      {"name": "timestamp", "type": ["long", "null"]},
      {"name": "timerange", "type": ["ATimeRange", "null"]},
      {"name": "maxVersions", "type": ["int", "null"]}
    ]},
    {"type": "error", "name": "AIOError", "fields": [{"name": "message", "type": "string"}]},
    {"type": "error", "name": "AIllegalArgument", "fields": [{"name": "message", "type": "string"}]},
    {"type": "error", "name": "ATableExists", "fields": [{"name": "message", "type": "string"}]},
    {"type": "error", "name": "AMasterNotRunning", "fields": [{"name": "message", "type": "string"}]}
  ],
  "messages": {
    "listTables": {
      "request": [],
      "response": {"type": "array", "items": "ATableDescriptor"},
      "errors": ["AIOError"]
    },
    "describeTable": {
      "request": [{"name": "table", "type": "bytes"}],
      "response": "ATableDescriptor",
      "errors": ["AIOError"]
    },
    "isTableEnabled": {
      "request": [{"name": "table", "type": "bytes"}],
      "response": "boolean",
      "errors": ["AIOError"]
    },
    "describeFamily": {
      "request": [{"name": "table", "type": "bytes"}, {"name": "family", "type": "bytes"}],
      "response": "AFamilyDescriptor",
      "errors": ["AIOError"]
    },
    "createTable": {
      "request": [{"name": "table", "type": "ATableDescriptor"}],
      "response": "null",
      "errors": ["AIOError", "AIllegalArgument", "ATableExists", "AMasterNotRunning"]
    },
    "deleteTable": {
      "request": [{"name": "table", "type": "bytes"}],
      "response": "null",
      "errors": ["AIOError"]
    },
    "enableTable": {
      "request": [{"name": "table", "type": "bytes"}],
      "response": "null",
      "errors": ["AIOError"]
    },
    "disableTable": {
      "request": [{"name": "table", "type": "bytes"}],
      "response": "null",
      "errors": ["AIOError"]
    },
    "get": {
      "request": [{"name": "table", "type": "bytes"}, {"name": "get", "type": "AGet"}],
      "response": "AResult",
      "errors": ["AIOError"]
    },
    "put": {
      "request": [{"name": "table", "type": "bytes"}, {"name": "put", "type": "APut"}],
      "response": "null",
      "errors": ["AIOError"]
    },
    "delete": {
      "request": [{"name": "table", "type": "bytes"}, {"name": "delete", "type": "ADelete"}],
      "response": "null",
      "errors": ["AIOError"]
    },
    "scannerOpen": {
      "request": [{"name": "table", "type": "bytes"}, {"name": "scan", "type": "AScan"}],
      "response": "int",
      "errors": ["AIOError"]
    },
    "scannerClose": {
      "request": [{"name": "scannerId", "type": "int"}],
      "response": "null",
      "errors": ["AIOError", "AIllegalArgument"]
    },
    "scannerGetRows": {
      "request": [{"name": "scannerId", "type": "int"}, {"name": "numberOfRows", "type": "int"}],
      "response": {"type": "array", "items": "AResult"},
      "errors": ["AIOError", "AIllegalArgument"]
    }
  }
}"#;

/// Local schemas of one protocol message
#[derive(Debug)]
pub struct Message {
    pub request: Schema,
    pub response: Schema,
    /// Union of the system error string and the declared errors
    pub errors: Schema,
    /// Error type name per branch of `errors`; branch 0 is `"string"`
    pub error_names: Vec<String>,
}

/// Parsed protocol plus its MD5 handshake hash
#[derive(Debug)]
pub struct GatewayProtocol {
    text: String,
    hash: [u8; 16],
    messages: HashMap<String, Message>,
}

impl GatewayProtocol {
    pub fn hbase() -> Result<Self> {
        Self::parse(HBASE_PROTOCOL)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let doc: Json = serde_json::from_str(text)
            .map_err(|e| HBaseError::Avro(format!("protocol is not valid JSON: {}", e)))?;

        let mut types = HashMap::new();
        for ty in doc.get("types").and_then(Json::as_array).into_iter().flatten() {
            if let Some(name) = ty.get("name").and_then(Json::as_str) {
                types.insert(name.to_string(), ty.clone());
            }
        }

        let defs = doc
            .get("messages")
            .and_then(Json::as_object)
            .ok_or_else(|| HBaseError::Avro("protocol declares no messages".to_string()))?;
        let mut messages = HashMap::with_capacity(defs.len());
        for (name, def) in defs {
            messages.insert(name.clone(), Message::parse(name, def, &types)?);
        }

        Ok(Self {
            text: text.to_string(),
            hash: Md5::digest(text.as_bytes()).into(),
            messages,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn hash(&self) -> [u8; 16] {
        self.hash
    }

    pub fn message(&self, name: &str) -> Result<&Message> {
        self.messages
            .get(name)
            .ok_or_else(|| HBaseError::Avro(format!("protocol has no message '{}'", name)))
    }
}

impl Message {
    fn parse(name: &str, def: &Json, types: &HashMap<String, Json>) -> Result<Self> {
        let mut seen = HashSet::new();
        let fields: Vec<Json> = def
            .get("request")
            .and_then(Json::as_array)
            .into_iter()
            .flatten()
            .map(|param| inline_field(param, types, &mut seen))
            .collect();
        let request = json!({
            "type": "record",
            "name": format!("{}Request", name),
            "fields": fields,
        });

        let response = def.get("response").cloned().unwrap_or_else(|| json!("null"));
        let response = inline(&response, types, &mut HashSet::new());

        let mut seen = HashSet::new();
        let mut error_names = vec!["string".to_string()];
        let mut branches = vec![json!("string")];
        for error in def.get("errors").and_then(Json::as_array).into_iter().flatten() {
            error_names.push(error.as_str().unwrap_or_default().to_string());
            branches.push(inline(error, types, &mut seen));
        }

        Ok(Self {
            request: Schema::parse(&request)?,
            response: Schema::parse(&response)?,
            errors: Schema::parse(&Json::Array(branches))?,
            error_names,
        })
    }
}

fn inline_field(field: &Json, types: &HashMap<String, Json>, seen: &mut HashSet<String>) -> Json {
    let mut field = field.clone();
    if let Some(ty) = field.get("type").cloned() {
        field["type"] = inline(&ty, types, seen);
    }
    field
}

/// Replace the first reference to each named type with its definition.
///
/// Later references stay by name, which a standalone schema resolves
/// against the earlier definition. Protocol `error` types become records.
fn inline(ty: &Json, types: &HashMap<String, Json>, seen: &mut HashSet<String>) -> Json {
    match ty {
        Json::String(name) => match types.get(name) {
            Some(def) if seen.insert(name.clone()) => inline(def, types, seen),
            _ => ty.clone(),
        },
        Json::Array(branches) => Json::Array(branches.iter().map(|b| inline(b, types, seen)).collect()),
        Json::Object(obj) => {
            let mut out = obj.clone();
            match obj.get("type").and_then(Json::as_str) {
                Some("record") | Some("error") => {
                    out.insert("type".to_string(), json!("record"));
                    if let Some(fields) = obj.get("fields").and_then(Json::as_array) {
                        let fields = fields.iter().map(|f| inline_field(f, types, seen)).collect();
                        out.insert("fields".to_string(), Json::Array(fields));
                    }
                }
                Some("array") => {
                    if let Some(items) = obj.get("items") {
                        out.insert("items".to_string(), inline(items, types, seen));
                    }
                }
                Some("map") => {
                    if let Some(values) = obj.get("values") {
                        out.insert("values".to_string(), inline(values, types, seen));
                    }
                }
                _ => {}
            }
            Json::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hbase_protocol_parses() {
        let protocol = GatewayProtocol::hbase().unwrap();
        for name in [
            "listTables",
            "describeTable",
            "describeFamily",
            "isTableEnabled",
            "createTable",
            "enableTable",
            "disableTable",
            "deleteTable",
            "get",
            "put",
            "delete",
            "scannerOpen",
            "scannerGetRows",
            "scannerClose",
        ] {
            assert!(protocol.message(name).is_ok(), "missing message {}", name);
        }
        assert!(protocol.message("compact").is_err());
    }

    #[test]
    fn test_hash_is_md5_of_text() {
        let protocol = GatewayProtocol::hbase().unwrap();
        let expected: [u8; 16] = Md5::digest(HBASE_PROTOCOL.as_bytes()).into();
        assert_eq!(protocol.hash(), expected);
        assert_eq!(protocol.text(), HBASE_PROTOCOL);
    }

    #[test]
    fn test_error_union_starts_with_string() {
        let protocol = GatewayProtocol::hbase().unwrap();
        let create = protocol.message("createTable").unwrap();
        assert_eq!(
            create.error_names,
            vec!["string", "AIOError", "AIllegalArgument", "ATableExists", "AMasterNotRunning"]
        );
    }

    #[test]
    fn test_named_types_inlined_once() {
        let types: HashMap<String, Json> = [(
            "AColumn".to_string(),
            json!({"type": "record", "name": "AColumn", "fields": [{"name": "family", "type": "bytes"}]}),
        )]
        .into_iter()
        .collect();
        let mut seen = HashSet::new();
        let inlined = inline(&json!(["AColumn", "AColumn", "null"]), &types, &mut seen);
        assert_eq!(inlined[0]["type"], "record");
        assert_eq!(inlined[1], "AColumn");
        assert_eq!(inlined[2], "null");
    }

    #[test]
    fn test_errors_become_records() {
        let protocol = GatewayProtocol::parse(
            r#"{"protocol": "P", "types": [{"type": "error", "name": "Boom", "fields": [{"name": "message", "type": "string"}]}],
                "messages": {"ping": {"request": [], "response": "null", "errors": ["Boom"]}}}"#,
        )
        .unwrap();
        assert_eq!(protocol.message("ping").unwrap().error_names, vec!["string", "Boom"]);
    }
}
