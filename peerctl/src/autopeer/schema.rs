//! Autopeer wire types and payload validation
//!
//! The request schema is embedded at its published version; payloads
//! that do not validate are never sent.

use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Version of the autopeer API the embedded schema tracks
pub const SCHEMA_VERSION: &str = "1.0";

/// JSON schema for the `add_sessions` payload
const ADD_SESSIONS_SCHEMA: &str = r#"
{
    "type": "array",
    "minItems": 1,
    "items": {
        "type": "object",
        "required": ["local_asn", "local_ip", "peer_asn", "peer_ip", "peer_type", "location", "uuid"],
        "properties": {
            "local_asn": {"type": "integer", "minimum": 1},
            "local_ip": {"type": "string", "minLength": 1},
            "peer_asn": {"type": "integer", "minimum": 1},
            "peer_ip": {"type": "string", "minLength": 1},
            "peer_type": {"type": "string", "enum": ["peer", "transit", "customer", "core", "ixp", "pni"]},
            "md5": {"type": ["string", "null"]},
            "location": {"type": "string", "pattern": "^pdb:ix:[0-9]+$"},
            "status": {"type": "string"},
            "uuid": {"type": "string", "minLength": 1}
        },
        "additionalProperties": false
    }
}
"#;

/// One proposed session in an `add_sessions` payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProposal {
    pub local_asn: u32,
    pub local_ip: String,
    pub peer_asn: u32,
    pub peer_ip: String,
    pub peer_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    /// exchange identifier in `pdb:ix:{id}` form
    pub location: String,
    pub status: String,
    pub uuid: String,
}

/// `add_sessions` response
#[derive(Debug, Clone, Deserialize)]
pub struct AddSessionsResponse {
    pub request_id: String,
}

/// `get_status` response
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStatusReport {
    pub status: String,
    #[serde(default)]
    pub sessions: Vec<Value>,
}

impl SessionStatusReport {
    pub fn is_complete(&self) -> bool {
        self.status == "completed"
    }

    pub fn is_failed(&self) -> bool {
        self.status == "error" || self.status == "rejected"
    }
}

/// Compiled validator for outbound `add_sessions` payloads
pub struct PayloadValidator {
    schema: JSONSchema,
}

impl PayloadValidator {
    pub fn new() -> Result<Self> {
        let raw: Value = serde_json::from_str(ADD_SESSIONS_SCHEMA)
            .map_err(|e| Error::SchemaValidation(format!("embedded schema: {e}")))?;
        let schema = JSONSchema::compile(&raw)
            .map_err(|e| Error::SchemaValidation(format!("embedded schema: {e}")))?;

        Ok(PayloadValidator { schema })
    }

    /// Fail-fast check run before any payload is sent
    pub fn validate(&self, payload: &Value) -> Result<()> {
        if let Err(errors) = self.schema.validate(payload) {
            let detail = errors
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::SchemaValidation(detail));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn proposal() -> Value {
        json!([{
            "local_asn": 63311,
            "local_ip": "206.41.110.18",
            "peer_asn": 20,
            "peer_ip": "206.41.110.48",
            "peer_type": "peer",
            "location": "pdb:ix:239",
            "status": "pending",
            "uuid": "9e1b0d50-0000-0000-0000-000000000001"
        }])
    }

    #[test]
    fn valid_payload_passes() {
        let validator = PayloadValidator::new().unwrap();
        validator.validate(&proposal()).unwrap();
    }

    #[test]
    fn bad_location_format_is_rejected() {
        let validator = PayloadValidator::new().unwrap();
        let mut payload = proposal();
        payload[0]["location"] = json!("ixctl:239");

        let err = validator.validate(&payload).unwrap_err();
        assert!(matches!(err, Error::SchemaValidation(_)));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let validator = PayloadValidator::new().unwrap();
        let mut payload = proposal();
        payload[0].as_object_mut().unwrap().remove("peer_ip");

        let err = validator.validate(&payload).unwrap_err();
        assert!(matches!(err, Error::SchemaValidation(_)));
    }

    #[test]
    fn empty_payload_is_rejected() {
        let validator = PayloadValidator::new().unwrap();
        let err = validator.validate(&json!([])).unwrap_err();
        assert!(matches!(err, Error::SchemaValidation(_)));
    }
}
