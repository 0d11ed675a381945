use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};

/// Stored document; `result` holds base64 of nonce and ciphertext.
#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: i64,
    pub patient_id: i64,
    pub category_id: i64,
    pub doctor_id: i64,
    pub result: String,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

/// Document with its result decrypted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DocumentView {
    pub id: i64,
    pub patient_id: i64,
    pub category_id: i64,
    pub doctor_id: i64,
    pub result: BTreeMap<String, String>,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a document. The author is the calling user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateDocumentInput {
    pub patient_id: i64,
    pub category_id: i64,
    #[schema(value_type = Object)]
    pub result: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateDocumentResponse {
    pub message: String,
    pub document_id: i64,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, IntoParams)]
pub struct DocumentQuery {
    pub patient_id: i64,
    pub category_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyDocumentResponse {
    pub verified: bool,
    pub message: String,
}
