//! JSON payloads exchanged with resource scripts over stdio

use crate::resource::{MetadataField, Params, Source, Version};
use serde::{Deserialize, Serialize};

/// Request for `check`
#[derive(Debug, Clone, Serialize)]
pub struct CheckRequest<'a> {
    pub source: &'a Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<&'a Version>,
}

/// Request for `get`
#[derive(Debug, Clone, Serialize)]
pub struct GetRequest<'a> {
    pub source: &'a Source,
    pub params: &'a Params,
    pub version: &'a Version,
}

/// Request for `put`
#[derive(Debug, Clone, Serialize)]
pub struct PutRequest<'a> {
    pub source: &'a Source,
    pub params: &'a Params,
}

/// Response of `get` and `put`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionResult {
    pub version: Version,
    #[serde(default)]
    pub metadata: Vec<MetadataField>,
}
