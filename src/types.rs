use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// NOTE: AppSync IDs are opaque strings. A marker type per ID kind keeps an API id from being
// passed where a function id is expected.
pub struct OwnedId<T> {
    raw: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> OwnedId<T> {
    pub fn new(raw: String) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl<T> Clone for OwnedId<T> {
    fn clone(&self) -> Self {
        Self::new(self.raw.clone())
    }
}

impl<T> fmt::Debug for OwnedId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Id").field(&self.raw).finish()
    }
}

impl<T> PartialEq for OwnedId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl<T> Eq for OwnedId<T> {}

impl<T> From<&str> for OwnedId<T> {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl<T> Serialize for OwnedId<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de, T> Deserialize<'de> for OwnedId<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}

pub enum ApiMarker {}
pub enum FunctionMarker {}

pub type ApiId = OwnedId<ApiMarker>;
pub type FunctionId = OwnedId<FunctionMarker>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolverKind {
    Unit,
    Pipeline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    pub functions: Vec<FunctionId>,
}

/// The parts of an existing resolver that get logged before it is replaced.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolver {
    pub kind: Option<ResolverKind>,
    pub resolver_arn: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionConfiguration {
    pub function_id: FunctionId,
    pub name: Option<String>,
    pub data_source_name: Option<String>,
}

/// Body of a create-resolver / update-resolver call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverInput {
    /// Only sent on create; update carries the field name in the path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    pub kind: ResolverKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_config: Option<PipelineConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_mapping_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mapping_template: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_kind_uses_wire_names() {
        assert_eq!(
            serde_json::to_value(ResolverKind::Pipeline).unwrap(),
            serde_json::json!("PIPELINE")
        );
    }

    #[test]
    fn resolver_reads_kind_and_ignores_the_rest() {
        let r: Resolver = serde_json::from_value(serde_json::json!({
            "typeName": "Query",
            "fieldName": "getPost",
            "kind": "UNIT",
            "cachingConfig": { "ttl": 60 }
        }))
        .unwrap();
        assert_eq!(r.kind, Some(ResolverKind::Unit));
        assert!(r.resolver_arn.is_none());
    }

    #[test]
    fn resolver_input_omits_absent_fields() {
        let input = ResolverInput {
            field_name: None,
            kind: ResolverKind::Unit,
            data_source_name: Some("PostsTable".to_string()),
            pipeline_config: None,
            request_mapping_template: None,
            response_mapping_template: None,
        };
        assert_eq!(
            serde_json::to_value(&input).unwrap(),
            serde_json::json!({ "kind": "UNIT", "dataSourceName": "PostsTable" })
        );
    }
}
