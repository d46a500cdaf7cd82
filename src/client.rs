use std::fmt;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};

use crate::sigv4::{self, Credentials, SignableRequest, SigningParams};
use crate::types::{ApiId, FunctionConfiguration, Resolver, ResolverInput};

const SERVICE: &str = "appsync";

pub fn default_endpoint(region: &str) -> String {
    format!("https://appsync.{region}.amazonaws.com")
}

/// `host` or `host:port`, as the HTTP client will send it.
pub(crate) fn host_header(url: &reqwest::Url) -> anyhow::Result<String> {
    match (url.host_str(), url.port()) {
        (Some(h), Some(p)) => Ok(format!("{h}:{p}")),
        (Some(h), None) => Ok(h.to_string()),
        (None, _) => anyhow::bail!("url {url} has no host"),
    }
}

#[derive(Debug, Clone)]
pub enum ClientMode {
    Http {
        endpoint: String,
        region: String,
        credentials: Credentials,
    },
    Fixtures(PathBuf),
}

#[derive(Debug, Clone)]
pub struct AppSyncClient {
    mode: ClientMode,
}

/// An error reported by the AppSync service itself (as opposed to transport or I/O).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub error_type: String,
    pub status: Option<u16>,
    pub message: String,
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        self.error_type == "NotFoundException"
    }

    pub(crate) fn from_response(status: Option<u16>, header: Option<&str>, body: &Value) -> Self {
        let from_body = body
            .get("__type")
            .or_else(|| body.get("errorType"))
            .and_then(|v| v.as_str());
        let error_type = header
            .or(from_body)
            .map(|t| {
                // `NotFoundException:http://...` or `com.amazon...#NotFoundException`
                let t = t.split(':').next().unwrap_or(t);
                t.rsplit('#').next().unwrap_or(t).to_string()
            })
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "UnknownError".to_string());
        let message = body
            .get("message")
            .or_else(|| body.get("Message"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        Self {
            error_type,
            status,
            message,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error_type)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {status})")?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ServiceError {}

#[derive(Debug)]
pub struct FunctionsPage {
    pub functions: Vec<FunctionConfiguration>,
    pub next_token: Option<String>,
}

struct Operation<'a> {
    name: &'static str,
    method: Method,
    path: Vec<&'a str>,
    query: Vec<(String, String)>,
    body: Option<Value>,
    fixture: String,
}

impl AppSyncClient {
    pub fn new(mode: ClientMode) -> Self {
        Self { mode }
    }

    /// `Ok(None)` when AppSync answers `NotFoundException`.
    pub fn get_resolver(
        &self,
        api_id: &ApiId,
        type_name: &str,
        field_name: &str,
    ) -> anyhow::Result<Option<Resolver>> {
        let result = self.call(Operation {
            name: "GetResolver",
            method: Method::GET,
            path: vec![
                "v1",
                "apis",
                api_id.as_str(),
                "types",
                type_name,
                "resolvers",
                field_name,
            ],
            query: Vec::new(),
            body: None,
            fixture: "GetResolver".to_string(),
        });

        let data = match result {
            Ok(data) => data,
            Err(e)
                if e.downcast_ref::<ServiceError>()
                    .is_some_and(ServiceError::is_not_found) =>
            {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let resolver = data
            .pointer("/resolver")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unexpected GetResolver response shape"))?;
        Ok(Some(serde_json::from_value(resolver)?))
    }

    pub fn create_resolver(
        &self,
        api_id: &ApiId,
        type_name: &str,
        input: &ResolverInput,
    ) -> anyhow::Result<Value> {
        let data = self.call(Operation {
            name: "CreateResolver",
            method: Method::POST,
            path: vec!["v1", "apis", api_id.as_str(), "types", type_name, "resolvers"],
            query: Vec::new(),
            body: Some(serde_json::to_value(input)?),
            fixture: "CreateResolver".to_string(),
        })?;
        if data.pointer("/resolver").is_none() {
            anyhow::bail!("unexpected CreateResolver response shape");
        }
        Ok(data)
    }

    pub fn update_resolver(
        &self,
        api_id: &ApiId,
        type_name: &str,
        field_name: &str,
        input: &ResolverInput,
    ) -> anyhow::Result<Value> {
        let data = self.call(Operation {
            name: "UpdateResolver",
            method: Method::POST,
            path: vec![
                "v1",
                "apis",
                api_id.as_str(),
                "types",
                type_name,
                "resolvers",
                field_name,
            ],
            query: Vec::new(),
            body: Some(serde_json::to_value(input)?),
            fixture: "UpdateResolver".to_string(),
        })?;
        if data.pointer("/resolver").is_none() {
            anyhow::bail!("unexpected UpdateResolver response shape");
        }
        Ok(data)
    }

    pub fn list_functions_page(
        &self,
        api_id: &ApiId,
        next_token: Option<&str>,
    ) -> anyhow::Result<FunctionsPage> {
        let mut query = Vec::new();
        let mut fixture = "ListFunctions".to_string();
        if let Some(t) = next_token {
            query.push(("nextToken".to_string(), t.to_string()));
            fixture = format!("ListFunctions-{t}");
        }

        let data = self.call(Operation {
            name: "ListFunctions",
            method: Method::GET,
            path: vec!["v1", "apis", api_id.as_str(), "functions"],
            query,
            body: None,
            fixture,
        })?;

        let items = data
            .pointer("/functions")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow::anyhow!("unexpected ListFunctions response shape"))?;
        let mut functions = Vec::new();
        for item in items {
            let f: FunctionConfiguration = serde_json::from_value(item.clone())?;
            functions.push(f);
        }

        let next_token = data
            .get("nextToken")
            .and_then(|v| v.as_str())
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Ok(FunctionsPage {
            functions,
            next_token,
        })
    }

    fn call(&self, op: Operation<'_>) -> anyhow::Result<Value> {
        let path = format!(
            "/{}",
            op.path
                .iter()
                .map(|s| sigv4::uri_encode(s))
                .collect::<Vec<_>>()
                .join("/")
        );

        match &self.mode {
            ClientMode::Fixtures(dir) => {
                tracing::debug!(operation = op.name, %path, body = ?op.body, "fixture call");
                let file = dir.join(format!("{}.json", op.fixture));
                let s = fs::read_to_string(&file)
                    .with_context(|| format!("failed to read fixture {}", file.display()))?;
                let body: Value = serde_json::from_str(&s)?;
                if body.get("__type").is_some() {
                    return Err(ServiceError::from_response(None, None, &body).into());
                }
                Ok(body)
            }
            ClientMode::Http {
                endpoint,
                region,
                credentials,
            } => {
                let query = sigv4::canonical_query(&op.query);
                let mut url = format!("{}{path}", endpoint.trim_end_matches('/'));
                if !query.is_empty() {
                    url.push('?');
                    url.push_str(&query);
                }
                let url = reqwest::Url::parse(&url)
                    .with_context(|| format!("invalid endpoint url {endpoint:?}"))?;
                let host = host_header(&url)?;

                let body = match &op.body {
                    Some(v) => serde_json::to_vec(v)?,
                    None => Vec::new(),
                };
                let signed = sigv4::sign(
                    &SignableRequest {
                        method: op.method.as_str(),
                        host: &host,
                        path: &path,
                        query: &op.query,
                        body: &body,
                    },
                    &SigningParams {
                        credentials,
                        region,
                        service: SERVICE,
                        time: Utc::now(),
                    },
                );

                let http = reqwest::blocking::Client::new();
                let mut req = http.request(op.method.clone(), url);
                for (name, value) in signed {
                    req = req.header(name, value);
                }
                if op.body.is_some() {
                    req = req.header(CONTENT_TYPE, "application/json").body(body);
                }

                tracing::debug!(operation = op.name, method = %op.method, %path, "appsync request");
                let resp = req.send()?;
                let status = resp.status();
                let error_type = resp
                    .headers()
                    .get("x-amzn-errortype")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let text = resp.text()?;
                tracing::debug!(operation = op.name, %status, "appsync response");

                let body: Value = if text.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&text).unwrap_or_else(|_| json!({ "message": text }))
                };

                if !status.is_success() {
                    return Err(ServiceError::from_response(
                        Some(status.as_u16()),
                        error_type.as_deref(),
                        &body,
                    )
                    .into());
                }
                Ok(body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_prefers_header_type() {
        let e = ServiceError::from_response(
            Some(404),
            Some("NotFoundException:http://internal.amazon.com/coral/com.amazonaws.deepdish/"),
            &json!({ "message": "No resolver found." }),
        );
        assert!(e.is_not_found());
        assert_eq!(
            e.to_string(),
            "NotFoundException (HTTP 404): No resolver found."
        );
    }

    #[test]
    fn service_error_reads_body_type() {
        let e = ServiceError::from_response(
            None,
            None,
            &json!({ "__type": "com.amazonaws.deepdish#BadRequestException", "Message": "bad" }),
        );
        assert_eq!(e.error_type, "BadRequestException");
        assert_eq!(e.to_string(), "BadRequestException: bad");
    }

    #[test]
    fn service_error_defaults_unknown_type() {
        let e = ServiceError::from_response(Some(500), None, &json!({}));
        assert_eq!(e.to_string(), "UnknownError (HTTP 500)");
    }
}
