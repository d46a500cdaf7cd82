use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

// RFC 3986 unreserved characters stay as-is, everything else is percent-encoded.
const URI_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .finish()
    }
}

/// The parts of an HTTP request that go into the signature.
#[derive(Debug, Clone, Copy)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    /// `host` or `host:port`, exactly as sent in the `Host` header.
    pub host: &'a str,
    /// Path as sent on the wire, segments already URI-encoded once.
    pub path: &'a str,
    pub query: &'a [(String, String)],
    pub body: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    pub credentials: &'a Credentials,
    pub region: &'a str,
    pub service: &'a str,
    pub time: DateTime<Utc>,
}

pub fn uri_encode(s: &str) -> String {
    utf8_percent_encode(s, URI_ENCODE).to_string()
}

/// Sorted, encoded query string. The same string must be used on the wire.
pub fn canonical_query(query: &[(String, String)]) -> String {
    let mut pairs = query
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

// Non-S3 services sign the path encoded a second time.
fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

/// Returns the headers to add to the request: `x-amz-date`, the session token if any,
/// and `authorization`.
pub fn sign(req: &SignableRequest<'_>, params: &SigningParams<'_>) -> Vec<(&'static str, String)> {
    let amz_date = params.time.format("%Y%m%dT%H%M%SZ").to_string();
    let date = params.time.format("%Y%m%d").to_string();

    let mut headers = vec![("host", req.host.to_string()), ("x-amz-date", amz_date.clone())];
    if let Some(token) = &params.credentials.session_token {
        headers.push(("x-amz-security-token", token.clone()));
    }

    let canonical_headers = headers
        .iter()
        .map(|(name, value)| format!("{name}:{}\n", value.trim()))
        .collect::<String>();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        req.method,
        canonical_uri(req.path),
        canonical_query(req.query),
        canonical_headers,
        signed_headers,
        sha256_hex(req.body),
    );
    tracing::trace!(%canonical_request, "sigv4 canonical request");

    let scope = format!("{date}/{}/{}/aws4_request", params.region, params.service);
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(
        &params.credentials.secret_access_key,
        &date,
        params.region,
        params.service,
    );
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes()));

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        params.credentials.access_key_id
    );

    // `host` is set by the HTTP client itself.
    let mut out = headers
        .into_iter()
        .filter(|(name, _)| *name != "host")
        .collect::<Vec<_>>();
    out.push(("authorization", authorization));
    out
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    fn example_credentials(session_token: Option<&str>) -> Credentials {
        Credentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: SECRET.to_string(),
            session_token: session_token.map(str::to_string),
        }
    }

    #[test]
    fn derives_documented_signing_key() {
        let key = signing_key(SECRET, "20120215", "us-east-1", "iam");
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn signs_get_vanilla_vector() {
        let credentials = example_credentials(None);
        let headers = sign(
            &SignableRequest {
                method: "GET",
                host: "example.amazonaws.com",
                path: "/",
                query: &[],
                body: b"",
            },
            &SigningParams {
                credentials: &credentials,
                region: "us-east-1",
                service: "service",
                time: Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap(),
            },
        );

        assert_eq!(headers[0], ("x-amz-date", "20150830T123600Z".to_string()));
        assert_eq!(
            headers[1],
            (
                "authorization",
                "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
                 SignedHeaders=host;x-amz-date, \
                 Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
                    .to_string()
            )
        );
    }

    #[test]
    fn session_token_is_signed_and_sent() {
        let credentials = example_credentials(Some("token123"));
        let headers = sign(
            &SignableRequest {
                method: "POST",
                host: "appsync.eu-west-1.amazonaws.com",
                path: "/v1/apis/abc/types/Query/resolvers",
                query: &[],
                body: br#"{"kind":"UNIT"}"#,
            },
            &SigningParams {
                credentials: &credentials,
                region: "eu-west-1",
                service: "appsync",
                time: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            },
        );

        let names = headers.iter().map(|(n, _)| *n).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["x-amz-date", "x-amz-security-token", "authorization"]
        );
        let auth = &headers[2].1;
        assert!(auth.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240102/eu-west-1/appsync/aws4_request, "
        ));
        assert!(auth.contains("SignedHeaders=host;x-amz-date;x-amz-security-token, "));
    }

    #[test]
    fn canonical_query_sorts_and_encodes() {
        let q = vec![
            ("nextToken".to_string(), "a+b/c=".to_string()),
            ("maxResults".to_string(), "25".to_string()),
        ];
        assert_eq!(canonical_query(&q), "maxResults=25&nextToken=a%2Bb%2Fc%3D");
        assert_eq!(canonical_query(&[]), "");
    }

    #[test]
    fn canonical_uri_double_encodes_segments() {
        assert_eq!(canonical_uri(""), "/");
        assert_eq!(canonical_uri("/v1/apis/x"), "/v1/apis/x");
        assert_eq!(canonical_uri("/a%20b"), "/a%2520b");
    }

    #[test]
    fn debug_redacts_secrets() {
        let s = format!("{:?}", example_credentials(Some("tok")));
        assert!(!s.contains(SECRET));
        assert!(!s.contains("tok\""));
        assert!(s.contains("AKIDEXAMPLE"));
    }
}
