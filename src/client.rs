//! HTTP client for the remote analysis service.
//!
//! One multipart `POST` per submission: the first selected file plus the chosen options
//! as a JSON array. Failures are mapped into [`SubmitError`] so callers never see
//! transport-specific types.

use crate::model::{AnalysisRequest, AnalysisResponse, WorkflowConfig};
use anyhow::Context;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::future::Future;
use thiserror::Error;

/// Multipart field carrying the first selected file.
pub const FILE_FIELD: &str = "zipFile";
/// Multipart field carrying the JSON-encoded option tokens.
pub const OPTIONS_FIELD: &str = "eips";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// No response reached us.
    #[error("could not reach the analysis service: {0}")]
    Network(String),
    /// The service answered but rejected or failed the request, or sent a body we
    /// could not parse.
    #[error("{0}")]
    Service(String),
}

/// A remote service that accepts one analysis request and answers it.
pub trait AnalysisService: Send + Sync {
    fn submit(
        &self,
        request: AnalysisRequest,
    ) -> impl Future<Output = Result<AnalysisResponse, SubmitError>> + Send;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpAnalysisClient {
    http: reqwest::Client,
    endpoint: reqwest::Url,
}

impl HttpAnalysisClient {
    pub fn new(cfg: &WorkflowConfig) -> anyhow::Result<Self> {
        let endpoint = reqwest::Url::parse(&cfg.endpoint)
            .with_context(|| format!("invalid analysis endpoint: {}", cfg.endpoint))?;
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .build()
            .context("build HTTP client")?;
        Ok(Self { http, endpoint })
    }

    fn build_form(request: &AnalysisRequest) -> Result<Form, SubmitError> {
        let file = request
            .primary_file()
            .ok_or_else(|| SubmitError::Service("no file selected".into()))?;
        let options = request
            .options
            .to_json()
            .map_err(|e| SubmitError::Service(format!("could not encode options: {e}")))?;

        let mime = if file.name().to_ascii_lowercase().ends_with(".zip") {
            "application/zip"
        } else {
            "application/octet-stream"
        };
        let part = Part::stream_with_length(
            reqwest::Body::from(file.contents().clone()),
            file.len() as u64,
        )
        .file_name(file.name().to_string())
        .mime_str(mime)
        .map_err(|e| SubmitError::Service(format!("could not encode {}: {e}", file.name())))?;

        Ok(Form::new().part(FILE_FIELD, part).text(OPTIONS_FIELD, options))
    }
}

impl AnalysisService for HttpAnalysisClient {
    async fn submit(&self, request: AnalysisRequest) -> Result<AnalysisResponse, SubmitError> {
        let form = Self::build_form(&request)?;
        tracing::debug!(endpoint = %self.endpoint, "submitting analysis request");

        let resp = self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| SubmitError::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| SubmitError::Network(e.to_string()))?;
        tracing::debug!(%status, bytes = body.len(), "analysis service responded");

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| format!("analysis failed ({status})"));
            return Err(SubmitError::Service(message));
        }

        decode_success(&body)
    }
}

/// Decode a 2xx body. A body without `data` is malformed, even if it parses as JSON.
pub(crate) fn decode_success(body: &[u8]) -> Result<AnalysisResponse, SubmitError> {
    serde_json::from_slice::<AnalysisResponse>(body).map_err(|e| {
        SubmitError::Service(format!("malformed response from analysis service: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalysisOption, FileHandle, FileSet, OptionSet};
    use std::path::PathBuf;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn cfg(endpoint: &str) -> WorkflowConfig {
        WorkflowConfig {
            endpoint: endpoint.to_string(),
            user_agent: "papers-please/test".into(),
            data_dir: PathBuf::from("."),
            cache_key: "formattedData".into(),
        }
    }

    fn request(names: &[&str], options: &[AnalysisOption]) -> AnalysisRequest {
        let mut files = FileSet::default();
        files.select(
            names
                .iter()
                .map(|n| FileHandle::new(*n, format!("contents of {n}").into_bytes()))
                .collect(),
        );
        let mut opts = OptionSet::default();
        for o in options {
            opts.toggle(*o);
        }
        AnalysisRequest {
            files,
            options: opts,
        }
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    async fn read_request(sock: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = find(&buf, b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok());
            match len {
                Some(len) if buf.len() >= end + 4 + len => break,
                Some(_) => {}
                None if buf.ends_with(b"0\r\n\r\n") || buf.ends_with(b"--\r\n") => break,
                None => {}
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Accept one connection, record the raw request, answer with a canned reply.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let raw = read_request(&mut sock).await;
            let reply = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(reply.as_bytes()).await.unwrap();
            let _ = sock.shutdown().await;
            raw
        });
        (format!("http://{addr}/analyze"), handle)
    }

    #[tokio::test]
    async fn sends_first_file_and_options_as_multipart() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"message":"Analysis completed successfully!","progress":100,"data":{"TokenA":{"compliance":{"ERC721":true},"oz_modules":["Ownable","ERC721"]}}}"#,
        )
        .await;
        let client = HttpAnalysisClient::new(&cfg(&url)).unwrap();

        let resp = client
            .submit(request(
                &["token.zip", "second.zip"],
                &[AnalysisOption::Erc721],
            ))
            .await
            .unwrap();
        let raw = server.await.unwrap();

        assert!(raw.starts_with("POST /analyze"));
        assert!(raw.contains(r#"name="zipFile"; filename="token.zip""#));
        assert!(raw.contains("contents of token.zip"));
        assert!(raw.contains(r#"name="eips""#));
        assert!(raw.contains(r#"["ERC721"]"#));
        assert!(!raw.contains("second.zip"));

        assert_eq!(resp.message.as_deref(), Some("Analysis completed successfully!"));
        assert_eq!(resp.data.len(), 1);
    }

    #[tokio::test]
    async fn rejected_request_uses_service_error_message() {
        let (url, server) = serve_once("400 Bad Request", r#"{"error":"invalid archive"}"#).await;
        let client = HttpAnalysisClient::new(&cfg(&url)).unwrap();

        let err = client
            .submit(request(&["token.sol"], &[]))
            .await
            .unwrap_err();
        server.await.unwrap();

        assert_eq!(err, SubmitError::Service("invalid archive".into()));
        assert_eq!(err.to_string(), "invalid archive");
    }

    #[tokio::test]
    async fn failure_without_error_field_gets_generic_message() {
        let (url, server) = serve_once("500 Internal Server Error", "<html>oops</html>").await;
        let client = HttpAnalysisClient::new(&cfg(&url)).unwrap();

        let err = client
            .submit(request(&["token.zip"], &[]))
            .await
            .unwrap_err();
        server.await.unwrap();

        match err {
            SubmitError::Service(msg) => assert!(msg.contains("500"), "{msg}"),
            other => panic!("expected service error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_service_error() {
        let (url, server) = serve_once("200 OK", "{not json").await;
        let client = HttpAnalysisClient::new(&cfg(&url)).unwrap();

        let err = client
            .submit(request(&["token.zip"], &[]))
            .await
            .unwrap_err();
        server.await.unwrap();

        match err {
            SubmitError::Service(msg) => assert!(msg.starts_with("malformed response")),
            other => panic!("expected service error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_status_without_data_is_a_service_error() {
        let (url, server) = serve_once("200 OK", r#"{"error":"backend exploded"}"#).await;
        let client = HttpAnalysisClient::new(&cfg(&url)).unwrap();

        let err = client
            .submit(request(&["token.zip"], &[]))
            .await
            .unwrap_err();
        server.await.unwrap();

        match err {
            SubmitError::Service(msg) => {
                assert!(msg.starts_with("malformed response"), "{msg}");
                assert!(msg.contains("data"), "{msg}");
            }
            other => panic!("expected service error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_service_is_a_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpAnalysisClient::new(&cfg(&format!("http://{addr}/analyze"))).unwrap();
        let err = client
            .submit(request(&["token.zip"], &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Network(_)));
    }

    #[test]
    fn rejects_invalid_endpoint() {
        assert!(HttpAnalysisClient::new(&cfg("not a url")).is_err());
    }
}
