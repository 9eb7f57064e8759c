//! Request handling
//!
//! Every request is authenticated first; only then is the method checked
//! and the path handed to the file server.

use std::time::Instant;

use bytes::Bytes;
use futures_util::TryStreamExt;
use gatehouse_core::config::GatehouseConfig;
use gatehouse_static::{FileBody, FileRequest, FileServer, FileServerConfig, ServeError, ServedFile};
use http::header::{
    ACCEPT_ENCODING, ACCEPT_RANGES, ALLOW, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_RANGE,
    CONTENT_TYPE, ETAG, HeaderMap, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
    LOCATION, RANGE, SERVER, VARY, WWW_AUTHENTICATE,
};
use http::request::Parts;
use http::response::Builder;
use http::{Method, Request, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use tokio_util::io::ReaderStream;

use crate::auth::{AuthOutcome, BasicAuth};

/// Response body: in-memory bytes or a file streamed in chunks
pub type ResponseBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Shared, read-only state for all connections
pub struct AppState {
    pub auth: BasicAuth,
    pub files: FileServer,
}

impl AppState {
    pub fn new(auth: BasicAuth, files: FileServer) -> Self {
        Self { auth, files }
    }

    /// Build from a validated configuration
    pub fn from_config(config: &GatehouseConfig) -> Self {
        Self::new(
            BasicAuth::new(config.auth.realm.clone(), config.auth.credential.clone()),
            FileServer::new(FileServerConfig::from_settings(
                config.root.clone(),
                &config.file_server,
            )),
        )
    }
}

/// Handle one request and log it
pub async fn handle_request<B>(state: &AppState, req: Request<B>) -> Response<ResponseBody> {
    let started = Instant::now();
    // The body is never read
    let (parts, _) = req.into_parts();
    let response = dispatch(state, &parts).await;

    tracing::info!(
        "{} {} -> {} ({:?})",
        parts.method,
        parts.uri.path(),
        response.status().as_u16(),
        started.elapsed()
    );

    response
}

async fn dispatch(state: &AppState, req: &Parts) -> Response<ResponseBody> {
    match state.auth.check(&req.headers) {
        AuthOutcome::Granted(user) => {
            tracing::debug!("🔓 Authenticated user '{}'", user);
        }
        AuthOutcome::Rejected(user) => {
            tracing::warn!("🔒 Rejected credentials for user '{}'", user);
            return unauthorized(&state.auth);
        }
        outcome => {
            tracing::debug!("🔒 No usable credentials ({:?})", outcome);
            return unauthorized(&state.auth);
        }
    }

    let head = match req.method {
        Method::GET => false,
        Method::HEAD => true,
        _ => return method_not_allowed(),
    };

    let headers = &req.headers;
    let file_req = FileRequest {
        path: req.uri.path(),
        query: req.uri.query(),
        head,
        range: header_str(headers, RANGE),
        accept_encoding: header_str(headers, ACCEPT_ENCODING),
        if_none_match: header_str(headers, IF_NONE_MATCH),
        if_modified_since: header_str(headers, IF_MODIFIED_SINCE),
    };

    match state.files.serve(&file_req).await {
        Ok(served) => file_response(served),
        Err(e) => error_response(e, head),
    }
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn server_header() -> String {
    format!("Gatehouse/{}", gatehouse_core::VERSION)
}

fn base() -> Builder {
    Response::builder().header(SERVER, server_header())
}

fn full(bytes: Bytes) -> ResponseBody {
    Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
}

fn file_body(body: FileBody) -> ResponseBody {
    match body {
        FileBody::Empty => full(Bytes::new()),
        FileBody::Bytes(content) => full(Bytes::from(content)),
        FileBody::File(reader) => {
            StreamBody::new(ReaderStream::new(reader).map_ok(Frame::data)).boxed_unsync()
        }
    }
}

/// Finish a builder; a bad header value turns into a plain 500
fn finish(builder: Builder, body: ResponseBody) -> Response<ResponseBody> {
    builder.body(body).unwrap_or_else(|e| {
        tracing::error!("❌ Failed to build response: {}", e);
        let mut response = Response::new(full(Bytes::from_static(b"Internal Server Error")));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

fn text(status: StatusCode, head: bool) -> (Builder, ResponseBody) {
    let body = format!("{}\n", status.canonical_reason().unwrap_or("Error"));
    let builder = base()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(CONTENT_LENGTH, body.len());
    let body = if head { Bytes::new() } else { Bytes::from(body) };
    (builder, full(body))
}

fn unauthorized(auth: &BasicAuth) -> Response<ResponseBody> {
    let (builder, body) = text(StatusCode::UNAUTHORIZED, false);
    finish(builder.header(WWW_AUTHENTICATE, auth.challenge()), body)
}

fn method_not_allowed() -> Response<ResponseBody> {
    let (builder, body) = text(StatusCode::METHOD_NOT_ALLOWED, false);
    finish(builder.header(ALLOW, "GET, HEAD"), body)
}

fn error_response(err: ServeError, head: bool) -> Response<ResponseBody> {
    let status = err.status();
    let (mut builder, body) = text(status, head);

    match &err {
        ServeError::RangeNotSatisfiable { size } => {
            builder = builder.header(CONTENT_RANGE, format!("bytes */{}", size));
        }
        ServeError::Io(e) => {
            tracing::error!("❌ I/O error while serving: {}", e);
        }
        ServeError::NotFound | ServeError::Forbidden => {}
    }

    finish(builder, body)
}

fn file_response(served: ServedFile) -> Response<ResponseBody> {
    let status = StatusCode::from_u16(served.status).unwrap_or(StatusCode::OK);
    let mut builder = base().status(status);

    if let Some(location) = &served.location {
        builder = builder.header(LOCATION, location);
    }
    if let Some(last_modified) = &served.last_modified {
        builder = builder.header(LAST_MODIFIED, last_modified);
    }
    if let Some(etag) = &served.etag {
        builder = builder.header(ETAG, etag);
    }

    if status == StatusCode::NOT_MODIFIED {
        return finish(builder, full(Bytes::new()));
    }

    builder = builder.header(CONTENT_TYPE, &served.mime_type);
    if let Some(length) = served.content_length {
        builder = builder.header(CONTENT_LENGTH, length);
    }

    if served.etag.is_some() {
        builder = builder.header(ACCEPT_RANGES, "bytes");
    }
    if let Some(range) = &served.content_range {
        builder = builder.header(CONTENT_RANGE, range);
    }
    if let Some(encoding) = &served.content_encoding {
        builder = builder
            .header(CONTENT_ENCODING, encoding)
            .header(VARY, "Accept-Encoding");
    }

    // HEAD responses come back from the file server with an empty body
    finish(builder, file_body(served.body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::encode_basic;
    use gatehouse_core::config::Credential;
    use http::header::AUTHORIZATION;

    fn fixture() -> (tempfile::TempDir, AppState) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("hello.txt"), "Hello, Gatehouse!").unwrap();
        std::fs::write(tmp.path().join("notes.md"), "# notes").unwrap();
        std::fs::create_dir(tmp.path().join("docs")).unwrap();

        let state = AppState::new(
            BasicAuth::new("", Credential::new("foo", "bar")),
            FileServer::serve_dir(tmp.path()),
        );
        (tmp, state)
    }

    fn request(method: Method, uri: &str, auth: Option<(&str, &str)>) -> Request<()> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((user, pass)) = auth {
            builder = builder.header(AUTHORIZATION, encode_basic(user, pass));
        }
        builder.body(()).unwrap()
    }

    async fn body_string(response: Response<ResponseBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_credentials_get_challenge() {
        let (_tmp, state) = fixture();
        let response = handle_request(&state, request(Method::GET, "/hello.txt", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Basic realm=\"\"");
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let (_tmp, state) = fixture();
        let response =
            handle_request(&state, request(Method::GET, "/hello.txt", Some(("foo", "wrong")))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(WWW_AUTHENTICATE));
        assert!(!body_string(response).await.contains("Hello"));
    }

    #[tokio::test]
    async fn test_malformed_header_is_unauthorized() {
        let (_tmp, state) = fixture();
        let req = Request::builder()
            .uri("/hello.txt")
            .header(AUTHORIZATION, "Basic ???")
            .body(())
            .unwrap();
        let response = handle_request(&state, req).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unauthenticated_missing_path_does_not_leak() {
        let (_tmp, state) = fixture();
        let response = handle_request(&state, request(Method::GET, "/nope", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_credentials_serve_file() {
        let (_tmp, state) = fixture();
        let response =
            handle_request(&state, request(Method::GET, "/hello.txt", Some(("foo", "bar")))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(response.headers()[CONTENT_LENGTH], "17");
        assert!(response.headers()[SERVER].to_str().unwrap().starts_with("Gatehouse/"));
        assert_eq!(body_string(response).await, "Hello, Gatehouse!");
    }

    #[tokio::test]
    async fn test_root_listing_names_every_child() {
        let (_tmp, state) = fixture();
        let response = handle_request(&state, request(Method::GET, "/", Some(("foo", "bar")))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        for name in ["hello.txt", "notes.md", "docs/"] {
            assert!(html.contains(name), "listing is missing {}", name);
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let (_tmp, state) = fixture();
        let response =
            handle_request(&state, request(Method::GET, "/missing.txt", Some(("foo", "bar")))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_traversal_is_forbidden() {
        let (_tmp, state) = fixture();
        let response =
            handle_request(&state, request(Method::GET, "/%2e%2e/etc/passwd", Some(("foo", "bar"))))
                .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_head_has_length_but_no_body() {
        let (_tmp, state) = fixture();
        let response =
            handle_request(&state, request(Method::HEAD, "/hello.txt", Some(("foo", "bar")))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_LENGTH], "17");
        assert_eq!(body_string(response).await, "");
    }

    #[tokio::test]
    async fn test_other_methods_not_allowed() {
        let (_tmp, state) = fixture();
        let response =
            handle_request(&state, request(Method::POST, "/hello.txt", Some(("foo", "bar")))).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, HEAD");

        // Authentication still comes first
        let response = handle_request(&state, request(Method::DELETE, "/hello.txt", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_directory_redirect() {
        let (_tmp, state) = fixture();
        let response = handle_request(&state, request(Method::GET, "/docs", Some(("foo", "bar")))).await;
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[LOCATION], "/docs/");
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let (_tmp, state) = fixture();
        let req = Request::builder()
            .uri("/hello.txt")
            .header(AUTHORIZATION, encode_basic("foo", "bar"))
            .header(RANGE, "bytes=100-")
            .body(())
            .unwrap();
        let response = handle_request(&state, req).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[CONTENT_RANGE], "bytes */17");
    }

    #[tokio::test]
    async fn test_not_modified_has_no_body() {
        let (_tmp, state) = fixture();
        let first =
            handle_request(&state, request(Method::GET, "/hello.txt", Some(("foo", "bar")))).await;
        let etag = first.headers()[ETAG].clone();

        let req = Request::builder()
            .uri("/hello.txt")
            .header(AUTHORIZATION, encode_basic("foo", "bar"))
            .header(IF_NONE_MATCH, etag)
            .body(())
            .unwrap();
        let response = handle_request(&state, req).await;
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(!response.headers().contains_key(CONTENT_LENGTH));
        assert_eq!(body_string(response).await, "");
    }

    #[tokio::test]
    async fn test_range_body_is_streamed() {
        let (_tmp, state) = fixture();
        let req = Request::builder()
            .uri("/hello.txt")
            .header(AUTHORIZATION, encode_basic("foo", "bar"))
            .header(RANGE, "bytes=7-15")
            .body(())
            .unwrap();
        let response = handle_request(&state, req).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[CONTENT_LENGTH], "9");
        assert_eq!(response.headers()[CONTENT_RANGE], "bytes 7-15/17");
        assert_eq!(body_string(response).await, "Gatehouse");
    }

    #[tokio::test]
    async fn test_head_with_compression_omits_length() {
        let (tmp, state) = fixture();
        std::fs::write(tmp.path().join("big.txt"), "compress me please ".repeat(64)).unwrap();

        let req = Request::builder()
            .method(Method::HEAD)
            .uri("/big.txt")
            .header(AUTHORIZATION, encode_basic("foo", "bar"))
            .header(ACCEPT_ENCODING, "gzip")
            .body(())
            .unwrap();
        let response = handle_request(&state, req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_ENCODING], "gzip");
        assert_eq!(response.headers()[VARY], "Accept-Encoding");
        assert!(!response.headers().contains_key(CONTENT_LENGTH));
        assert_eq!(body_string(response).await, "");
    }
}
