//! hyper-backed HTTP/1.1 server for exercising the client against canned
//! responses.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

type Responder = dyn Fn(&RecordedRequest) -> (u16, Vec<u8>) + Send + Sync;
type Recorded = Arc<Mutex<Vec<RecordedRequest>>>;

/// Serves every connection with `responder` and records the requests.
#[derive(Debug)]
pub(crate) struct MockServer {
    addr: SocketAddr,
    requests: Recorded,
}

impl MockServer {
    pub async fn start(responder: impl Fn(&RecordedRequest) -> (u16, Vec<u8>) + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests: Recorded = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Responder> = Arc::new(responder);

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let responder = Arc::clone(&responder);
                let recorded = Arc::clone(&recorded);
                let svc = service_fn(move |req| {
                    respond(req, Arc::clone(&responder), Arc::clone(&recorded))
                });
                tokio::spawn(async move {
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), svc)
                        .await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn respond(
    req: Request<Incoming>,
    responder: Arc<Responder>,
    recorded: Recorded,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes().to_vec(),
        Err(_) => Vec::new(),
    };
    let request = RecordedRequest {
        method: parts.method.to_string(),
        path: parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_owned(), |p| p.as_str().to_owned()),
        headers: parts
            .headers
            .iter()
            .map(|(n, v)| {
                (
                    n.as_str().to_owned(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect(),
        body,
    };
    let (status, payload) = responder(&request);
    recorded.lock().unwrap().push(request);

    let mut response = Response::new(Full::new(Bytes::from(payload)));
    *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_should_record_chunked_body_and_serve_keep_alive_requests() {
        let server = MockServer::start(|req| (201, req.body.clone())).await;
        let http = reqwest::Client::builder().no_proxy().build().unwrap();

        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from_static(b"first ")), Ok(Bytes::from_static(b"second"))];
        let streamed = reqwest::Body::wrap_stream(futures::stream::iter(chunks));
        let response = http
            .put(format!("{}/object?part=1", server.url()))
            .body(streamed)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
        assert_eq!(response.bytes().await.unwrap().as_ref(), b"first second");

        let response = http.get(format!("{}/again", server.url())).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 201);

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, "PUT");
        assert_eq!(requests[0].path, "/object?part=1");
        assert_eq!(requests[0].header("Transfer-Encoding"), Some("chunked"));
        assert_eq!(requests[0].body, b"first second");
        assert_eq!(requests[1].path, "/again");
    }
}
