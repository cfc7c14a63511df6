use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;
use thiserror::Error;

use crate::domain::charger_payload::{
    InfoPage, ParseError, StatusPage, parse_info_page, parse_status_page,
};

pub const DEFAULT_INFO_URL: &str = "http://apis.data.go.kr/B552584/EvCharger/getChargerInfo";
pub const DEFAULT_STATUS_URL: &str = "http://apis.data.go.kr/B552584/EvCharger/getChargerStatus";

/// Paged access to the charger-info and charger-status collections. Page numbers are 1-based.
pub trait ChargerApi: Send + Sync + 'static {
    fn fetch_info_page(&self, page_no: u32, page_size: u32) -> Result<InfoPage, FetchError>;
    fn fetch_status_page(&self, page_no: u32, page_size: u32) -> Result<StatusPage, FetchError>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} answered with HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("transport failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode response as JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected response payload: {0}")]
    Parse(#[from] ParseError),
}

impl FetchError {
    /// Network-level failures, as opposed to a response that arrived but could not be decoded.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ClientBuild(_) | Self::Http { .. } | Self::Status { .. } | Self::Io(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargerEndpoints {
    pub info_url: String,
    pub status_url: String,
}

impl Default for ChargerEndpoints {
    fn default() -> Self {
        Self {
            info_url: DEFAULT_INFO_URL.to_string(),
            status_url: DEFAULT_STATUS_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChargerHttpClient {
    client: Client,
    endpoints: ChargerEndpoints,
    service_key: String,
}

impl ChargerHttpClient {
    pub fn new(
        endpoints: ChargerEndpoints,
        service_key: &str,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::ClientBuild)?;

        Ok(Self {
            client,
            endpoints,
            service_key: service_key.to_string(),
        })
    }

    fn get_page(&self, url: &str, page_no: u32, page_size: u32) -> Result<Value, FetchError> {
        let page_no = page_no.to_string();
        let page_size = page_size.to_string();
        let http_error = |source: reqwest::Error| FetchError::Http {
            endpoint: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .query(&[
                ("serviceKey", self.service_key.as_str()),
                ("pageNo", page_no.as_str()),
                ("numOfRows", page_size.as_str()),
                ("dataType", "JSON"),
            ])
            .send()
            .map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().map_err(http_error)?;
        serde_json::from_slice(&body).map_err(FetchError::from)
    }
}

impl ChargerApi for ChargerHttpClient {
    fn fetch_info_page(&self, page_no: u32, page_size: u32) -> Result<InfoPage, FetchError> {
        let payload = self.get_page(&self.endpoints.info_url, page_no, page_size)?;
        parse_info_page(&payload).map_err(FetchError::from)
    }

    fn fetch_status_page(&self, page_no: u32, page_size: u32) -> Result<StatusPage, FetchError> {
        let payload = self.get_page(&self.endpoints.status_url, page_no, page_size)?;
        parse_status_page(&payload).map_err(FetchError::from)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::{ChargerApi, ChargerEndpoints, ChargerHttpClient, FetchError};

    struct Responder {
        base_url: String,
        requests: mpsc::Receiver<String>,
        handle: thread::JoinHandle<()>,
    }

    /// Serves one canned response per accepted connection, in order.
    fn spawn_responder(responses: Vec<(u16, &'static str)>) -> Responder {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let port = listener
            .local_addr()
            .expect("addr should be available")
            .port();
        let (sender, requests) = mpsc::channel();

        let handle = thread::spawn(move || {
            for (status, body) in responses {
                let (mut stream, _) = match listener.accept() {
                    Ok(pair) => pair,
                    Err(_) => break,
                };
                let request_line = read_request_line(&mut stream);
                sender
                    .send(request_line)
                    .expect("request line should be reported");

                let reply = format!(
                    "HTTP/1.1 {status} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream
                    .write_all(reply.as_bytes())
                    .expect("responder write should succeed");
            }
        });

        Responder {
            base_url: format!("http://127.0.0.1:{port}"),
            requests,
            handle,
        }
    }

    fn read_request_line(stream: &mut TcpStream) -> String {
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("read timeout should be configurable");
        let mut raw: Vec<u8> = Vec::new();
        let mut buffer = [0_u8; 1024];
        while !raw.windows(4).any(|window| window == b"\r\n\r\n") {
            let size = stream.read(&mut buffer).expect("request should be readable");
            if size == 0 {
                break;
            }
            raw.extend_from_slice(&buffer[..size]);
        }
        String::from_utf8_lossy(&raw)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    }

    fn client_for(base_url: &str, timeout: Duration) -> ChargerHttpClient {
        ChargerHttpClient::new(
            ChargerEndpoints {
                info_url: format!("{base_url}/getChargerInfo"),
                status_url: format!("{base_url}/getChargerStatus"),
            },
            "test-key",
            timeout,
        )
        .expect("client should build")
    }

    #[test]
    fn fetches_and_decodes_info_page_with_paging_query() {
        let responder = spawn_responder(vec![(
            200,
            r#"{"resultCode":"00","totalCount":3,"items":{"item":[{"statId":"ME1","chgerId":"01","statNm":"Hall"}]}}"#,
        )]);
        let client = client_for(&responder.base_url, Duration::from_secs(2));

        let page = client
            .fetch_info_page(2, 1)
            .expect("info page should be fetched");

        assert_eq!(page.total_count, 3);
        assert_eq!(page.records[0].station_name, "Hall");

        let request_line = responder.requests.recv().expect("request should be seen");
        assert!(request_line.starts_with("GET /getChargerInfo?"));
        assert!(request_line.contains("serviceKey=test-key"));
        assert!(request_line.contains("pageNo=2"));
        assert!(request_line.contains("numOfRows=1"));
        assert!(request_line.contains("dataType=JSON"));
        responder.handle.join().expect("responder should finish");
    }

    #[test]
    fn fetches_status_page_from_status_endpoint() {
        let responder = spawn_responder(vec![(
            200,
            r#"{"resultCode":"00","totalCount":1,"items":{"item":[{"statId":"ME1","chgerId":"01","stat":"3"}]}}"#,
        )]);
        let client = client_for(&responder.base_url, Duration::from_secs(2));

        let page = client
            .fetch_status_page(1, 9000)
            .expect("status page should be fetched");

        assert_eq!(page.records[0].status, "3");
        let request_line = responder.requests.recv().expect("request should be seen");
        assert!(request_line.starts_with("GET /getChargerStatus?"));
        responder.handle.join().expect("responder should finish");
    }

    #[test]
    fn maps_server_error_status_to_transport_failure() {
        let responder = spawn_responder(vec![(500, r#"{"error":"boom"}"#)]);
        let client = client_for(&responder.base_url, Duration::from_secs(2));

        let err = client
            .fetch_info_page(1, 10)
            .expect_err("500 response must fail");

        assert!(err.is_transport());
        assert!(matches!(err, FetchError::Status { status: 500, .. }));
        responder.handle.join().expect("responder should finish");
    }

    #[test]
    fn maps_malformed_body_to_decode_failure() {
        let responder = spawn_responder(vec![(200, "<OpenAPI_ServiceResponse/>")]);
        let client = client_for(&responder.base_url, Duration::from_secs(2));

        let err = client
            .fetch_status_page(1, 10)
            .expect_err("non-json body must fail");

        assert!(!err.is_transport());
        assert!(matches!(err, FetchError::Json(_)));
        responder.handle.join().expect("responder should finish");
    }

    #[test]
    fn times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let port = listener
            .local_addr()
            .expect("addr should be available")
            .port();
        let handle = thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                thread::sleep(Duration::from_millis(800));
                drop(stream);
            }
        });
        let client = client_for(
            &format!("http://127.0.0.1:{port}"),
            Duration::from_millis(150),
        );

        let err = client
            .fetch_info_page(1, 10)
            .expect_err("silent server must time out");

        match err {
            FetchError::Http { source, .. } => assert!(source.is_timeout()),
            other => panic!("expected http timeout, got {other}"),
        }
        handle.join().expect("listener thread should finish");
    }
}
