//! REST client that replays remote calls against the response API.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use super::{DispatchError, RemoteApi, RemoteCall};
use crate::config::QueueConfig;
use crate::models::HttpMethod;
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// HTTP method, absolute URL and optional JSON body for one call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Route<'a> {
    pub method: Method,
    pub url: String,
    pub body: Option<&'a Value>,
}

/// [`RemoteApi`] backed by the REST service.
#[derive(Debug, Clone)]
pub struct HttpRemoteApi {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpRemoteApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, DispatchError> {
        let base_url = normalize_base_url(base_url.into().as_str())?;
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url,
            token: normalize_text_option(token),
            client,
        })
    }

    /// Build a client from `RESCUE_API_BASE_URL` / `RESCUE_API_TOKEN` settings.
    pub fn from_config(config: &QueueConfig) -> Result<Self, DispatchError> {
        let base_url = config.api_base_url.clone().ok_or_else(|| {
            DispatchError::InvalidRequest("API base URL is not configured".to_string())
        })?;
        Self::new(base_url, config.api_token.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn route<'a>(&self, call: &'a RemoteCall) -> Route<'a> {
        let base = &self.base_url;
        let (method, url, body) = match call {
            RemoteCall::CreateDonation { payload } => {
                (Method::POST, format!("{base}/donations"), Some(payload))
            }
            RemoteCall::RegisterVolunteer { payload } => {
                (Method::POST, format!("{base}/volunteers"), Some(payload))
            }
            RemoteCall::SubmitReport { payload, .. } => {
                (Method::POST, format!("{base}/hazard-reports"), Some(payload))
            }
            RemoteCall::CreateContact { payload } => (
                Method::POST,
                format!("{base}/emergency-contacts"),
                Some(payload),
            ),
            RemoteCall::UpdateContact { id, payload } => (
                Method::PUT,
                format!("{base}/emergency-contacts/{id}"),
                Some(payload),
            ),
            RemoteCall::DeleteContact { id } => (
                Method::DELETE,
                format!("{base}/emergency-contacts/{id}"),
                None,
            ),
            RemoteCall::CreateDrill { payload } => {
                (Method::POST, format!("{base}/drills"), Some(payload))
            }
            RemoteCall::UpdateDrill { id, payload } => {
                (Method::PUT, format!("{base}/drills/{id}"), Some(payload))
            }
            RemoteCall::DeleteDrill { id } => (Method::DELETE, format!("{base}/drills/{id}"), None),
            RemoteCall::Http {
                method,
                endpoint,
                payload,
            } => {
                let url = if is_http_url(endpoint) {
                    endpoint.clone()
                } else {
                    format!("{base}/{}", endpoint.trim_start_matches('/'))
                };
                let body = (*method != HttpMethod::Delete).then_some(payload);
                (to_reqwest_method(*method), url, body)
            }
        };

        Route { method, url, body }
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn execute(&self, call: &RemoteCall) -> Result<(), DispatchError> {
        let route = self.route(call);
        let mut request = self
            .client
            .request(route.method.clone(), &route.url)
            .header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = route.body {
            request = request.json(body);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Api {
                status,
                message: format!("{} {}: {}", route.method, route.url, compact_text(&body)),
            });
        }
        Ok(())
    }
}

const fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn normalize_base_url(raw: &str) -> Result<String, DispatchError> {
    let base = raw.trim().trim_end_matches('/').to_string();
    if base.is_empty() {
        return Err(DispatchError::InvalidRequest(
            "API base URL must not be empty".to_string(),
        ));
    }
    if !is_http_url(&base) {
        return Err(DispatchError::InvalidRequest(
            "API base URL must include http:// or https://".to_string(),
        ));
    }
    Ok(base)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn api() -> HttpRemoteApi {
        HttpRemoteApi::new("https://api.example.org/v1/", None).unwrap()
    }

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url("").is_err());
        assert!(normalize_base_url("api.example.org").is_err());
        assert_eq!(
            normalize_base_url("https://api.example.org/").unwrap(),
            "https://api.example.org"
        );
    }

    #[test]
    fn typed_calls_map_to_rest_routes() {
        let api = api();
        let payload = json!({ "amount": 5 });

        let donation = RemoteCall::CreateDonation {
            payload: payload.clone(),
        };
        let route = api.route(&donation);
        assert_eq!(route.method, Method::POST);
        assert_eq!(route.url, "https://api.example.org/v1/donations");
        assert_eq!(route.body, Some(&payload));

        let call = RemoteCall::UpdateContact {
            id: "42".to_string(),
            payload: payload.clone(),
        };
        let route = api.route(&call);
        assert_eq!(route.method, Method::PUT);
        assert_eq!(route.url, "https://api.example.org/v1/emergency-contacts/42");

        let call = RemoteCall::DeleteDrill {
            id: "d-1".to_string(),
        };
        let route = api.route(&call);
        assert_eq!(route.method, Method::DELETE);
        assert_eq!(route.url, "https://api.example.org/v1/drills/d-1");
        assert_eq!(route.body, None);
    }

    #[test]
    fn generic_calls_resolve_relative_and_absolute_endpoints() {
        let api = api();

        let relative = RemoteCall::Http {
            method: HttpMethod::Patch,
            endpoint: "/shelters/3".to_string(),
            payload: json!({ "beds": 4 }),
        };
        let route = api.route(&relative);
        assert_eq!(route.method, Method::PATCH);
        assert_eq!(route.url, "https://api.example.org/v1/shelters/3");
        assert!(route.body.is_some());

        let absolute = RemoteCall::Http {
            method: HttpMethod::Delete,
            endpoint: "https://other.example.org/items/9".to_string(),
            payload: json!({ "ignored": true }),
        };
        let route = api.route(&absolute);
        assert_eq!(route.url, "https://other.example.org/items/9");
        assert_eq!(route.body, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_success_status_is_an_api_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0_u8; 4096];
                let _ = socket.read(&mut buf).await;
                let body = "database offline";
                let response = format!(
                    "HTTP/1.1 500 Internal Server Error\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        let api = HttpRemoteApi::new(format!("http://127.0.0.1:{port}"), Some("token".into()))
            .unwrap();
        let error = api
            .execute(&RemoteCall::CreateDonation {
                payload: json!({ "amount": 1 }),
            })
            .await
            .unwrap_err();

        match error {
            DispatchError::Api { status, message } => {
                assert_eq!(status, 500);
                assert!(message.contains("database offline"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
