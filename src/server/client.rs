use super::{DoorServer, Heartbeat, ServerStatus};
use crate::audit::UnlockEvent;
use crate::config::ServerConfig;
use crate::error::PollError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// Door server reached over HTTP.
///
/// `ureq` is blocking, so every request runs on the blocking pool.
#[derive(Clone)]
pub struct HttpDoorServer {
    agent: ureq::Agent,
    url: String,
    authorization: Option<String>,
}

impl HttpDoorServer {
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_timeout(&config.url, &config.api_key, config.request_timeout())
    }

    pub fn with_timeout(url: &str, api_key: &str, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        let api_key = api_key.trim();
        Self {
            agent,
            url: url.trim_end_matches('/').to_string(),
            authorization: (!api_key.is_empty()).then(|| format!("Bearer {}", api_key)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    /// GET `/status` and `/health`, both of which must answer 200
    pub async fn check_liveness(&self) -> Result<(), PollError> {
        for path in ["/status", "/health"] {
            let (status, _) = self.get(self.endpoint(path)).await?;
            if status != 200 {
                return Err(PollError::BadStatus(status));
            }
            info!("Server {} OK", path);
        }
        Ok(())
    }

    async fn get(&self, url: String) -> Result<(u16, String), PollError> {
        let agent = self.agent.clone();
        let authorization = self.authorization.clone();

        tokio::task::spawn_blocking(move || {
            let mut request = agent.get(url.as_str());
            if let Some(value) = &authorization {
                request = request.header("Authorization", value.as_str());
            }

            let mut response = request.call().map_err(transport_error)?;
            let status = response.status().as_u16();
            let body = response
                .body_mut()
                .read_to_string()
                .map_err(transport_error)?;
            Ok((status, body))
        })
        .await
        .map_err(|e| PollError::ConnectionFailed {
            details: format!("request task failed: {}", e),
        })?
    }

    async fn post_json<T>(&self, path: &str, body: &T) -> Result<(), PollError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let body = serde_json::to_value(body).map_err(|e| PollError::MalformedBody {
            details: e.to_string(),
        })?;
        let agent = self.agent.clone();
        let authorization = self.authorization.clone();
        let url = self.endpoint(path);

        let status = tokio::task::spawn_blocking(move || {
            let mut request = agent.post(url.as_str());
            if let Some(value) = &authorization {
                request = request.header("Authorization", value.as_str());
            }

            let response = request.send_json(&body).map_err(transport_error)?;
            Ok::<_, PollError>(response.status().as_u16())
        })
        .await
        .map_err(|e| PollError::ConnectionFailed {
            details: format!("request task failed: {}", e),
        })??;

        if !(200..300).contains(&status) {
            return Err(PollError::BadStatus(status));
        }
        Ok(())
    }
}

fn transport_error(error: ureq::Error) -> PollError {
    match error {
        ureq::Error::Timeout(_) => PollError::Timeout,
        ureq::Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => PollError::Timeout,
        other => PollError::ConnectionFailed {
            details: other.to_string(),
        },
    }
}

#[async_trait]
impl DoorServer for HttpDoorServer {
    async fn poll(&self) -> Result<ServerStatus, PollError> {
        let (status, body) = self.get(self.url.clone()).await?;
        if !(200..300).contains(&status) {
            return Err(PollError::BadStatus(status));
        }
        ServerStatus::parse(&body)
    }

    async fn report_unlock(&self, event: &UnlockEvent) -> Result<(), PollError> {
        self.post_json("/log", event).await?;
        debug!("Unlock event logged to server");
        Ok(())
    }

    async fn publish_sounds(&self, sounds: &[String]) -> Result<(), PollError> {
        self.post_json("/sounds", &json!({ "sounds": sounds })).await?;
        info!("Synced {} sounds to server", sounds.len());
        Ok(())
    }

    async fn send_heartbeat(&self, heartbeat: &Heartbeat) -> Result<(), PollError> {
        self.post_json("/health/doorbot", heartbeat).await?;
        debug!("Heartbeat sent");
        Ok(())
    }
}
