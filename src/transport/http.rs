use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use crate::error::RequestError;
use crate::models::{
    FrameRequest, FrameResponse, HistoryQuery, RecordId, StopRequest, StopResponse,
};

use super::{AnalysisBackend, HistoryBackend};

const ENABLE_LOGS: bool = false;
const LOG_TARGET: &str = "eyecare::transport";

use crate::log_debug;

/// Blocking `ureq` client driven from tokio's blocking pool.
#[derive(Clone)]
pub struct HttpBackend {
    agent: ureq::Agent,
    base: Url,
}

impl HttpBackend {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(api_base)
            .with_context(|| format!("invalid backend URL '{api_base}'"))?;
        if base.cannot_be_a_base() {
            bail!("backend URL '{api_base}' cannot carry a path");
        }

        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self { agent, base })
    }

    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, RequestError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RequestError::Network(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post_json<B, R>(&self, url: Url, body: &B) -> Result<R, RequestError>
    where
        B: Serialize,
        R: DeserializeOwned + Send + 'static,
    {
        let payload =
            serde_json::to_string(body).map_err(|err| RequestError::Decode(err.to_string()))?;
        let agent = self.agent.clone();

        let text = run_blocking(move || {
            log_debug!("POST {} ({} bytes)", url, payload.len());
            agent
                .post(url.as_str())
                .set("Content-Type", "application/json")
                .send_string(&payload)
                .map_err(map_ureq_error)
                .and_then(read_body)
        })
        .await?;

        decode(&text)
    }
}

impl AnalysisBackend for HttpBackend {
    async fn process_frame(&self, request: FrameRequest) -> Result<FrameResponse, RequestError> {
        let url = self.endpoint(&["process_frame"])?;
        self.post_json(url, &request).await
    }

    async fn stop_detection(&self, request: StopRequest) -> Result<StopResponse, RequestError> {
        let url = self.endpoint(&["stop_detection"])?;
        self.post_json(url, &request).await
    }
}

impl HistoryBackend for HttpBackend {
    async fn fetch_history(
        &self,
        query: HistoryQuery,
    ) -> Result<Vec<serde_json::Value>, RequestError> {
        let mut url = self.endpoint(&["history"])?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(user_id) = &query.user_id {
                pairs.append_pair("user_id", user_id);
            }
            if let Some(device_id) = &query.device_id {
                pairs.append_pair("device_id", device_id);
            }
            pairs.append_pair("limit", &query.limit.to_string());
        }
        let agent = self.agent.clone();

        let text = run_blocking(move || {
            log_debug!("GET {}", url);
            agent
                .get(url.as_str())
                .call()
                .map_err(map_ureq_error)
                .and_then(read_body)
        })
        .await?;

        decode(&text)
    }

    async fn delete_record(&self, id: RecordId) -> Result<(), RequestError> {
        let url = self.endpoint(&["history", &id.to_string()])?;
        let agent = self.agent.clone();

        run_blocking(move || {
            log_debug!("DELETE {}", url);
            agent
                .delete(url.as_str())
                .call()
                .map(|_| ())
                .map_err(map_ureq_error)
        })
        .await
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, RequestError>
where
    F: FnOnce() -> Result<T, RequestError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| RequestError::Network(format!("request worker join failed: {err}")))?
}

fn read_body(response: ureq::Response) -> Result<String, RequestError> {
    response
        .into_string()
        .map_err(|err| RequestError::Network(format!("read response body: {err}")))
}

fn decode<R: DeserializeOwned>(text: &str) -> Result<R, RequestError> {
    serde_json::from_str(text).map_err(|err| RequestError::Decode(err.to_string()))
}

fn map_ureq_error(err: ureq::Error) -> RequestError {
    match err {
        ureq::Error::Status(code, response) => RequestError::Status {
            code,
            body: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => RequestError::Network(transport.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_onto_base_path() {
        let backend = HttpBackend::new("http://127.0.0.1:5000", Duration::from_secs(1)).unwrap();
        assert_eq!(
            backend.endpoint(&["process_frame"]).unwrap().as_str(),
            "http://127.0.0.1:5000/process_frame"
        );

        let prefixed = HttpBackend::new("http://example.test/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            prefixed.endpoint(&["history", "a b"]).unwrap().as_str(),
            "http://example.test/api/history/a%20b"
        );
    }

    #[test]
    fn rejects_unusable_base() {
        assert!(HttpBackend::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpBackend::new("mailto:someone@example.test", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn decode_reports_bad_json() {
        let err = decode::<FrameResponse>("<html>").unwrap_err();
        assert!(matches!(err, RequestError::Decode(_)));
    }
}
