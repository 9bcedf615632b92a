use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

#[cfg(test)]
pub(crate) mod test_server;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {detail}")]
    Status { status: u16, detail: String },

    #[error("request failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: usize, last: String },

    #[error("request failed: response decode failed: {0}")]
    Body(#[source] std::io::Error),
}

fn should_retry_http_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) attempts: usize,
    pub(crate) delay: Duration,
}

/// Blocking GET client shared by the catalog resolver and the asset fetcher.
pub(crate) struct HttpClient {
    agent: ureq::Agent,
    policy: RetryPolicy,
}

impl HttpClient {
    pub(crate) fn new(
        connect_timeout: Duration,
        read_timeout: Duration,
        policy: RetryPolicy,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(connect_timeout)
            .timeout_read(read_timeout)
            .timeout_write(read_timeout)
            .build();
        Self { agent, policy }
    }

    pub(crate) fn get_text(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        query: &[(&str, &str)],
    ) -> Result<String, HttpError> {
        self.get(url, headers, query)?
            .into_string()
            .map_err(HttpError::Body)
    }

    /// Issues the request, retrying 408/429/5xx and transport failures.
    /// The returned response has a success status; its body is unread.
    pub(crate) fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        query: &[(&str, &str)],
    ) -> Result<ureq::Response, HttpError> {
        let attempts = self.policy.attempts.max(1);

        for attempt in 1..=attempts {
            let mut request = self.agent.get(url);
            for (name, value) in headers {
                request = request.set(name, value);
            }
            for (key, value) in query {
                request = request.query(key, value);
            }

            debug!(url, attempt, "http get");
            match request.call() {
                Ok(response) => return Ok(response),
                Err(ureq::Error::Status(status, response)) => {
                    let response_body = response.into_string().ok().unwrap_or_default();
                    let body = response_body.trim();
                    let status_error = if body.is_empty() {
                        format!("HTTP status {status}")
                    } else {
                        let truncated = body.chars().take(240).collect::<String>();
                        format!("HTTP status {status} ({truncated})")
                    };

                    if should_retry_http_status(status) && attempt < attempts {
                        warn!(url, attempt, status, "retryable status, retrying");
                        thread::sleep(self.policy.delay);
                        continue;
                    }

                    if should_retry_http_status(status) {
                        return Err(HttpError::Exhausted {
                            attempts,
                            last: status_error,
                        });
                    }

                    return Err(HttpError::Status {
                        status,
                        detail: status_error,
                    });
                }
                Err(ureq::Error::Transport(err)) => {
                    let transport_error = format!("transport error: {err}");
                    if attempt < attempts {
                        warn!(url, attempt, error = %err, "transport error, retrying");
                        thread::sleep(self.policy.delay);
                        continue;
                    }
                    return Err(HttpError::Exhausted {
                        attempts,
                        last: transport_error,
                    });
                }
            }
        }

        Err(HttpError::Exhausted {
            attempts,
            last: "exhausted attempts without a concrete error".to_string(),
        })
    }
}
