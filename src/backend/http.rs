use std::time::Duration;

use serde::Deserialize;

use crate::backend::{check_input_len, CancelToken, TranslateRequest, TranslationBackend};
use crate::error::TranslateError;

#[derive(Deserialize)]
struct WorkerResponse {
    text: String,
}

/// Remote translator worker speaking a one-endpoint JSON protocol:
/// POST `{text, source_lang, target_lang, context}` -> `{text}`.
pub struct HttpBackend {
    name: String,
    url: String,
    agent: ureq::Agent,
    max_input_chars: usize,
}

impl HttpBackend {
    pub fn new(name: &str, url: &str, timeout: Duration, max_input_chars: usize) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout(timeout)
            .build();
        Self {
            name: name.to_string(),
            url: url.to_string(),
            agent,
            max_input_chars,
        }
    }
}

pub(crate) fn map_status_error(code: u16, body: String) -> TranslateError {
    match code {
        401 | 403 => TranslateError::Auth(format!("status {code}: {body}")),
        408 | 429 => TranslateError::Transient(format!("status {code}: {body}")),
        500..=599 => TranslateError::Transient(format!("status {code}: {body}")),
        _ => TranslateError::Permanent(format!("status {code}: {body}")),
    }
}

pub(crate) fn map_ureq_error(err: ureq::Error) -> TranslateError {
    match err {
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            map_status_error(code, truncate(&body))
        }
        // Connection refused, DNS, timeouts: all worth retrying.
        ureq::Error::Transport(t) => TranslateError::Transient(t.to_string()),
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

impl TranslationBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    fn translate(
        &self,
        req: &TranslateRequest<'_>,
        cancel: &CancelToken,
    ) -> Result<String, TranslateError> {
        cancel.check()?;
        check_input_len(req.text, self.max_input_chars)?;

        let payload = serde_json::json!({
            "text": req.text,
            "source_lang": req.source_lang,
            "target_lang": req.target_lang,
            "context": req.context,
        });
        let mut request = self.agent.post(&self.url);
        if let Some(timeout) = req.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send_json(payload).map_err(map_ureq_error)?;
        // A blocking call cannot be aborted mid-flight; the timeout bounds it
        // and a cancel raised meanwhile is honoured before the result is used.
        cancel.check()?;
        let parsed: WorkerResponse = response
            .into_json()
            .map_err(|e| TranslateError::Permanent(format!("malformed worker response: {e}")))?;
        Ok(parsed.text)
    }
}
