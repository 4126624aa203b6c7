use std::time::Duration;

use serde::Deserialize;

use crate::backend::http::map_ureq_error;
use crate::backend::{check_input_len, CancelToken, TranslateRequest, TranslationBackend};
use crate::error::TranslateError;

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

/// Hosted LLM behind an OpenAI-compatible chat-completions endpoint. The
/// translation instruction and any caller context go into the system message;
/// the text to translate is the sole user message.
pub struct HostedBackend {
    name: String,
    url: String,
    model: String,
    api_key: String,
    agent: ureq::Agent,
    max_input_chars: usize,
}

impl HostedBackend {
    pub fn new(
        name: &str,
        url: &str,
        model: &str,
        api_key: String,
        timeout: Duration,
        max_input_chars: usize,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout(timeout)
            .build();
        Self {
            name: name.to_string(),
            url: url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            agent,
            max_input_chars,
        }
    }

    fn system_prompt(req: &TranslateRequest<'_>) -> String {
        let mut prompt = format!(
            "You are a professional translator. Translate the user's text from {} to {}. \
             Preserve the meaning, register and inline punctuation. Do not add content, \
             notes or explanations; return only the translation.",
            req.source_lang, req.target_lang
        );
        if let Some(context) = req.context {
            if !context.trim().is_empty() {
                prompt.push_str("\n\n");
                prompt.push_str(context);
            }
        }
        prompt
    }
}

impl TranslationBackend for HostedBackend {
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
            "model": self.model,
            "temperature": 0.2,
            "messages": [
                {"role": "system", "content": Self::system_prompt(req)},
                {"role": "user", "content": req.text},
            ],
        });
        let mut request = self
            .agent
            .post(&format!("{}/chat/completions", self.url))
            .set("Authorization", &format!("Bearer {}", self.api_key));
        if let Some(timeout) = req.timeout {
            request = request.timeout(timeout);
        }
        let response = request.send_json(payload).map_err(map_ureq_error)?;
        cancel.check()?;
        let parsed: ChatResponse = response
            .into_json()
            .map_err(|e| TranslateError::Permanent(format!("malformed chat response: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| TranslateError::Permanent("chat response had no choices".to_string()))?;
        Ok(content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_carries_langs_and_context() {
        let req = TranslateRequest {
            text: "x",
            source_lang: "en",
            target_lang: "fr",
            context: Some("Use these exact translations for the listed terms:\n- a => b"),
            timeout: None,
        };
        let prompt = HostedBackend::system_prompt(&req);
        assert!(prompt.contains("from en to fr"));
        assert!(prompt.contains("a => b"));
    }
}
