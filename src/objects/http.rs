//! `HTTP`: blocking outbound requests.

use super::json::json_to_value;
use crate::eval::EvalError;
use crate::extension::{arg, arg_str, check_args, ExtensionObject};
use crate::value::Value;
use std::time::Duration;

pub struct HttpObject {
    agent: ureq::Agent,
    last_status: u16,
}

impl HttpObject {
    pub fn new() -> Self {
        HttpObject {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(30))
                .build(),
            last_status: 0,
        }
    }

    fn fetch(&mut self, method: &str, url: &str, body: Option<&str>) -> Result<Value, EvalError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(EvalError::InvalidProcedureCall(format!("HTTP.Fetch: bad url '{}'", url)));
        }
        let request = self.agent.request(method, url);
        tracing::debug!(method, url, "outbound request");
        let response = match body {
            Some(b) => request.set("Content-Type", "application/json").send_string(b),
            None => request.call(),
        };
        let response = match response {
            Ok(resp) => resp,
            Err(ureq::Error::Status(_, resp)) => resp,
            Err(e) => {
                tracing::warn!(url, error = %e, "outbound request failed");
                self.last_status = 0;
                return Err(EvalError::Raised {
                    number: -2146697211,
                    origin: "HTTP".to_string(),
                    description: format!("request failed: {}", e),
                });
            }
        };
        self.last_status = response.status();
        let is_json = response.content_type().contains("json");
        let text = response.into_string()?;
        if is_json {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
                return Ok(json_to_value(json));
            }
        }
        Ok(Value::String(text))
    }
}

impl Default for HttpObject {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionObject for HttpObject {
    fn type_name(&self) -> &str {
        "HTTP"
    }

    fn call_method(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        match name.to_ascii_uppercase().as_str() {
            "FETCH" | "REQUEST" => {
                check_args(name, args, 1, 3)?;
                let url = arg_str(args, 0);
                let method = match arg(args, 1) {
                    Value::Empty => "GET".to_string(),
                    v => v.to_vb_string()?.to_ascii_uppercase(),
                };
                let body = match arg(args, 2) {
                    Value::Empty | Value::Null => None,
                    v => Some(v.to_vb_string()?),
                };
                self.fetch(&method, &url, body.as_deref())
            }
            "LASTSTATUS" => Ok(Value::Integer(self.last_status as i64)),
            _ => Err(EvalError::NotSupported(format!("HTTP.{}", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_urls() {
        let mut http = HttpObject::new();
        let err = http.call_method("Fetch", &[Value::str("file:///etc/passwd")]).unwrap_err();
        assert_eq!(err.number(), 5);
        assert!(matches!(http.get_property("LastStatus", &[]).unwrap(), Value::Integer(0)));
    }
}
