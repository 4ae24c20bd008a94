pub mod acuity_client;
pub mod supabase_client;

/// Pulls a human message out of an upstream error body. Both providers send
/// JSON with one of a few message keys; anything else is passed through,
/// truncated.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "msg", "error_description", "error"] {
            if let Some(serde_json::Value::String(message)) = map.get(key) {
                return message.clone();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::error_message;

    #[test]
    fn prefers_json_message_keys() {
        assert_eq!(
            error_message(r#"{"status_code":400,"message":"The time is not available","error":"not_available"}"#),
            "The time is not available"
        );
        assert_eq!(error_message(r#"{"code":"PGRST116","msg":"no rows"}"#), "no rows");
        assert_eq!(error_message("  "), "empty response body");
        assert_eq!(error_message("<html>bad gateway</html>"), "<html>bad gateway</html>");
    }
}
