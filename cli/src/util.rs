use reqwest::header::HeaderMap;
use serde_json::{Map, Value, json};

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", pretty(&err));
    std::process::exit(4);
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Quota-related response headers (`x-ratelimit-*`, `retry-after`) as a JSON
/// object, or `None` when the response carried none.
pub fn quota_headers(headers: &HeaderMap) -> Option<Value> {
    let quota: Map<String, Value> = headers
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            name.starts_with("x-ratelimit-") || name == "retry-after"
        })
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            let parsed = value
                .parse::<u64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::from(value));
            Some((name.as_str().to_string(), parsed))
        })
        .collect();
    (!quota.is_empty()).then_some(Value::Object(quota))
}

pub fn exit_code_for(status: u16) -> i32 {
    match status {
        200..=299 => 0,
        400..=499 => 1,
        _ => 2,
    }
}

/// Execute an API request, print the response, and return a structured exit
/// code.
///
/// Exit codes: 0=success (2xx), 1=client error (4xx, including 429),
///             2=server error (5xx), 3=connection error, 4=usage error
pub async fn api_request(
    api_url: &str,
    method: reqwest::Method,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
    include: bool,
) -> i32 {
    let url = match reqwest::Url::parse(api_url).and_then(|base| base.join(path)) {
        Ok(url) => url,
        Err(e) => {
            let err = json!({
                "error": "cli_error",
                "message": format!("Invalid URL: {api_url}{path}: {e}")
            });
            eprintln!("{}", pretty(&err));
            return 4;
        }
    };

    let mut req = client().request(method, url);
    if let Some(t) = token {
        req = req.bearer_auth(t);
    }
    if let Some(b) = body {
        req = req.json(&b);
    }

    let resp = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            let err = json!({
                "error": "connection_error",
                "message": format!("{e}"),
                "docs_hint": "Is the API server running? Check TONEGATE_API_URL."
            });
            eprintln!("{}", pretty(&err));
            return 3;
        }
    };

    let status = resp.status().as_u16();
    let exit_code = exit_code_for(status);
    let quota = quota_headers(resp.headers());

    let resp_body: Value = match resp.json().await {
        Ok(v) => v,
        Err(e) => json!({"raw_error": format!("Failed to parse response as JSON: {e}")}),
    };

    let output = if include {
        json!({
            "status": status,
            "quota": quota,
            "body": resp_body
        })
    } else {
        resp_body
    };

    if exit_code == 0 {
        println!("{}", pretty(&output));
    } else {
        eprintln!("{}", pretty(&output));
    }
    if !include {
        if let Some(quota) = quota {
            eprintln!("{}", json!({ "quota": quota }));
        }
    }

    exit_code
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    #[test]
    fn collects_only_quota_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-1m-remaining", HeaderValue::from_static("2"));
        headers.insert("retry-after", HeaderValue::from_static("41"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let quota = quota_headers(&headers).expect("quota headers present");
        assert_eq!(quota["x-ratelimit-1m-remaining"], 2);
        assert_eq!(quota["retry-after"], 41);
        assert!(quota.get("content-type").is_none());
    }

    #[test]
    fn no_quota_headers_yields_none() {
        assert!(quota_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn exit_codes_follow_status_class() {
        assert_eq!(exit_code_for(200), 0);
        assert_eq!(exit_code_for(429), 1);
        assert_eq!(exit_code_for(500), 2);
    }
}
