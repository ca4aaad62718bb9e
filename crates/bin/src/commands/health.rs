//! Health command - checks a running Tally server.

use std::time::Duration;

use crate::cli::HealthArgs;

/// Accept either a base URL or the full health URL
fn health_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/health") {
        base.to_string()
    } else {
        format!("{base}/health")
    }
}

/// Interpret a health response body. `Ok` carries the backend name.
fn check_body(body: &serde_json::Value) -> Result<String, String> {
    let status = body.get("status").and_then(|s| s.as_str()).unwrap_or("");
    let backend = body
        .get("backend")
        .and_then(|b| b.as_str())
        .unwrap_or("unknown")
        .to_string();
    match status {
        "healthy" => Ok(backend),
        "" => Err("response carries no status".to_string()),
        other => Err(format!("server reports '{other}' (backend {backend})")),
    }
}

/// Run the health command. Any failure becomes a non-zero exit.
pub async fn run(args: &HealthArgs) -> Result<(), Box<dyn std::error::Error>> {
    let url = health_url(&args.url);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()?;

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| format!("unhealthy: failed to reach {url}: {e}"))?;

    let http_status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| format!("unhealthy: HTTP {http_status} with unreadable body: {e}"))?;

    match check_body(&body) {
        Ok(backend) if http_status.is_success() => {
            println!("healthy ({backend} store)");
            Ok(())
        }
        Ok(_) => Err(format!("unhealthy: HTTP {http_status}").into()),
        Err(reason) => Err(format!("unhealthy: {reason}").into()),
    }
}
