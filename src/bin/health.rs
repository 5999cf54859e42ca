use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Url;

const DEFAULT_URL: &str = "http://127.0.0.1:8000/health";

/// Probes the worker's health endpoint, exiting non-zero unless it answers 2xx.
fn main() -> Result<()> {
    let url = env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string());
    let url = Url::parse(&url).with_context(|| format!("Invalid URL {url}"))?;

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let response = client.get(url.clone()).send()?;
    if !response.status().is_success() {
        bail!("Health check against {} failed with {}", url, response.status());
    }

    Ok(())
}
