use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use reqwest::{blocking::Client, redirect::Policy};

/// GET `url` and return the whole response body.
pub(crate) fn http_get(url: &str, timeout: Option<Duration>) -> Result<Arc<[u8]>> {
    let mut builder = Client::builder()
        .user_agent(concat!("geostat/", env!("CARGO_PKG_VERSION")))
        .redirect(Policy::limited(10));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder.build()?;

    let bytes = client.get(url)
        .send()
        .with_context(|| format!("GET {url}"))?
        .error_for_status()
        .with_context(|| format!("GET {url} returned error status"))?
        .bytes()
        .with_context(|| format!("read body of {url}"))?;

    Ok(Arc::from(bytes.as_ref()))
}
