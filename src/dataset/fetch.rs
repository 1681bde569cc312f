use std::{fmt, path::PathBuf, sync::{mpsc, Arc}, thread, time::Duration};

use anyhow::Context;

use crate::error::{GeoError, Result};

/// Where raw bytes come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Url(String),
    Path(PathBuf),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Url(url) => f.write_str(url),
            Location::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Producer of raw payloads. The loader only depends on this trait, so transports
/// (and test doubles that count calls) can be swapped in.
pub trait Fetch: Send + Sync {
    fn fetch(&self, location: &Location, timeout: Option<Duration>) -> anyhow::Result<Arc<[u8]>>;
}

/// Reads local files and, with the `download` feature, performs blocking HTTP GETs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFetch;

impl Fetch for DefaultFetch {
    fn fetch(&self, location: &Location, timeout: Option<Duration>) -> anyhow::Result<Arc<[u8]>> {
        match location {
            Location::Path(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Ok(Arc::from(bytes))
            }
            #[cfg(feature = "download")]
            Location::Url(url) => crate::common::http_get(url, timeout),
            #[cfg(not(feature = "download"))]
            Location::Url(url) => {
                let _ = timeout;
                anyhow::bail!("cannot fetch {url}: built without the `download` feature")
            }
        }
    }
}

/// Run one fetch, giving up after `timeout`. The worker is left to finish on its own;
/// its result is discarded, so no partial payload is ever observed.
pub(crate) fn fetch_with_timeout(
    fetcher: Arc<dyn Fetch>,
    location: Location,
    timeout: Option<Duration>,
    spec: &str,
) -> Result<Arc<[u8]>> {
    let Some(limit) = timeout else {
        return fetcher.fetch(&location, None)
            .map_err(|err| GeoError::from_source_error(spec, err));
    };

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("geostat-fetch".into())
        .spawn(move || {
            let _ = tx.send(fetcher.fetch(&location, Some(limit)));
        })
        .map_err(|err| GeoError::unavailable(spec, format!("cannot start fetch worker: {err}")))?;

    match rx.recv_timeout(limit) {
        Ok(result) => result.map_err(|err| GeoError::from_source_error(spec, err)),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(GeoError::Timeout { spec: spec.to_string(), timeout: limit }),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(GeoError::unavailable(spec, "fetch worker exited without a result")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slow(Duration);

    impl Fetch for Slow {
        fn fetch(&self, _: &Location, _: Option<Duration>) -> anyhow::Result<Arc<[u8]>> {
            thread::sleep(self.0);
            Ok(Arc::from(&b"code,n\nA,1\n"[..]))
        }
    }

    #[test]
    fn slow_fetch_times_out() {
        let err = fetch_with_timeout(
            Arc::new(Slow(Duration::from_millis(500))),
            Location::Url("https://example.invalid/x.csv".into()),
            Some(Duration::from_millis(20)),
            "source slow",
        ).unwrap_err();
        assert!(matches!(err, GeoError::Timeout { .. }));
    }

    #[test]
    fn fast_fetch_completes() {
        let bytes = fetch_with_timeout(
            Arc::new(Slow(Duration::ZERO)),
            Location::Url("https://example.invalid/x.csv".into()),
            Some(Duration::from_secs(5)),
            "source fast",
        ).unwrap();
        assert!(bytes.starts_with(b"code"));
    }

    #[test]
    fn missing_file_is_unavailable() {
        let err = fetch_with_timeout(
            Arc::new(DefaultFetch),
            Location::Path("/definitely/not/here.csv".into()),
            None,
            "file here.csv",
        ).unwrap_err();
        assert!(matches!(err, GeoError::SourceUnavailable { .. }));
    }
}
