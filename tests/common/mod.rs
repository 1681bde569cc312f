#![allow(dead_code)]

use std::{
    sync::{atomic::{AtomicUsize, Ordering}, Arc},
    thread,
    time::Duration,
};

use geostat::{
    dataset::{Fetch, Location},
    AreaUnit, Catalogue, CatalogueBuilder, Dataset, Granularity, LookupColumns, Vintage,
};

/// Postcode lookup in the column layout of the ONS postcode directory extract.
pub const LOOKUP: &str = "\
pcds,lsoa21cd,lsoa21nm,lad22cd,lad22nm
SE13 5AB,E01003189,Lewisham 001A,E09000023,Lewisham
SE13 6CD,E01003189,Lewisham 001A,E09000023,Lewisham
SE6 1AA,E01003190,Lewisham 001B,E09000023,Lewisham
SE6 2BB,E01003191,Lewisham 001C,E09000023,Lewisham
W6 9AA,E01001872,Hammersmith 001A,E09000013,Hammersmith
";

pub fn v2021() -> Vintage {
    Vintage::new("2021")
}

/// Four LSOAs in two LADs, plus a CCG sharing the name "Hammersmith" with a LAD.
pub fn catalogue() -> Catalogue {
    let lsoa_populations = Dataset::numeric("census", v2021(), Granularity::Lsoa, "population", [
        ("E01003189", 1500.0),
        ("E01003190", 1200.0),
        ("E01003191", 900.0),
        ("E01001872", 1000.0),
    ]).unwrap();
    let lad_populations = Dataset::numeric("census", v2021(), Granularity::Lad, "population", [
        ("E09000023", 300_000.0),
    ]).unwrap();

    let edition = CatalogueBuilder::from_lookup_csv(v2021(), LOOKUP.as_bytes(), &LookupColumns::default())
        .unwrap()
        .with_unit(AreaUnit::new(Granularity::Ccg, "E38000070").with_name("Hammersmith"))
        .populations_from(&lsoa_populations, "population").unwrap()
        .populations_from(&lad_populations, "population").unwrap()
        .build()
        .unwrap();
    Catalogue::new().with_vintage(edition)
}

/// Serves one payload for every location, optionally slowly, and counts calls.
pub struct Counting {
    payload: Vec<u8>,
    delay: Duration,
    calls: AtomicUsize,
}

impl Counting {
    pub fn new(payload: &str) -> Arc<Self> {
        Self::slow(payload, Duration::ZERO)
    }

    pub fn slow(payload: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self { payload: payload.as_bytes().to_vec(), delay, calls: AtomicUsize::new(0) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetch for Counting {
    fn fetch(&self, _: &Location, _: Option<Duration>) -> anyhow::Result<Arc<[u8]>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(Arc::from(self.payload.as_slice()))
    }
}

/// Always fails, as an unreachable host would.
pub struct Offline;

impl Fetch for Offline {
    fn fetch(&self, location: &Location, _: Option<Duration>) -> anyhow::Result<Arc<[u8]>> {
        anyhow::bail!("connection refused: {location}")
    }
}
