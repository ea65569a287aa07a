use crate::domain::transaction::NewTransaction;
use crate::error::{LifecycleError, Result};
use std::io::Read;

/// Reads initiation requests from a CSV source.
///
/// Expected header: `amount, currency, channel, success_rate, payload`, with
/// optional `vendor_id` and `service_context` columns. Optional columns may be
/// empty or missing. Whitespace is trimmed.
pub struct RequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RequestReader<R> {
    /// Creates a new `RequestReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes requests.
    pub fn requests(self) -> impl Iterator<Item = Result<NewTransaction>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LifecycleError::from))
    }
}
