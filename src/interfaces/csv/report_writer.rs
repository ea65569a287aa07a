use crate::domain::status::TransactionStatus;
use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;

/// One line of the final lifecycle report.
#[derive(Debug, Serialize)]
pub struct ReportRow {
    pub id: TransactionId,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub currency: String,
    pub channel: String,
    pub retries: u32,
    pub ledger_entries: usize,
    pub vendor_id: Option<Uuid>,
}

impl ReportRow {
    pub fn new(tx: &Transaction, ledger_entries: usize) -> Self {
        Self {
            id: tx.id,
            status: tx.status,
            amount: tx.amount,
            currency: tx.currency.clone(),
            channel: tx.channel.clone(),
            retries: tx.retry_count,
            ledger_entries,
            vendor_id: tx.vendor_id,
        }
    }
}

/// Writes report rows as CSV with a header line.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_rows<I>(&mut self, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = ReportRow>,
    {
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
