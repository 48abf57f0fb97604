use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::PluginError;
use crate::metadata::PacketMetadata;
use crate::packet::TsPacket;
use crate::plugin::{OutputPlugin, PluginCommon, ReportCell};
use crate::report::SharedReportSink;

/// Counts packets it would have written, skipping ones a processor marked
/// invalid (dropped). Used wherever tests need an Output stage without
/// opening a real file or socket.
pub struct CountingOutput {
    sent: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
    report: ReportCell,
}

impl CountingOutput {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(AtomicU64::new(0)),
            skipped: Arc::new(AtomicU64::new(0)),
            report: ReportCell::default(),
        }
    }

    pub fn sent_counter(&self) -> Arc<AtomicU64> {
        self.sent.clone()
    }

    pub fn skipped_counter(&self) -> Arc<AtomicU64> {
        self.skipped.clone()
    }
}

impl Default for CountingOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginCommon for CountingOutput {
    fn report_slot(&mut self) -> &mut SharedReportSink {
        self.report.slot()
    }
}

impl OutputPlugin for CountingOutput {
    fn send(&mut self, packets: &[TsPacket], metadata: &[PacketMetadata]) -> Result<bool, PluginError> {
        for (_, meta) in packets.iter().zip(metadata.iter()) {
            if meta.valid {
                self.sent.fetch_add(1, Ordering::Relaxed);
            } else {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn counts_valid_and_invalid_separately() {
        let mut sink = CountingOutput::new();
        let sent = sink.sent_counter();
        let skipped = sink.skipped_counter();

        let packets = vec![TsPacket::with_pid(0x0100, 0); 3];
        let mut metas = vec![PacketMetadata::default(); 3];
        metas[1].valid = false;

        assert!(sink.send(&packets, &metas).unwrap());
        assert_eq!(sent.load(Ordering::Relaxed), 2);
        assert_eq!(skipped.load(Ordering::Relaxed), 1);
    }
}
