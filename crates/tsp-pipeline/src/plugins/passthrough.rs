use crate::error::PluginError;
use crate::metadata::PacketMetadata;
use crate::packet::TsPacket;
use crate::plugin::{PacketStatus, PluginCommon, ProcessorPlugin, ReportCell};
use crate::report::SharedReportSink;

/// Passes every packet through unchanged, optionally dropping null packets.
/// Used as filler middle stages in tests where the processor's own logic
/// isn't what's under test.
pub struct PassthroughProcessor {
    drop_null: bool,
    report: ReportCell,
}

impl PassthroughProcessor {
    pub fn new(drop_null: bool) -> Self {
        Self {
            drop_null,
            report: ReportCell::default(),
        }
    }
}

impl PluginCommon for PassthroughProcessor {
    fn report_slot(&mut self) -> &mut SharedReportSink {
        self.report.slot()
    }
}

impl ProcessorPlugin for PassthroughProcessor {
    fn process_packet(&mut self, packet: &mut TsPacket, _metadata: &mut PacketMetadata) -> Result<PacketStatus, PluginError> {
        if self.drop_null && packet.is_null() {
            return Ok(PacketStatus::Drop);
        }
        Ok(PacketStatus::Keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_non_null_packets() {
        let mut proc = PassthroughProcessor::new(true);
        let mut pkt = TsPacket::with_pid(0x0200, 0);
        let mut meta = PacketMetadata::default();
        assert_eq!(proc.process_packet(&mut pkt, &mut meta).unwrap(), PacketStatus::Keep);
    }

    #[test]
    fn drops_null_packets_when_configured() {
        let mut proc = PassthroughProcessor::new(true);
        let mut pkt = TsPacket::null_packet();
        let mut meta = PacketMetadata::default();
        assert_eq!(proc.process_packet(&mut pkt, &mut meta).unwrap(), PacketStatus::Drop);
    }
}
