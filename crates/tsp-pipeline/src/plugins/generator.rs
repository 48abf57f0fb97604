use crate::error::PluginError;
use crate::metadata::PacketMetadata;
use crate::packet::TsPacket;
use crate::plugin::{InputPlugin, PluginCommon, ReportCell};
use crate::report::SharedReportSink;

/// Produces a fixed or unbounded stream of packets on one PID, useful for
/// tests and demo binaries that need an Input stage without real capture
/// hardware.
pub struct GeneratorInput {
    pid: u16,
    total: Option<u64>,
    produced: u64,
    continuity: u8,
    report: ReportCell,
}

impl GeneratorInput {
    pub fn new(pid: u16, total: Option<u64>) -> Self {
        Self {
            pid,
            total,
            produced: 0,
            continuity: 0,
            report: ReportCell::default(),
        }
    }
}

impl PluginCommon for GeneratorInput {
    fn report_slot(&mut self) -> &mut SharedReportSink {
        self.report.slot()
    }
}

impl InputPlugin for GeneratorInput {
    fn receive(&mut self, packets: &mut [TsPacket], metadata: &mut [PacketMetadata]) -> Result<usize, PluginError> {
        let remaining = match self.total {
            Some(total) => total.saturating_sub(self.produced) as usize,
            None => packets.len(),
        };
        let n = packets.len().min(remaining);
        for i in 0..n {
            packets[i] = TsPacket::with_pid(self.pid, self.continuity);
            metadata[i] = PacketMetadata::default();
            self.continuity = self.continuity.wrapping_add(1) & 0x0F;
        }
        self.produced += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_after_total_produced() {
        let mut gen = GeneratorInput::new(0x0100, Some(5));
        let mut packets = vec![TsPacket::empty(); 3];
        let mut meta = vec![PacketMetadata::default(); 3];

        assert_eq!(gen.receive(&mut packets, &mut meta).unwrap(), 3);
        assert_eq!(gen.receive(&mut packets, &mut meta).unwrap(), 2);
        assert_eq!(gen.receive(&mut packets, &mut meta).unwrap(), 0);
    }

    #[test]
    fn continuity_counter_increments_and_wraps() {
        let mut gen = GeneratorInput::new(0x0100, None);
        let mut packets = vec![TsPacket::empty(); 17];
        let mut meta = vec![PacketMetadata::default(); 17];
        gen.receive(&mut packets, &mut meta).unwrap();
        assert_eq!(packets[0].continuity_counter(), 0);
        assert_eq!(packets[15].continuity_counter(), 15);
        assert_eq!(packets[16].continuity_counter(), 0);
    }
}
