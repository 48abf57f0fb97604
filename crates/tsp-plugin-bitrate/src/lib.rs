//! Reference bitrate-monitor processor plugin: a complete demonstration of
//! the plugin contract, including timeout-driven windowing, alarm-command
//! invocation, and packet labeling on band transitions.

use std::collections::VecDeque;
use std::process::Command;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tsp_pipeline::{
    EventCell, PacketMetadata, PacketStatus, PluginCommon, PluginError, ProcessorPlugin, ReportCell, ReportLevel,
    ReportSink, SharedReportSink, TimeoutAction, TsPacket,
};

const BUCKET_DURATION: Duration = Duration::from_secs(1);
const BITS_PER_PACKET: u64 = 1504; // 188 bytes * 8 bits

/// Event code raised whenever the monitored band state changes.
pub const EVENT_BAND_TRANSITION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BandState {
    Lower,
    InRange,
    Greater,
}

impl BandState {
    fn as_str(self) -> &'static str {
        match self {
            BandState::Lower => "lower",
            BandState::Greater => "greater",
            BandState::InRange => "normal",
        }
    }
}

struct Bucket {
    duration_ns: u64,
    total_packets: u64,
    non_null_packets: u64,
}

/// Configuration parsed from a stage's JSON argument string at
/// `configure()` time.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitrateMonitorConfig {
    /// `None` monitors the whole transport stream; `Some` restricts
    /// counting to these PIDs.
    #[serde(default)]
    pub pids: Option<Vec<u16>>,
    pub min_bitrate: u64,
    pub max_bitrate: u64,
    #[serde(default = "default_window_buckets")]
    pub window_buckets: usize,
    #[serde(default = "default_report_interval")]
    pub report_interval_buckets: u32,
    #[serde(default)]
    pub alarm_command: Option<String>,
    #[serde(default)]
    pub label_below: Option<u32>,
    #[serde(default)]
    pub label_above: Option<u32>,
    #[serde(default)]
    pub label_go_below: Option<u32>,
    #[serde(default)]
    pub label_go_above: Option<u32>,
    #[serde(default)]
    pub label_go_normal: Option<u32>,
}

fn default_window_buckets() -> usize {
    5
}

fn default_report_interval() -> u32 {
    10
}

impl Default for BitrateMonitorConfig {
    fn default() -> Self {
        Self {
            pids: None,
            min_bitrate: 0,
            max_bitrate: u64::MAX,
            window_buckets: default_window_buckets(),
            report_interval_buckets: default_report_interval(),
            alarm_command: None,
            label_below: None,
            label_above: None,
            label_go_below: None,
            label_go_above: None,
            label_go_normal: None,
        }
    }
}

pub struct BitrateMonitor {
    config: BitrateMonitorConfig,
    buckets: VecDeque<Bucket>,
    current_packets: u64,
    current_non_null: u64,
    last_tick: Option<Instant>,
    state: BandState,
    pending_entry_label: Option<BandState>,
    buckets_since_report: u32,
    total_packets_seen: u64,
    total_non_null_seen: u64,
    last_bitrate: u64,
    report: ReportCell,
    events: EventCell,
}

impl BitrateMonitor {
    pub fn new(config: BitrateMonitorConfig) -> Self {
        Self {
            config,
            buckets: VecDeque::new(),
            current_packets: 0,
            current_non_null: 0,
            last_tick: None,
            state: BandState::InRange,
            pending_entry_label: None,
            buckets_since_report: 0,
            total_packets_seen: 0,
            total_non_null_seen: 0,
            last_bitrate: 0,
            report: ReportCell::default(),
            events: EventCell::default(),
        }
    }

    fn counts_pid(&self, pid: u16) -> bool {
        match &self.config.pids {
            None => true,
            Some(pids) => pids.contains(&pid),
        }
    }

    fn first_pid_or_whole_ts(&self) -> u16 {
        self.config.pids.as_ref().and_then(|p| p.first().copied()).unwrap_or(0)
    }

    fn maybe_tick(&mut self) {
        let now = Instant::now();
        let elapsed = self.last_tick.map(|t| now.duration_since(t)).unwrap_or(BUCKET_DURATION);
        if elapsed >= BUCKET_DURATION {
            self.tick(now, elapsed);
        }
    }

    fn tick(&mut self, now: Instant, elapsed: Duration) {
        self.last_tick = Some(now);
        self.buckets.push_back(Bucket {
            duration_ns: elapsed.as_nanos() as u64,
            total_packets: self.current_packets,
            non_null_packets: self.current_non_null,
        });
        self.current_packets = 0;
        self.current_non_null = 0;
        while self.buckets.len() > self.config.window_buckets {
            self.buckets.pop_front();
        }

        let (total_dur, total_pkts, total_non_null) = self.buckets.iter().fold((0u64, 0u64, 0u64), |(d, p, n), b| {
            (d + b.duration_ns, p + b.total_packets, n + b.non_null_packets)
        });
        let bitrate = if total_dur == 0 {
            0
        } else {
            (total_pkts * BITS_PER_PACKET).saturating_mul(1_000_000_000) / total_dur
        };
        self.last_bitrate = bitrate;

        let new_state = if bitrate < self.config.min_bitrate {
            BandState::Lower
        } else if bitrate > self.config.max_bitrate {
            BandState::Greater
        } else {
            BandState::InRange
        };

        if new_state != self.state {
            self.report.0.report(
                ReportLevel::Warning,
                &format!(
                    "bitrate monitor: {} -> {} ({} b/s, {} non-null in window)",
                    self.state.as_str(),
                    new_state.as_str(),
                    bitrate,
                    total_non_null
                ),
            );
            self.events.signal(
                EVENT_BAND_TRANSITION,
                json!({
                    "from": self.state.as_str(),
                    "to": new_state.as_str(),
                    "bitrate": bitrate,
                    "windowNonNullPackets": total_non_null,
                }),
            );
            self.state = new_state;
            self.pending_entry_label = Some(new_state);
            self.invoke_alarm(bitrate);
        } else if matches!(self.state, BandState::Lower | BandState::Greater) {
            self.invoke_alarm(bitrate);
        }

        tracing::debug!(bitrate, state = self.state.as_str(), "bitrate monitor tick");

        self.buckets_since_report += 1;
        if self.buckets_since_report >= self.config.report_interval_buckets {
            self.buckets_since_report = 0;
            self.report.0.report(
                ReportLevel::Info,
                &format!(
                    "[{}] bitrate monitor: {bitrate} b/s, state={}",
                    chrono::Utc::now().to_rfc3339(),
                    self.state.as_str()
                ),
            );
        }
    }

    fn apply_state_labels(&mut self, meta: &mut PacketMetadata) {
        if let Some(entered) = self.pending_entry_label.take() {
            let label = match entered {
                BandState::Lower => self.config.label_go_below,
                BandState::Greater => self.config.label_go_above,
                BandState::InRange => self.config.label_go_normal,
            };
            if let Some(l) = label {
                meta.labels.set(l);
            }
        }
        let ongoing = match self.state {
            BandState::Lower => self.config.label_below,
            BandState::Greater => self.config.label_above,
            BandState::InRange => None,
        };
        if let Some(l) = ongoing {
            meta.labels.set(l);
        }
    }

    fn invoke_alarm(&self, bitrate: u64) {
        let Some(cmd) = self.config.alarm_command.clone() else {
            return;
        };
        let min = self.config.min_bitrate;
        let max = self.config.max_bitrate;
        let net: i64 = match self.state {
            BandState::Lower => bitrate as i64 - min as i64,
            BandState::Greater => bitrate as i64 - max as i64,
            BandState::InRange => 0,
        };
        let message = format!("bitrate {bitrate} b/s out of range [{min}, {max}]");
        let args = vec![
            message,
            self.first_pid_or_whole_ts().to_string(),
            self.state.as_str().to_string(),
            bitrate.to_string(),
            min.to_string(),
            max.to_string(),
            net.to_string(),
        ];
        std::thread::spawn(move || {
            let _ = Command::new(&cmd).args(&args).status();
        });
    }
}

impl PluginCommon for BitrateMonitor {
    fn reset_context(&mut self, _args: &[String]) -> Result<(), PluginError> {
        self.buckets.clear();
        self.current_packets = 0;
        self.current_non_null = 0;
        self.last_tick = None;
        self.buckets_since_report = 0;
        Ok(())
    }

    fn configure(&mut self, _name: &str, args: &[String]) -> Result<(), PluginError> {
        let Some(json) = args.first() else {
            return Ok(());
        };
        self.config = serde_json::from_str(json)
            .map_err(|e| PluginError::Configuration(format!("invalid bitrate monitor config: {e}")))?;
        Ok(())
    }

    fn handle_packet_timeout(&mut self) -> TimeoutAction {
        self.maybe_tick();
        TimeoutAction::Continue
    }

    fn stop(&mut self) -> Result<(), PluginError> {
        self.report.0.report(
            ReportLevel::Info,
            &format!(
                "bitrate monitor summary: {} packets seen ({} non-null), last bitrate {} b/s, final state {}",
                self.total_packets_seen,
                self.total_non_null_seen,
                self.last_bitrate,
                self.state.as_str()
            ),
        );
        Ok(())
    }

    fn report_slot(&mut self) -> &mut SharedReportSink {
        self.report.slot()
    }

    fn take_events(&mut self) -> Vec<(u32, serde_json::Value)> {
        self.events.drain()
    }
}

impl ProcessorPlugin for BitrateMonitor {
    fn process_packet(&mut self, packet: &mut TsPacket, metadata: &mut PacketMetadata) -> Result<PacketStatus, PluginError> {
        self.maybe_tick();

        self.total_packets_seen += 1;
        if !packet.is_null() {
            self.total_non_null_seen += 1;
        }
        if self.counts_pid(packet.pid()) {
            self.current_packets += 1;
            if !packet.is_null() {
                self.current_non_null += 1;
            }
        }

        self.apply_state_labels(metadata);
        Ok(PacketStatus::Keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn config(min: u64, max: u64) -> BitrateMonitorConfig {
        BitrateMonitorConfig {
            min_bitrate: min,
            max_bitrate: max,
            window_buckets: 1,
            report_interval_buckets: 1000,
            label_below: Some(0),
            label_above: Some(1),
            label_go_below: Some(2),
            label_go_above: Some(3),
            label_go_normal: Some(4),
            ..BitrateMonitorConfig::default()
        }
    }

    fn feed_one_second(monitor: &mut BitrateMonitor, packet_count: u64) -> PacketMetadata {
        let mut meta = PacketMetadata::default();
        let mut pkt = TsPacket::with_pid(0x0100, 0);
        for _ in 0..packet_count {
            monitor.process_packet(&mut pkt, &mut meta).unwrap();
        }
        thread::sleep(Duration::from_millis(1100));
        monitor.process_packet(&mut pkt, &mut meta).unwrap();
        meta
    }

    #[test]
    fn starts_in_range_with_no_labels() {
        let mut monitor = BitrateMonitor::new(config(1000, 5_000_000));
        let mut meta = PacketMetadata::default();
        let mut pkt = TsPacket::with_pid(0x0100, 0);
        monitor.process_packet(&mut pkt, &mut meta).unwrap();
        assert!(meta.labels.is_empty());
    }

    #[test]
    fn transition_to_below_labels_entry_and_ongoing() {
        let mut monitor = BitrateMonitor::new(config(10_000_000_000, u64::MAX));
        let meta = feed_one_second(&mut monitor, 10);
        assert!(meta.labels.test(0), "ongoing below label expected");
        assert!(meta.labels.test(2), "go-below entry label expected on first packet of new state");
    }

    #[test]
    fn stays_below_without_repeating_entry_label() {
        let mut monitor = BitrateMonitor::new(config(10_000_000_000, u64::MAX));
        let _ = feed_one_second(&mut monitor, 10);
        let mut meta2 = PacketMetadata::default();
        let mut pkt = TsPacket::with_pid(0x0100, 0);
        monitor.process_packet(&mut pkt, &mut meta2).unwrap();
        assert!(meta2.labels.test(0));
        assert!(!meta2.labels.test(2), "entry label should not repeat on subsequent packets");
    }
}
