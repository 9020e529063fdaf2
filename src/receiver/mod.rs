//! Per-track RTP reception statistics and Receiver Report generation
//!
//! An [`RtcpReceiver`] consumes the RTP stream of one track (sequence
//! numbers and timestamps) together with the publisher's RTCP Sender
//! Reports, and periodically emits an RTCP Receiver Report through an
//! injected write callback. The arithmetic follows RFC 3550: extended
//! sequence numbers with cycle detection, cumulative loss saturating at
//! 24 bits, the Section A.8 interarrival-jitter estimator, and the
//! LSR/DLSR fields for sender-side round-trip computation.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::rngs::OsRng;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::packet::rtcp::{RtcpPacket, RtcpReceiverReport, RtcpReportBlock};
use crate::packet::RtpPacket;
use crate::RtpSsrc;

/// Callback that receives each outgoing Receiver Report
pub type RtcpWriteFn = Arc<dyn Fn(RtcpPacket) + Send + Sync>;

/// Cumulative loss counters are capped at 24 bits on the wire
const MAX_TOTAL_LOST: u32 = 0x00FF_FFFF;

/// Reorderings this close to the wrap point are not counted as a new cycle
const CYCLE_THRESHOLD: i32 = -0x0FFF;

/// Reception state for a single source, updated from both the RTP and the
/// RTCP sides and drained by the periodic report tick
struct ReceiverState {
    clock_rate: f64,

    // data from RTP packets
    first_rtp_received: bool,
    sequence_number_cycles: u16,
    last_sequence_number: Option<u16>,
    last_rtp_time: Option<(u32, Instant)>,
    total_lost: u32,
    total_lost_since_report: u32,
    total_since_report: u32,
    jitter: f64,

    // data from RTCP sender reports
    sender_ssrc: RtpSsrc,
    last_sender_report: Option<(u32, Instant)>,
}

impl ReceiverState {
    fn new(clock_rate: u32) -> Self {
        Self {
            clock_rate: clock_rate as f64,
            first_rtp_received: false,
            sequence_number_cycles: 0,
            last_sequence_number: None,
            last_rtp_time: None,
            total_lost: 0,
            total_lost_since_report: 0,
            total_since_report: 0,
            jitter: 0.0,
            sender_ssrc: 0,
            last_sender_report: None,
        }
    }

    /// Update reception statistics from one RTP packet
    ///
    /// `pts_equals_dts` gates the jitter estimator: only timestamps that
    /// represent presentation time are usable for transit-time variance.
    fn process_rtp(&mut self, ts: Instant, pkt: &RtpPacket, pts_equals_dts: bool) {
        let seq = pkt.header.sequence_number;

        let last = match self.last_sequence_number {
            None => {
                // first packet
                self.first_rtp_received = true;
                self.total_since_report = 1;
                self.last_sequence_number = Some(seq);

                if pts_equals_dts {
                    self.last_rtp_time = Some((pkt.header.timestamp, ts));
                }
                return;
            }
            Some(last) => last,
        };

        let diff = seq as i32 - last as i32;

        // wraparound past 0xFFFF
        if diff < CYCLE_THRESHOLD {
            self.sequence_number_cycles = self.sequence_number_cycles.wrapping_add(1);
        }

        // detect lost packets
        if seq != last.wrapping_add(1) {
            // the u16 cast deliberately wraps negative diffs, matching the
            // RFC's loss accounting under reordering
            let lost = (diff as u16).wrapping_sub(1) as u32;
            self.total_lost = (self.total_lost + lost).min(MAX_TOTAL_LOST);
            self.total_lost_since_report =
                (self.total_lost_since_report + lost).min(MAX_TOTAL_LOST);
        }

        self.total_since_report += diff as u16 as u32;
        self.last_sequence_number = Some(seq);

        if pts_equals_dts {
            if let Some((last_rtp, last_wall)) = self.last_rtp_time {
                // interarrival jitter, RFC 3550 Section A.8
                let d = ts.duration_since(last_wall).as_secs_f64() * self.clock_rate
                    - (pkt.header.timestamp as f64 - last_rtp as f64);
                self.jitter += (d.abs() - self.jitter) / 16.0;
            }

            self.last_rtp_time = Some((pkt.header.timestamp, ts));
        }
    }

    /// Extract SR timing data from an RTCP packet; non-SR kinds are ignored
    fn process_rtcp(&mut self, ts: Instant, pkt: &RtcpPacket) {
        if let RtcpPacket::SenderReport(sr) = pkt {
            self.sender_ssrc = sr.ssrc;
            self.last_sender_report = Some((sr.ntp_timestamp.middle_32(), ts));
        }
    }

    /// Build a Receiver Report, or `None` when one cannot be emitted yet
    ///
    /// A report requires at least one Sender Report and at least one RTP
    /// packet, and a non-empty reporting interval. Emitting resets the
    /// per-interval counters; the cumulative loss counter is kept.
    fn report(&mut self, ts: Instant, receiver_ssrc: RtpSsrc) -> Option<RtcpPacket> {
        let (sr_ntp, sr_wall) = self.last_sender_report?;
        let last_seq = self.last_sequence_number?;

        if self.total_since_report == 0 {
            return None;
        }

        let fraction_lost =
            (self.total_lost_since_report as u64 * 256 / self.total_since_report as u64) as u8;

        let delay = (ts.duration_since(sr_wall).as_secs_f64() * 65536.0) as u32;

        let mut rr = RtcpReceiverReport::new(receiver_ssrc);
        rr.add_report_block(RtcpReportBlock {
            ssrc: self.sender_ssrc,
            fraction_lost,
            total_lost: self.total_lost,
            extended_highest_seq: (self.sequence_number_cycles as u32) << 16
                | last_seq as u32,
            jitter: self.jitter as u32,
            last_sr: sr_ntp,
            delay_since_last_sr: delay,
        });

        self.total_lost_since_report = 0;
        self.total_since_report = 0;

        Some(RtcpPacket::ReceiverReport(rr))
    }
}

/// Generates periodic RTCP Receiver Reports for one incoming track
///
/// Construction spawns the report task; [`RtcpReceiver::close`] terminates
/// it and waits for it to finish. All three entry points (RTP update, RTCP
/// update, report tick) serialize on one internal mutex, so a report always
/// observes a consistent snapshot.
pub struct RtcpReceiver {
    receiver_ssrc: RtpSsrc,
    state: Arc<Mutex<ReceiverState>>,
    terminate_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RtcpReceiver {
    /// Create a receiver and start its periodic report task
    ///
    /// When `receiver_ssrc` is `None`, a random SSRC is drawn from the
    /// operating system RNG (collisions between receivers matter, so the
    /// general-purpose generator is not used).
    pub fn new(
        period: Duration,
        receiver_ssrc: Option<RtpSsrc>,
        clock_rate: u32,
        write_rtcp: RtcpWriteFn,
    ) -> Self {
        let receiver_ssrc = receiver_ssrc.unwrap_or_else(|| OsRng.gen());
        let state = Arc::new(Mutex::new(ReceiverState::new(clock_rate)));
        let (terminate_tx, mut terminate_rx) = watch::channel(false);

        let task_state = state.clone();
        let task = tokio::spawn(async move {
            // first tick one full period out, matching a plain ticker
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = task_state
                            .lock()
                            .unwrap()
                            .report(Instant::now(), receiver_ssrc);
                        if let Some(report) = report {
                            write_rtcp(report);
                        }
                    }
                    _ = terminate_rx.changed() => {
                        debug!("RTCP receiver report task terminating");
                        break;
                    }
                }
            }
        });

        Self {
            receiver_ssrc,
            state,
            terminate_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// The SSRC this receiver reports under
    pub fn ssrc(&self) -> RtpSsrc {
        self.receiver_ssrc
    }

    /// Whether at least one RTP packet has been processed
    pub fn first_rtp_received(&self) -> bool {
        self.state.lock().unwrap().first_rtp_received
    }

    /// Update statistics from one RTP packet received at `ts`
    pub fn process_rtp(&self, ts: Instant, pkt: &RtpPacket, pts_equals_dts: bool) {
        self.state.lock().unwrap().process_rtp(ts, pkt, pts_equals_dts);
    }

    /// Update statistics from one RTCP packet received at `ts`
    ///
    /// Only Sender Reports carry data this receiver needs; everything else
    /// passes through untouched.
    pub fn process_rtcp(&self, ts: Instant, pkt: &RtcpPacket) {
        self.state.lock().unwrap().process_rtcp(ts, pkt);
    }

    /// Stop the periodic report task and wait for it to exit
    pub async fn close(&self) {
        let _ = self.terminate_tx.send(true);
        let task = self.task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}
