//! Session, track and handler seam toward the RTSP signalling layer
//!
//! The signalling state machine (SETUP/PLAY/TEARDOWN) lives outside this
//! crate. What it hands over is a [`ServerSession`] carrying one
//! [`SessionTrack`] per set-up media track, plus a [`ServerHandler`] with
//! the application callbacks. UDP listeners look sessions up through the
//! client table and drive everything else from datagrams.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::packet::rtcp::RtcpPacket;
use crate::packet::RtpPacket;
use crate::receiver::{RtcpReceiver, RtcpWriteFn};
use crate::reorder::RtpReorderer;
use crate::{Error, RtpSsrc};

/// Codec-supplied predicate: does this packet's RTP timestamp represent a
/// presentation time equal to its decode time?
pub type PtsEqualsDtsFn = Arc<dyn Fn(&RtpPacket) -> bool + Send + Sync>;

/// Application callbacks invoked from the datagram path
///
/// Implementations must be cheap or hand off to their own executor: they
/// run on the listener reader task and delay subsequent datagrams.
pub trait ServerHandler: Send + Sync {
    /// An ordered RTP packet is ready for the application
    fn on_packet_rtp(
        &self,
        session: &Arc<ServerSession>,
        track_id: usize,
        packet: &RtpPacket,
        pts_equals_dts: bool,
    );

    /// An RTCP packet arrived (any kind, publisher or reader direction)
    fn on_packet_rtcp(
        &self,
        _session: &Arc<ServerSession>,
        _track_id: usize,
        _packet: &RtcpPacket,
    ) {
    }

    /// A datagram could not be turned into packets, or packets were lost
    ///
    /// Never fatal: the listener keeps running.
    fn on_decode_error(&self, _session: &Arc<ServerSession>, _error: &Error) {}
}

/// One set-up media track of a session
pub struct SessionTrack {
    id: usize,
    reorderer: Mutex<RtpReorderer>,
    rtcp_receiver: RtcpReceiver,
    pts_equals_dts: PtsEqualsDtsFn,
}

impl SessionTrack {
    /// Create a track and start its RTCP receiver
    ///
    /// `write_rtcp` receives the periodic Receiver Reports; the RTCP
    /// listener's write path is the usual implementation.
    pub fn new(
        id: usize,
        clock_rate: u32,
        report_period: Duration,
        receiver_ssrc: Option<RtpSsrc>,
        pts_equals_dts: PtsEqualsDtsFn,
        write_rtcp: RtcpWriteFn,
    ) -> Self {
        Self {
            id,
            reorderer: Mutex::new(RtpReorderer::new()),
            rtcp_receiver: RtcpReceiver::new(report_period, receiver_ssrc, clock_rate, write_rtcp),
            pts_equals_dts,
        }
    }

    /// Track identifier within its session
    pub fn id(&self) -> usize {
        self.id
    }

    /// The track's RTCP receiver
    pub fn rtcp_receiver(&self) -> &RtcpReceiver {
        &self.rtcp_receiver
    }

    /// Run one packet through the track's reorderer
    pub fn reorder(&self, pkt: RtpPacket) -> (Vec<RtpPacket>, u64) {
        self.reorderer.lock().unwrap().process(pkt)
    }

    /// Evaluate the codec predicate for one packet
    pub fn pts_equals_dts(&self, pkt: &RtpPacket) -> bool {
        (self.pts_equals_dts)(pkt)
    }
}

/// A live RTSP session as seen by the media plane
///
/// Owns its tracks; referenced (via `Arc`) from client-table entries. The
/// signalling layer must remove those entries before dropping its last
/// reference.
pub struct ServerSession {
    id: u64,
    handler: Arc<dyn ServerHandler>,
    tracks: Vec<SessionTrack>,

    /// Unix time of the last accepted datagram, for lock-free liveness checks
    last_packet_time: AtomicI64,
}

impl ServerSession {
    /// Create a session from its set-up tracks
    pub fn new(id: u64, handler: Arc<dyn ServerHandler>, tracks: Vec<SessionTrack>) -> Self {
        Self {
            id,
            handler,
            tracks,
            last_packet_time: AtomicI64::new(unix_now()),
        }
    }

    /// Session identifier assigned by the signalling layer
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The application handler for this session
    pub fn handler(&self) -> &Arc<dyn ServerHandler> {
        &self.handler
    }

    /// Look up a track by id
    pub fn track(&self, track_id: usize) -> Option<&SessionTrack> {
        self.tracks.iter().find(|t| t.id == track_id)
    }

    /// Record that a datagram for this session was accepted just now
    pub fn stamp_packet_time(&self) {
        self.last_packet_time.store(unix_now(), Ordering::Relaxed);
    }

    /// Unix time of the last accepted datagram
    ///
    /// An idle-session reaper can poll this without taking any lock.
    pub fn last_packet_time(&self) -> i64 {
        self.last_packet_time.load(Ordering::Relaxed)
    }

    /// Stop the RTCP receivers of every track and wait for them
    pub async fn close(&self) {
        for track in &self.tracks {
            track.rtcp_receiver.close().await;
        }
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    struct NopHandler;

    impl ServerHandler for NopHandler {
        fn on_packet_rtp(
            &self,
            _session: &Arc<ServerSession>,
            _track_id: usize,
            _packet: &RtpPacket,
            _pts_equals_dts: bool,
        ) {
        }
    }

    fn track(id: usize) -> SessionTrack {
        SessionTrack::new(
            id,
            90000,
            Duration::from_secs(5),
            None,
            Arc::new(|_| true),
            Arc::new(|_| {}),
        )
    }

    #[tokio::test]
    async fn test_track_lookup() {
        let session = ServerSession::new(7, Arc::new(NopHandler), vec![track(0), track(1)]);

        assert_eq!(session.id(), 7);
        assert_eq!(session.track(1).unwrap().id(), 1);
        assert!(session.track(2).is_none());

        session.close().await;
    }

    #[tokio::test]
    async fn test_liveness_stamp_advances() {
        let session = ServerSession::new(1, Arc::new(NopHandler), vec![]);

        let before = session.last_packet_time();
        session.stamp_packet_time();
        assert!(session.last_packet_time() >= before);

        session.close().await;
    }

    #[tokio::test]
    async fn test_track_reorder_and_predicate() {
        let t = track(0);
        let pkt = RtpPacket::new_with_payload(96, 5, 0, 1, Bytes::from_static(b"x"));

        assert!(t.pts_equals_dts(&pkt));
        let (delivered, missing) = t.reorder(pkt);
        assert_eq!(delivered.len(), 1);
        assert_eq!(missing, 0);

        t.rtcp_receiver().close().await;
    }
}
