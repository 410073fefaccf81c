//! Whole-frame decoding
//!
//! [`decode_frame`] runs a captured frame through the UART, link-layer and
//! PDU decoders. The only state carried between frames is the
//! [`TimingState`]; [`CaptureSession`] owns one for callers decoding a single
//! stream in order, together with a [`PacketHistory`] that flags gaps in the
//! sniffer's packet counter.

use tracing::{debug, info, warn};

use crate::error::{DecodeError, Finding, Severity};
use crate::link_layer::{decode_link_layer, LinkLayerPacket};
use crate::uart::{decode_transport, FrameFormat, FrameMetadata, TimingState};

/// Fully decoded capture frame
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecodedFrame {
    pub format: FrameFormat,
    pub metadata: FrameMetadata,
    pub packet: LinkLayerPacket,
    /// Non-fatal problems found while decoding, in the order they were seen
    pub findings: Vec<Finding>,
}

impl DecodedFrame {
    /// Returns true if any finding has error severity
    pub fn has_errors(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.severity() == Severity::Error)
    }
}

/// Decode one captured frame, threading the timing accumulator explicitly
pub fn decode_frame(frame: &[u8], timing: &mut TimingState) -> Result<DecodedFrame, DecodeError> {
    let mut findings = Vec::new();

    let transport = decode_transport(frame, timing, &mut findings)?;
    let packet = match decode_link_layer(&transport.ble_packet, &mut findings) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("Failed to decode BLE packet: {}", e);
            return Err(e);
        }
    };

    debug!(
        "Decoded {:?} frame: channel {}, access address 0x{:08X}, {} findings",
        transport.format,
        transport.metadata.channel,
        packet.header.access_address,
        findings.len()
    );

    Ok(DecodedFrame {
        format: transport.format,
        metadata: transport.metadata,
        packet,
        findings,
    })
}

/// Last UART packet counter seen on a stream
///
/// A counter of 0 on the previous frame restarts tracking, since the
/// sniffer resets its counter when it reboots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketHistory {
    last_counter: Option<u16>,
}

impl PacketHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous frame
    pub fn reset(&mut self) {
        self.last_counter = None;
    }

    /// Counter of the previously recorded frame
    pub fn last_counter(&self) -> Option<u16> {
        self.last_counter
    }

    /// Record `counter`, returning a finding if frames were skipped
    pub fn record(&mut self, counter: u16) -> Option<Finding> {
        let gap = match self.last_counter {
            Some(last) if last != 0 && counter != last.wrapping_add(1) => Some(Finding::PacketsLost {
                expected: last.wrapping_add(1),
                received: counter,
            }),
            _ => None,
        };
        self.last_counter = Some(counter);
        gap
    }
}

/// Decoder for one capture stream
#[derive(Debug, Clone, Default)]
pub struct CaptureSession {
    timing: TimingState,
    history: PacketHistory,
}

impl CaptureSession {
    /// Create a session with no previous packet
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new capture
    pub fn reset(&mut self) {
        self.timing.reset();
        self.history.reset();
    }

    /// Current timing state
    pub fn timing(&self) -> TimingState {
        self.timing
    }

    /// Packet counter history
    pub fn history(&self) -> PacketHistory {
        self.history
    }

    /// Decode the next frame of this capture
    ///
    /// Frames that decode are checked against the previous packet counter;
    /// a gap adds [`Finding::PacketsLost`].
    pub fn decode(&mut self, frame: &[u8]) -> Result<DecodedFrame, DecodeError> {
        let mut decoded = decode_frame(frame, &mut self.timing)?;
        if let Some(gap) = self.history.record(decoded.metadata.packet_counter) {
            info!("{}", gap);
            decoded.findings.push(gap);
        }
        Ok(decoded)
    }
}
