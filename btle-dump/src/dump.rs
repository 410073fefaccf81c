//! Frame dumping
//!
//! Reads capture frames from hex lines or a SLIP byte stream, decodes them
//! with one [`CaptureSession`] and writes one JSON record per frame. Firmware
//! replies found in a SLIP stream get a record of their own.

use std::io::{BufRead, Read, Write};

use anyhow::{Context, Result};
use btle_protocol::{decode_response, to_capture_layout, CaptureSession, DecodedFrame, PacketId, SerialResponse, SlipCodec};
use serde::Serialize;
use tracing::{debug, warn};

use crate::settings::Settings;

/// Offset of the packet id in a serial packet
const SERIAL_PACKET_ID_POS: usize = 5;

const READ_CHUNK: usize = 4096;

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record<'a> {
    Frame {
        index: usize,
        frame: &'a DecodedFrame,
    },
    Error {
        index: usize,
        error: String,
        bytes: String,
    },
    Response {
        index: usize,
        response: &'a SerialResponse,
    },
}

/// Counters reported when a dump finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub decoded: usize,
    pub failed: usize,
    /// Firmware replies read from a SLIP stream
    pub responses: usize,
    /// Input that never reached the decoder (bad hex, non-packet serial events)
    pub skipped: usize,
}

/// Decodes frames in order and writes their JSON records
pub struct Dumper<W: Write> {
    session: CaptureSession,
    out: W,
    pretty: bool,
    report_errors: bool,
    index: usize,
    summary: Summary,
}

impl<W: Write> Dumper<W> {
    pub fn new(out: W, settings: &Settings) -> Self {
        Self {
            session: CaptureSession::new(),
            out,
            pretty: settings.pretty,
            report_errors: settings.report_errors,
            index: 0,
            summary: Summary::default(),
        }
    }

    /// Decode one capture frame and write its record
    pub fn frame(&mut self, frame: &[u8]) -> Result<()> {
        let index = self.index;
        self.index += 1;

        match self.session.decode(frame) {
            Ok(decoded) => {
                self.summary.decoded += 1;
                self.emit(&Record::Frame {
                    index,
                    frame: &decoded,
                })
            }
            Err(e) => {
                self.summary.failed += 1;
                if !self.report_errors {
                    debug!("Skipping frame {}: {}", index, e);
                    return Ok(());
                }
                self.emit(&Record::Error {
                    index,
                    error: e.to_string(),
                    bytes: hex::encode(frame),
                })
            }
        }
    }

    /// Write the record of a firmware reply
    pub fn response(&mut self, response: &SerialResponse) -> Result<()> {
        let index = self.index;
        self.index += 1;
        self.summary.responses += 1;
        self.emit(&Record::Response { index, response })
    }

    /// Count input that could not be turned into a frame
    pub fn skip(&mut self) {
        self.summary.skipped += 1;
    }

    fn emit(&mut self, record: &Record<'_>) -> Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.out, record)?;
        } else {
            serde_json::to_writer(&mut self.out, record)?;
        }
        writeln!(self.out).context("Failed to write output")?;
        Ok(())
    }

    /// Flush the output and return the counters
    pub fn finish(mut self) -> Result<Summary> {
        self.out.flush().context("Failed to flush output")?;
        Ok(self.summary)
    }
}

/// Dump frames given as hex, one per line
///
/// Whitespace inside a line is ignored; empty lines and lines starting with
/// `#` are skipped.
pub fn dump_hex<R: BufRead, W: Write>(input: R, dumper: &mut Dumper<W>) -> Result<()> {
    for (number, line) in input.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let digits: String = line.split_whitespace().collect();
        match hex::decode(&digits) {
            Ok(frame) => dumper.frame(&frame)?,
            Err(e) => {
                warn!("Skipping line {}: {}", number + 1, e);
                dumper.skip();
            }
        }
    }
    Ok(())
}

/// Dump sniffer packets from a raw SLIP-framed serial stream
///
/// Packets carrying a sniffed BLE packet are decoded as frames and firmware
/// replies as responses; other serial events are counted as skipped.
pub fn dump_slip<R: Read, W: Write>(mut input: R, board_id: u8, dumper: &mut Dumper<W>) -> Result<()> {
    let mut codec = SlipCodec::new();
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let read = input.read(&mut chunk).context("Failed to read input")?;
        if read == 0 {
            break;
        }
        codec.push_bytes(&chunk[..read]);

        while let Some(packet) = codec.next_frame() {
            let id = packet.get(SERIAL_PACKET_ID_POS).copied().map(PacketId::from);
            match id {
                Some(id) if id.carries_ble_packet() => {
                    dumper.frame(&to_capture_layout(board_id, &packet))?;
                }
                _ => match decode_response(&packet) {
                    Ok(Some(response)) => dumper.response(&response)?,
                    Ok(None) => {
                        debug!("Skipping serial packet {:?}", id);
                        dumper.skip();
                    }
                    Err(e) => {
                        warn!("Skipping serial packet {:?}: {}", id, e);
                        dumper.skip();
                    }
                },
            }
        }
    }
    Ok(())
}
