//! BLE Sniffer Protocol Library
//!
//! This crate decodes Bluetooth Low Energy link-layer packets captured by a
//! UART-attached air sniffer:
//!
//! - **UART framing**: legacy (`0xBEEF`) and current header layouts, length
//!   validation, per-packet metadata and inter-packet timing
//! - **Link layer**: access address, header bitfields, CRC
//! - **Advertising channel**: the seven advertising PDUs, CONNECT_REQ
//!   parameters and nested AD structures
//! - **Data channel**: LLID routing, upper-layer payload bytes and the
//!   fourteen LL control PDUs
//! - **Transport**: SLIP stream decoding, serial-to-capture conversion,
//!   firmware reply payloads and packet counter gap detection
//!
//! # Architecture
//!
//! Decoding is a pure function of the frame bytes and a small
//! [`TimingState`] carried from one frame to the next. Fixed-position reads
//! go through [`ByteReader`], so a short buffer becomes a
//! [`DecodeError::Truncated`] naming the field. Problems that do not prevent
//! decoding (length mismatches, bad CRC, unknown codes) are collected as
//! [`Finding`]s next to the best-effort result.
//!
//! # Example
//!
//! ```rust
//! use btle_protocol::{CaptureSession, Pdu};
//! use btle_protocol::ad::AdData;
//!
//! let frame = [
//!     0x00, 0x06, 0x1C, 0x01, 0x01, 0x00, 0x06, // UART header
//!     0x0A, 0x01, 0x25, 0x3C, 0x00, 0x00, 0xF4, 0x01, 0x00, 0x00, // BLE header
//!     0xD6, 0xBE, 0x89, 0x8E, 0x42, 0x09, // advertising AA, ADV_NONCONN_IND
//!     0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA, // AdvA
//!     0x02, 0x01, 0x06, // Flags
//!     0x00, 0x00, 0x00, // CRC
//! ];
//!
//! let mut session = CaptureSession::new();
//! let decoded = session.decode(&frame).unwrap();
//!
//! assert_eq!(decoded.metadata.rssi, -60);
//! if let Pdu::Advertising(pdu) = &decoded.packet.pdu {
//!     assert_eq!(pdu.adv_address().unwrap().to_string(), "AA:BB:CC:DD:EE:FF");
//!     assert!(matches!(pdu.ad_structures()[0].data, AdData::Flags(flags) if flags.br_edr_not_supported));
//! }
//! ```

pub mod ad;
pub mod address;
pub mod advertising;
pub mod control;
pub mod data;
pub mod dispatch;
pub mod error;
pub mod link_layer;
pub mod reader;
pub mod serial;
pub mod session;
pub mod slip;
pub mod uart;

pub use address::{DeviceAddress, Uuid128};
pub use advertising::{AdvertisingPdu, AdvertisingPduType};
pub use control::{ControlOpcode, LlControlPdu};
pub use data::{DataPdu, Llid};
pub use error::{DecodeError, Finding, Severity, SlipError};
pub use link_layer::{LinkLayerHeader, LinkLayerPacket, Pdu, ADVERTISING_ACCESS_ADDRESS};
pub use reader::ByteReader;
pub use serial::{decode_response, to_capture_layout, PacketId, SerialResponse};
pub use session::{decode_frame, CaptureSession, DecodedFrame, PacketHistory};
pub use slip::SlipCodec;
pub use uart::{FrameFormat, FrameMetadata, TimingState};
