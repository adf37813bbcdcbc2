//! # Framelink Wire Format
//!
//! Fixed-layout datagram headers shared with the receiver. All multi-byte
//! fields are network byte order.
//!
//! ## Data fragment (sent by the core)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Frame Number (32)                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   Flags (8)   | Fragment (8)  | Per-Frame (8) |  Payload ...   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! ## Ack packet (received by the core)
//!
//! `frame_number: u16`, then the high and low 64-bit halves of the
//! 128-bit fragment bitmap — 18 bytes exactly. Bit `i` of the
//! concatenated field is set iff fragment `i` was received.

use bytes::{Buf, BufMut, Bytes, BytesMut};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Encoded size of a data fragment header.
pub const DATA_HEADER_SIZE: usize = 7;

/// Exact wire size of an ack packet.
pub const ACK_PACKET_SIZE: usize = 18;

/// Flags bit 0: this frame preempted the queue (flush frame).
pub const FLAG_FLUSH_FRAME: u8 = 0x01;

// ─── Fragment Header ────────────────────────────────────────────────────────

/// Header prepended to every outgoing fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Frame this fragment belongs to.
    pub frame_number: u32,
    /// Frame flags (bit 0 = flush frame).
    pub frame_flags: u8,
    /// Index of this fragment within the frame.
    pub fragment_number: u8,
    /// Total fragments in the frame.
    pub fragments_per_frame: u8,
}

impl FragmentHeader {
    /// Header for fragment `fragment_number` of `frame_number`.
    pub fn new(frame_number: u32, fragment_number: u8, fragments_per_frame: u8) -> Self {
        FragmentHeader {
            frame_number,
            frame_flags: 0,
            fragment_number,
            fragments_per_frame,
        }
    }

    /// Mark the frame as a flush (queue-preempting) frame.
    pub fn with_flush(mut self, flush: bool) -> Self {
        if flush {
            self.frame_flags |= FLAG_FLUSH_FRAME;
        }
        self
    }

    /// Whether the flush flag is set.
    pub fn is_flush(&self) -> bool {
        self.frame_flags & FLAG_FLUSH_FRAME != 0
    }

    /// Encode the header into a buffer.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.frame_number);
        buf.put_u8(self.frame_flags);
        buf.put_u8(self.fragment_number);
        buf.put_u8(self.fragments_per_frame);
    }

    /// Decode a header. Returns `None` if the buffer is too short.
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < DATA_HEADER_SIZE {
            return None;
        }
        Some(FragmentHeader {
            frame_number: buf.get_u32(),
            frame_flags: buf.get_u8(),
            fragment_number: buf.get_u8(),
            fragments_per_frame: buf.get_u8(),
        })
    }
}

/// Assemble a complete fragment datagram: header followed by payload bytes.
pub fn encode_fragment(header: &FragmentHeader, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(DATA_HEADER_SIZE + payload.len());
    header.encode(&mut buf);
    buf.put_slice(payload);
    buf.freeze()
}

// ─── Ack Packet ─────────────────────────────────────────────────────────────

/// Per-frame fragment acknowledgement from the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameAck {
    /// Low 16 bits of the acknowledged frame number.
    pub frame_number: u16,
    /// Bits 64..127 of the fragment bitmap.
    pub high_packets_ack: u64,
    /// Bits 0..63 of the fragment bitmap.
    pub low_packets_ack: u64,
}

impl FrameAck {
    /// Encode into a buffer (receiver side / tests).
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.frame_number);
        buf.put_u64(self.high_packets_ack);
        buf.put_u64(self.low_packets_ack);
    }

    /// Decode from a buffer. Returns `None` if the buffer is too short.
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < ACK_PACKET_SIZE {
            return None;
        }
        Some(FrameAck {
            frame_number: buf.get_u16(),
            high_packets_ack: buf.get_u64(),
            low_packets_ack: buf.get_u64(),
        })
    }

    /// Whether this ack refers to the given 32-bit core frame number.
    ///
    /// The wire field is 16-bit; the comparison truncates consistently
    /// with the receiver.
    pub fn matches_frame(&self, frame_number: u32) -> bool {
        self.frame_number == frame_number as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── Fragment Header ────────────────────────────────────────────────

    #[test]
    fn header_encodes_seven_network_order_bytes() {
        let header = FragmentHeader::new(0x01020304, 2, 5).with_flush(true);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(&buf[..], &[0x01, 0x02, 0x03, 0x04, 0x01, 2, 5]);
    }

    #[test]
    fn header_round_trips() {
        let header = FragmentHeader::new(42, 7, 9).with_flush(true);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        let decoded = FragmentHeader::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.is_flush());
    }

    #[test]
    fn header_decode_rejects_short_buffer() {
        let mut buf = Bytes::from_static(&[0, 0, 0, 1, 0, 0]);
        assert!(FragmentHeader::decode(&mut buf).is_none());
    }

    #[test]
    fn flush_flag_defaults_off() {
        let header = FragmentHeader::new(1, 0, 1);
        assert!(!header.is_flush());
        assert_eq!(header.with_flush(false).frame_flags, 0);
    }

    #[test]
    fn fragment_datagram_carries_payload() {
        let header = FragmentHeader::new(3, 1, 2);
        let datagram = encode_fragment(&header, b"payload");
        assert_eq!(datagram.len(), DATA_HEADER_SIZE + 7);
        assert_eq!(&datagram[DATA_HEADER_SIZE..], b"payload");
    }

    // ─── Frame Ack ──────────────────────────────────────────────────────

    #[test]
    fn ack_round_trips() {
        let ack = FrameAck {
            frame_number: 0xBEEF,
            high_packets_ack: 0x0102_0304_0506_0708,
            low_packets_ack: u64::MAX,
        };
        let mut buf = BytesMut::new();
        ack.encode(&mut buf);
        assert_eq!(buf.len(), ACK_PACKET_SIZE);
        let decoded = FrameAck::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, ack);
    }

    #[test]
    fn ack_decode_rejects_short_buffer() {
        let mut buf = Bytes::from_static(&[0u8; ACK_PACKET_SIZE - 1]);
        assert!(FrameAck::decode(&mut buf).is_none());
    }

    #[test]
    fn ack_frame_match_truncates_to_u16() {
        let ack = FrameAck {
            frame_number: 0x0001,
            high_packets_ack: 0,
            low_packets_ack: 1,
        };
        assert!(ack.matches_frame(1));
        assert!(ack.matches_frame(0x0001_0001), "match compares low 16 bits");
        assert!(!ack.matches_frame(2));
    }
}
