//! Property-based tests for the framelink wire format and fragment bitmap.

use bytes::BytesMut;
use proptest::prelude::*;

use framelink_transport::bitmap::{AckBitmap, MAX_FRAGMENTS};
use framelink_transport::wire::{FragmentHeader, FrameAck, ACK_PACKET_SIZE, DATA_HEADER_SIZE};

proptest! {
    // ─── Fragment Header ────────────────────────────────────────────────

    #[test]
    fn header_roundtrip(
        frame_number in any::<u32>(),
        flush in any::<bool>(),
        fragment_number in any::<u8>(),
        fragments_per_frame in any::<u8>(),
    ) {
        let header = FragmentHeader::new(frame_number, fragment_number, fragments_per_frame)
            .with_flush(flush);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        prop_assert_eq!(buf.len(), DATA_HEADER_SIZE);

        let decoded = FragmentHeader::decode(&mut buf.freeze()).unwrap();
        prop_assert_eq!(decoded, header);
        prop_assert_eq!(decoded.is_flush(), flush);
    }

    #[test]
    fn header_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..32)) {
        let mut buf = &bytes[..];
        let _ = FragmentHeader::decode(&mut buf);
    }

    // ─── Frame Ack ──────────────────────────────────────────────────────

    #[test]
    fn ack_roundtrip(frame_number in any::<u16>(), high in any::<u64>(), low in any::<u64>()) {
        let ack = FrameAck { frame_number, high_packets_ack: high, low_packets_ack: low };
        let mut buf = BytesMut::new();
        ack.encode(&mut buf);
        prop_assert_eq!(buf.len(), ACK_PACKET_SIZE);
        prop_assert_eq!(FrameAck::decode(&mut buf.freeze()).unwrap(), ack);
    }

    #[test]
    fn ack_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let mut buf = &bytes[..];
        let _ = FrameAck::decode(&mut buf);
    }

    #[test]
    fn ack_frame_match_is_truncation(core_frame in any::<u32>()) {
        let ack = FrameAck {
            frame_number: core_frame as u16,
            high_packets_ack: 0,
            low_packets_ack: 0,
        };
        prop_assert!(ack.matches_frame(core_frame));
    }

    // ─── Bitmap ─────────────────────────────────────────────────────────

    #[test]
    fn merged_ack_bits_are_visible(high in any::<u64>(), low in any::<u64>()) {
        let mut bitmap = AckBitmap::new(1);
        bitmap.merge(high, low);
        let expected = (high.count_ones() + low.count_ones()) as usize;
        prop_assert_eq!(bitmap.count_set(MAX_FRAGMENTS), expected);
        for i in 0..64 {
            prop_assert_eq!(bitmap.test(i), low & (1u64 << i) != 0);
            prop_assert_eq!(bitmap.test(64 + i), high & (1u64 << i) != 0);
        }
    }

    #[test]
    fn all_set_matches_count(n in 1usize..=MAX_FRAGMENTS, high in any::<u64>(), low in any::<u64>()) {
        let mut bitmap = AckBitmap::new(1);
        bitmap.merge(high, low);
        prop_assert_eq!(bitmap.all_set(n), bitmap.count_set(n) == n);
    }
}
