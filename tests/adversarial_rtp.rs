//! Adversarial Property-Based Tests for RTP Packet Handling
//!
//! # Attack Plan
//!
//! 1. **Malformed RTP Headers**: Truncated packets, wrong version, invalid CSRC counts,
//!    bogus extension lengths and padding that could cause out-of-bounds reads.
//!
//! 2. **Sequence Number Wraparound**: 65535 -> 0 transition must keep playout order.
//!
//! 3. **Memory Exhaustion**: Many packets pushed without consuming.
//!
//! 4. **Jitter Buffer Attacks**: Massive out-of-order delivery, late packet floods,
//!    duplicate packet storms, resets and end-of-talkspurt in the middle of it all.
//!
//! 5. **Redundant Audio**: Garbage RFC 2198 block headers.
//!
//! # Invariants
//!
//! - Header parsing never panics on any input and rejects non-v2 packets
//! - Jitter buffer never panics on any sequence of operations
//! - Buffered duration never exceeds the cap
//! - Delivered sequence numbers strictly increase within one playout run
//!   (a run ends at reset, end of talkspurt, or when the buffer drains)

use bytes::Bytes;
use proptest::prelude::*;
use std::time::{Duration, Instant};

use rtpjitter::rtp::header::{HeaderError, RtpHeader};
use rtpjitter::rtp::payload_type;
use rtpjitter::rtp::redundancy::RedPayload;
use rtpjitter::rtp::seq::seq_gt;
use rtpjitter::{JitterBuffer, PacketEnvelope, PopOutcome};

// ============================================================================
// ADVERSARIAL GENERATORS
// ============================================================================

/// Generate malformed RTP packets
fn malformed_rtp_packet() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        // Too short
        Just(vec![]),
        Just(vec![0x80]),
        Just(vec![0x80, 0x00, 0x00, 0x01]),
        Just(vec![0x80, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00]), // 11 bytes
        // Wrong version (0, 1, 3)
        Just(vec![0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x01]),
        Just(vec![0x40, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x01]),
        Just(vec![0xC0, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x01]),
        // Max CSRC count (15) but no CSRC data
        Just(vec![0x8F, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x01]),
        // Extension bit set but no extension data
        Just(vec![0x90, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x01]),
        // Extension with bogus length (claims 65535 32-bit words)
        Just(vec![
            0x90, 0x00, // V=2, X=1
            0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x01,
            0xBE, 0xDE, // Extension header ID
            0xFF, 0xFF, // Extension length = 65535 words
        ]),
        // Padding bit with a padding count larger than the packet
        Just(vec![0xA0, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x01, 0xFF]),
        // All bits set
        Just(vec![0xFF; 100]),
        // All zeros
        Just(vec![0x00; 100]),
    ]
}

/// Generate valid RTP packets with a G.711-sized payload
fn valid_rtp_packet() -> impl Strategy<Value = Vec<u8>> {
    (0u8..128u8, any::<u16>(), any::<u32>(), any::<u32>(), 0usize..400).prop_map(
        |(pt, seq, ts, ssrc, payload_size)| {
            let mut packet = vec![0x80, pt]; // V=2, PT
            packet.extend_from_slice(&seq.to_be_bytes());
            packet.extend_from_slice(&ts.to_be_bytes());
            packet.extend_from_slice(&ssrc.to_be_bytes());
            packet.extend(vec![0xFFu8; payload_size]);
            packet
        },
    )
}

/// Generate sequence numbers that test wraparound
fn wraparound_sequences() -> impl Strategy<Value = Vec<u16>> {
    prop_oneof![
        // Normal ascending
        Just((0..100).collect::<Vec<u16>>()),
        // Around wraparound point
        Just((65530..=65535).chain(0..10).collect::<Vec<u16>>()),
        // High numbers
        Just((65500..65535).collect::<Vec<u16>>()),
        // Random with wraparound
        proptest::collection::vec(any::<u16>(), 10..50),
    ]
}

#[derive(Debug, Clone)]
enum Op {
    Push(u16),
    Pop,
    Reset,
    Eot,
}

fn buffer_ops() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            6 => any::<u16>().prop_map(Op::Push),
            2 => (0u16..8).prop_map(Op::Push),
            4 => Just(Op::Pop),
            1 => Just(Op::Reset),
            1 => Just(Op::Eot),
        ],
        0..300,
    )
}

fn make_packet(seq: u16) -> PacketEnvelope {
    PacketEnvelope::new(seq, (seq as u32).wrapping_mul(160), payload_type::PCMU, 20, vec![0xFFu8; 160])
}

// ============================================================================
// INVARIANT: PARSERS NEVER PANIC
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10000))]

    #[test]
    fn prop_parse_rtp_header_never_panics(data in proptest::collection::vec(any::<u8>(), 0..200)) {
        let _ = RtpHeader::parse(&data);
        let _ = PacketEnvelope::parse(data, 8000, None);
    }

    #[test]
    fn prop_parse_rtp_header_malformed(data in malformed_rtp_packet()) {
        prop_assert!(RtpHeader::parse(&data).is_err());
    }

    #[test]
    fn prop_red_payload_never_panics(data in proptest::collection::vec(any::<u8>(), 0..100)) {
        let _ = RedPayload::parse(&Bytes::from(data));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Payload bounds always lie inside the packet
    #[test]
    fn prop_payload_bounds_inside_packet(data in proptest::collection::vec(any::<u8>(), 0..200)) {
        if let Ok(header) = RtpHeader::parse(&data) {
            prop_assert!(header.payload_offset <= header.payload_end);
            prop_assert!(header.payload_end <= data.len());
        }
    }

    /// Header fields survive parsing exactly
    #[test]
    fn prop_valid_packet_fields(data in valid_rtp_packet()) {
        let envelope = PacketEnvelope::parse(data.clone(), 8000, Some(20)).unwrap();
        prop_assert_eq!(envelope.payload_type(), data[1] & 0x7F);
        prop_assert_eq!(envelope.sequence(), u16::from_be_bytes([data[2], data[3]]));
        prop_assert_eq!(envelope.len(), data.len() - 12);
    }
}

// ============================================================================
// INVARIANT: VERSION CHECK
// ============================================================================

#[test]
fn test_rejects_all_non_v2_versions() {
    let base_packet = [0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x01];

    for version in [0u8, 1, 3] {
        let mut packet = base_packet;
        packet[0] = (version << 6) | (packet[0] & 0x3F);
        assert_eq!(
            RtpHeader::parse(&packet),
            Err(HeaderError::BadVersion(version)),
            "Version {} should be rejected",
            version
        );
    }
}

#[test]
fn test_extension_overrun_rejected() {
    let packet = [
        0x90, 0x00, // V=2, X=1
        0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x01,
        0xBE, 0xDE, // Extension ID
        0xFF, 0xFF, // Extension length = 65535 words (way more than packet)
        0x00,
    ];
    assert!(matches!(
        RtpHeader::parse(&packet),
        Err(HeaderError::ExtensionOverrun { .. })
    ));
}

#[test]
fn test_header_only_packet_is_rejected_by_buffer() {
    let packet = vec![0x80, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x01];
    let envelope = PacketEnvelope::parse(packet, 8000, None).unwrap();
    assert!(envelope.is_empty());

    let buffer = JitterBuffer::new(60, 8000);
    assert!(buffer.push(envelope).is_err());
    assert_eq!(buffer.depth(), 0);
    assert_eq!(buffer.stats().bad_packets, 1);
}

// ============================================================================
// JITTER BUFFER: NEVER PANICS, NEVER EXCEEDS CAP
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn prop_jitter_buffer_never_panics(ops in buffer_ops()) {
        let buffer = JitterBuffer::new(60, 8000);
        let start = Instant::now();

        for (i, op) in ops.iter().enumerate() {
            let now = start + Duration::from_millis(i as u64 * 5);
            match op {
                Op::Push(seq) => {
                    let _ = buffer.push_at(make_packet(*seq), now);
                }
                Op::Pop => {
                    let _ = buffer.pop_at(now);
                }
                Op::Reset => buffer.reset(),
                Op::Eot => buffer.eot_detected(),
            }
            prop_assert!(buffer.depth_ms() <= buffer.max_depth());
            prop_assert_eq!(buffer.depth_ms() as usize, buffer.depth() * 20);
        }
    }

    /// Deliveries strictly increase within a playout run, whatever arrives
    #[test]
    fn prop_deliveries_strictly_increase(ops in buffer_ops()) {
        let buffer = JitterBuffer::new(40, 8000);
        let start = Instant::now();
        let mut last: Option<u16> = None;

        for (i, op) in ops.iter().enumerate() {
            let now = start + Duration::from_millis(i as u64 * 20);
            match op {
                Op::Push(seq) => {
                    // A drained buffer re-anchors on whatever arrives next
                    if buffer.depth() == 0 {
                        last = None;
                    }
                    let _ = buffer.push_at(make_packet(*seq), now);
                }
                Op::Pop => {
                    if let PopOutcome::Delivered(packet) = buffer.pop_at(now) {
                        if packet.use_redundant_payload() {
                            continue;
                        }
                        let seq = packet.sequence();
                        if let Some(prev) = last {
                            prop_assert!(seq_gt(seq, prev), "{} delivered after {}", seq, prev);
                        }
                        last = Some(seq);
                    }
                }
                Op::Reset | Op::Eot => {
                    if matches!(op, Op::Reset) {
                        buffer.reset();
                    } else {
                        buffer.eot_detected();
                    }
                    last = None;
                }
            }
        }
    }

    /// Contiguous sequences come out complete and in order, across wraparound
    #[test]
    fn prop_wraparound_in_order(base in any::<u16>(), count in 1usize..40) {
        let buffer = JitterBuffer::new(20, 8000);
        let start = Instant::now();
        let mut delivered = Vec::new();

        for i in 0..count {
            let seq = base.wrapping_add(i as u16);
            buffer.push_at(make_packet(seq), start).unwrap();
            while let PopOutcome::Delivered(packet) = buffer.pop_at(start) {
                delivered.push(packet.sequence());
            }
        }

        let expected: Vec<u16> = (0..count).map(|i| base.wrapping_add(i as u16)).collect();
        prop_assert_eq!(delivered, expected);
    }

    #[test]
    fn prop_wraparound_sequences_never_exceed_cap(seqs in wraparound_sequences()) {
        let buffer = JitterBuffer::new(100, 8000);
        let start = Instant::now();
        for seq in seqs {
            let _ = buffer.push_at(make_packet(seq), start);
            prop_assert!(buffer.depth_ms() <= 200);
        }
    }
}

// ============================================================================
// TARGETED ATTACKS
// ============================================================================

#[test]
fn test_flood_without_consuming_stays_bounded() {
    let buffer = JitterBuffer::new(180, 8000);
    let start = Instant::now();
    for seq in 0..10_000u32 {
        let _ = buffer.push_at(make_packet(seq as u16), start);
    }
    assert_eq!(buffer.depth_ms(), 360);
    assert_eq!(buffer.depth(), 18);
    assert!(buffer.overflow_count() > 0);
}

#[test]
fn test_duplicate_storm() {
    let buffer = JitterBuffer::new(180, 8000);
    let start = Instant::now();
    buffer.push_at(make_packet(100), start).unwrap();
    buffer.push_at(make_packet(101), start).unwrap();
    for _ in 0..1000 {
        assert!(buffer.push_at(make_packet(100), start).is_err());
    }
    assert_eq!(buffer.depth(), 2);
    assert_eq!(buffer.stats().bad_packets, 1000);
}

#[test]
fn test_late_flood_after_playout() {
    let buffer = JitterBuffer::new(200, 8000);
    let start = Instant::now();
    for seq in 500..520 {
        buffer.push_at(make_packet(seq), start).unwrap();
    }
    for _ in 0..10 {
        assert!(buffer.pop_at(start).is_delivered());
    }
    // While audio is still queued, everything from the past is too late
    for seq in (0..510).step_by(7) {
        assert!(buffer.push_at(make_packet(seq), start).is_err());
    }
    assert_eq!(buffer.depth(), 10);
}

#[test]
fn test_stream_restart_after_drain_is_accepted() {
    let buffer = JitterBuffer::new(40, 8000);
    let start = Instant::now();
    for seq in 1000..1004 {
        buffer.push_at(make_packet(seq), start).unwrap();
    }
    while buffer.pop_at(start).is_delivered() {}
    assert_eq!(buffer.depth(), 0);

    // Sender restarted far behind; the drained buffer follows it
    for seq in 10..14 {
        buffer.push_at(make_packet(seq), start).unwrap();
    }
    let mut delivered = Vec::new();
    while let PopOutcome::Delivered(packet) = buffer.pop_at(start) {
        delivered.push(packet.sequence());
    }
    assert_eq!(delivered, vec![10, 11, 12, 13]);
}

#[test]
fn test_reverse_order_burst() {
    let buffer = JitterBuffer::new(100, 8000);
    let start = Instant::now();
    for seq in (0..5u16).rev() {
        let _ = buffer.push_at(make_packet(seq), start);
    }
    // Each arrival sits directly before the head, so every one is kept
    assert_eq!(buffer.depth(), 5);
    let mut delivered = Vec::new();
    while let PopOutcome::Delivered(packet) = buffer.pop_at(start) {
        delivered.push(packet.sequence());
    }
    assert_eq!(delivered, vec![0, 1, 2, 3, 4]);
}
