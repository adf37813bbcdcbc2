//! Loopback demo: a sender wired to an in-memory transport whose
//! "receiver" half decodes fragments, tracks them per frame, and acks
//! back over the ack channel.
//!
//! Run with `RUST_LOG=framelink_transport=debug cargo run --example loopback`.

use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use framelink_transport::bitmap::AckBitmap;
use framelink_transport::config::SenderConfig;
use framelink_transport::net::{ChannelId, NetworkManager, RecvError, SendCompletion, SendStatus};
use framelink_transport::queue::{FrameCallback, FrameStatus, PendingFrame};
use framelink_transport::sender::FrameSender;
use framelink_transport::wire::{FragmentHeader, FrameAck};

const DATA_CHANNEL: ChannelId = 0;
const ACK_CHANNEL: ChannelId = 1;

/// In-memory transport: fragments loop straight back as acks.
struct Loopback {
    acks: Mutex<Vec<Vec<u8>>>,
    received: Mutex<HashMap<u32, AckBitmap>>,
}

impl Loopback {
    fn new() -> Self {
        Loopback {
            acks: Mutex::new(Vec::new()),
            received: Mutex::new(HashMap::new()),
        }
    }
}

impl NetworkManager for Loopback {
    fn send_data(&self, _channel: ChannelId, data: Bytes, completion: SendCompletion) {
        let mut buf = &data[..];
        if let Some(header) = FragmentHeader::decode(&mut buf) {
            let mut received = self.received.lock().unwrap();
            let bitmap = received
                .entry(header.frame_number)
                .or_insert_with(|| AckBitmap::new(header.frame_number));
            bitmap.set(header.fragment_number as usize);

            // Ack everything seen so far for this frame.
            let mut ack_bitmap = AckBitmap::new(header.frame_number);
            for i in bitmap.set_indices(header.fragments_per_frame as usize) {
                ack_bitmap.set(i);
            }
            let (mut high, mut low) = (0u64, 0u64);
            for i in ack_bitmap.set_indices(128) {
                if i < 64 {
                    low |= 1 << i;
                } else {
                    high |= 1 << (i - 64);
                }
            }
            let ack = FrameAck {
                frame_number: header.frame_number as u16,
                high_packets_ack: high,
                low_packets_ack: low,
            };
            let mut wire = BytesMut::new();
            ack.encode(&mut wire);
            self.acks.lock().unwrap().push(wire.to_vec());
        }
        completion(SendStatus::Sent);
    }

    fn read_with_timeout(
        &self,
        _channel: ChannelId,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, RecvError> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if let Some(packet) = self.acks.lock().unwrap().pop() {
                let n = packet.len().min(buf.len());
                buf[..n].copy_from_slice(&packet[..n]);
                return Ok(n);
            }
            if std::time::Instant::now() >= deadline {
                return Err(RecvError::TimedOut);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn estimated_latency(&self) -> Option<Duration> {
        Some(Duration::from_millis(1))
    }

    fn flush_channel(&self, _channel: ChannelId) {}
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let transport = Arc::new(Loopback::new());
    let callback: FrameCallback = Arc::new(|status: FrameStatus, frame: &PendingFrame| {
        println!(
            "frame {} -> {:?} ({} bytes)",
            frame.frame_number,
            status,
            frame.data.len()
        );
    });

    let mut sender = FrameSender::new(
        Arc::clone(&transport) as Arc<dyn NetworkManager>,
        DATA_CHANNEL,
        ACK_CHANNEL,
        callback,
        SenderConfig::default(),
    )
    .expect("sender construction");

    for i in 1..=5u8 {
        let frame = Bytes::from(vec![i; 1000 * i as usize + 500]);
        match sender.send_frame(frame, false) {
            Ok(backlog) => println!("queued frame {i}, backlog {backlog}"),
            Err(err) => eprintln!("enqueue failed: {err}"),
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    std::thread::sleep(Duration::from_millis(300));
    println!("efficiency: {:.3}", sender.estimated_efficiency());
    println!(
        "stats: {}",
        serde_json::to_string_pretty(&sender.stats()).expect("stats serialize")
    );
    sender.shutdown();
}
