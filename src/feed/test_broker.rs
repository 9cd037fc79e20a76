//! A minimal MQTT 3.1.1 broker for exercising connections in tests.
//!
//! Serves one client connection at a time. It answers CONNECT, SUBSCRIBE and
//! PINGREQ, reports each subscribed filter, and pushes QoS 0 publishes or
//! drops the connection on request.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const CONNECT: u8 = 1;
const SUBSCRIBE: u8 = 8;
const PINGREQ: u8 = 12;
const DISCONNECT: u8 = 14;

const SUBACK_QOS1: u8 = 0x01;
const SUBACK_FAILURE: u8 = 0x80;

const WAIT: Duration = Duration::from_secs(5);

enum Command {
    Publish { topic: String, payload: Vec<u8> },
    Drop,
}

pub(crate) struct TestBroker {
    url: String,
    subscriptions: mpsc::UnboundedReceiver<String>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl TestBroker {
    /// A broker that grants every subscription.
    pub(crate) async fn start() -> Self {
        Self::with_suback(SUBACK_QOS1).await
    }

    /// A broker that rejects every subscription.
    pub(crate) async fn rejecting() -> Self {
        Self::with_suback(SUBACK_FAILURE).await
    }

    async fn with_suback(code: u8) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("mqtt://{}", listener.local_addr().unwrap());
        let (subscribed, subscriptions) = mpsc::unbounded_channel();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(accept(listener, code, subscribed, command_rx));

        Self {
            url,
            subscriptions,
            commands,
            task,
        }
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// The next topic filter a client subscribed to.
    pub(crate) async fn next_subscription(&mut self) -> String {
        tokio::time::timeout(WAIT, self.subscriptions.recv())
            .await
            .expect("no SUBSCRIBE received")
            .expect("broker stopped")
    }

    /// Send a QoS 0 publish to the connected client.
    pub(crate) fn publish(&self, topic: &str, payload: &[u8]) {
        let _ = self.commands.send(Command::Publish {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    /// Close the current client connection; the next one is accepted.
    pub(crate) fn drop_connection(&self) {
        let _ = self.commands.send(Command::Drop);
    }
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept(
    listener: TcpListener,
    suback_code: u8,
    subscribed: mpsc::UnboundedSender<String>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    while let Ok((stream, _)) = listener.accept().await {
        serve(stream, suback_code, &subscribed, &mut commands).await;
    }
}

async fn serve(
    stream: TcpStream,
    suback_code: u8,
    subscribed: &mpsc::UnboundedSender<String>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) {
    let (reader, mut writer) = stream.into_split();
    let (packet_tx, mut packets) = mpsc::unbounded_channel();
    let reader = tokio::spawn(read_packets(reader, packet_tx));

    loop {
        tokio::select! {
            packet = packets.recv() => {
                let Some((kind, body)) = packet else { break };
                let reply = match kind {
                    CONNECT => vec![0x20, 0x02, 0x00, 0x00],
                    SUBSCRIBE => {
                        // packet id, then the first filter as a length-prefixed string
                        let len = u16::from_be_bytes([body[2], body[3]]) as usize;
                        let filter = String::from_utf8_lossy(&body[4..4 + len]).into_owned();
                        let _ = subscribed.send(filter);
                        vec![0x90, 0x03, body[0], body[1], suback_code]
                    }
                    PINGREQ => vec![0xd0, 0x00],
                    DISCONNECT => break,
                    _ => continue,
                };
                if writer.write_all(&reply).await.is_err() {
                    break;
                }
            }
            command = commands.recv() => match command {
                Some(Command::Publish { topic, payload }) => {
                    if writer.write_all(&encode_publish(&topic, &payload)).await.is_err() {
                        break;
                    }
                }
                Some(Command::Drop) | None => break,
            },
        }
    }

    reader.abort();
}

/// Forward `(packet type, body)` pairs until the client goes away.
async fn read_packets(mut reader: OwnedReadHalf, packets: mpsc::UnboundedSender<(u8, Vec<u8>)>) {
    loop {
        let Ok(header) = reader.read_u8().await else {
            return;
        };

        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let Ok(byte) = reader.read_u8().await else {
                return;
            };
            len |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }

        let mut body = vec![0; len];
        if reader.read_exact(&mut body).await.is_err() {
            return;
        }
        if packets.send((header >> 4, body)).is_err() {
            return;
        }
    }
}

fn encode_publish(topic: &str, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x30];

    let mut remaining = 2 + topic.len() + payload.len();
    loop {
        let mut byte = (remaining % 128) as u8;
        remaining /= 128;
        if remaining > 0 {
            byte |= 0x80;
        }
        packet.push(byte);
        if remaining == 0 {
            break;
        }
    }

    packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(payload);
    packet
}
