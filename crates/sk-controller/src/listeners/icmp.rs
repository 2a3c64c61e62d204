//! ICMP listener unit
//!
//! A blocking sniffer over a raw ICMP socket. Echo requests are answered
//! with echo replies carrying a fixed acknowledgment payload, identifier and
//! sequence echoed so the agent can correlate. The 1-second read timeout is
//! the unit's cancellation polling point; a capture handle that never
//! returns would outlive the orchestrator's Stopped transition, which is an
//! accepted limitation of blocking units.

use std::time::Duration;

use pnet_packet::icmp::echo_reply::MutableEchoReplyPacket;
use pnet_packet::icmp::echo_request::EchoRequestPacket;
use pnet_packet::icmp::{checksum, IcmpPacket, IcmpTypes};
use pnet_packet::Packet;
use socket2::{Domain, Protocol, Socket, Type};
use tokio_util::sync::CancellationToken;

/// Acknowledgment payload carried in every echo reply
const REPLY_PAYLOAD: &[u8] = b"Reply_OK";

/// Marker for tasking embedded in an echo-request payload
const COMMAND_MARKER: &str = "C2_CMD";

/// Cancellation polling granularity
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Echo reply header length in bytes
const ECHO_HEADER_LEN: usize = 8;

/// Run the ICMP sniffer until cancelled.
///
/// Requires CAP_NET_RAW or root; a privilege failure aborts this unit
/// alone.
pub fn run(cancel: CancellationToken) {
    let socket = match open_socket() {
        Ok(socket) => socket,
        Err(e) => {
            tracing::error!("ICMP sniffer failed to open raw socket: {}", e);
            return;
        }
    };

    tracing::info!("Listening for incoming ICMP echo requests");

    let mut buf = [0u8; 1500];
    while !cancel.is_cancelled() {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                tracing::error!("ICMP sniffer receive error: {}", e);
                continue;
            }
        };

        let Some(request) = decode_echo_request(&buf[..len]) else {
            continue;
        };

        tracing::debug!(
            peer = %peer.ip(),
            id = request.identifier,
            seq = request.sequence,
            "Received ICMP echo request"
        );

        if !request.payload.is_empty() {
            let text = String::from_utf8_lossy(&request.payload);
            tracing::debug!("ICMP payload: {}", text);
            if text.contains(COMMAND_MARKER) {
                tracing::info!("Command received via ICMP: {}", text);
            }
        }

        match build_echo_reply(request.identifier, request.sequence, REPLY_PAYLOAD) {
            Some(reply) => {
                if let Err(e) = socket.send_to(&reply, peer) {
                    tracing::error!("ICMP reply send error: {}", e);
                }
            }
            None => tracing::error!("ICMP reply construction failed"),
        }
    }

    tracing::info!("ICMP listener stopped");
}

/// Open the raw ICMP socket with the polling read timeout applied.
///
/// Converted to a `UdpSocket` wrapper for safe `recv_from`/`send_to`; the
/// descriptor underneath stays a raw ICMP socket.
fn open_socket() -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
    socket.set_read_timeout(Some(POLL_INTERVAL))?;
    Ok(socket.into())
}

/// A decoded echo request
struct EchoRequest {
    identifier: u16,
    sequence: u16,
    payload: Vec<u8>,
}

/// Decode a raw-socket datagram into an echo request, stripping the IPv4
/// header by its IHL field. Returns None for anything that is not an echo
/// request.
fn decode_echo_request(datagram: &[u8]) -> Option<EchoRequest> {
    if datagram.is_empty() {
        return None;
    }
    let header_len = ((datagram[0] & 0x0f) as usize) * 4;
    if datagram.len() <= header_len {
        return None;
    }

    let request = EchoRequestPacket::new(&datagram[header_len..])?;
    if request.get_icmp_type() != IcmpTypes::EchoRequest {
        return None;
    }

    Some(EchoRequest {
        identifier: request.get_identifier(),
        sequence: request.get_sequence_number(),
        payload: request.payload().to_vec(),
    })
}

/// Build the bytes of an echo reply correlated to a request
fn build_echo_reply(identifier: u16, sequence: u16, payload: &[u8]) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; ECHO_HEADER_LEN + payload.len()];
    {
        let mut packet = MutableEchoReplyPacket::new(&mut buf)?;
        packet.set_icmp_type(IcmpTypes::EchoReply);
        packet.set_identifier(identifier);
        packet.set_sequence_number(sequence);
        packet.set_payload(payload);
    }

    let sum = checksum(&IcmpPacket::new(&buf)?);
    MutableEchoReplyPacket::new(&mut buf)?.set_checksum(sum);

    Some(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;

    fn fake_request_datagram(identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
        let mut icmp = vec![0u8; ECHO_HEADER_LEN + payload.len()];
        {
            let mut packet = MutableEchoRequestPacket::new(&mut icmp).unwrap();
            packet.set_icmp_type(IcmpTypes::EchoRequest);
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
    fn test_decode_echo_request() {
        let datagram = fake_request_datagram(7, 3, b"C2_CMD whoami");
        let request = decode_echo_request(&datagram).unwrap();
        assert_eq!(request.identifier, 7);
        assert_eq!(request.sequence, 3);
        assert_eq!(request.payload, b"C2_CMD whoami");
    }

    #[test]
    fn test_decode_rejects_truncated() {
        assert!(decode_echo_request(&[]).is_none());
        assert!(decode_echo_request(&[0x45, 0, 0]).is_none());
    }

    #[test]
    fn test_reply_correlates_to_request() {
        let reply = build_echo_reply(7, 3, REPLY_PAYLOAD).unwrap();
        let packet = pnet_packet::icmp::echo_reply::EchoReplyPacket::new(&reply).unwrap();
        assert_eq!(packet.get_icmp_type(), IcmpTypes::EchoReply);
        assert_eq!(packet.get_identifier(), 7);
        assert_eq!(packet.get_sequence_number(), 3);
        assert_eq!(packet.payload(), REPLY_PAYLOAD);
    }
}
