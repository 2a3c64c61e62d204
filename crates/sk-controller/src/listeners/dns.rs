//! DNS listener unit
//!
//! A blocking UDP responder. Agents encode their message as the leading
//! label of a TXT query; the responder answers TXT queries with a TXT
//! acknowledgment and anything else with a fixed A record. The socket read
//! times out every second so the unit can observe the cancellation token.

use std::net::Ipv4Addr;
use std::time::Duration;

use hickory_proto::op::{Header, Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::{A, TXT};
use hickory_proto::rr::{DNSClass, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use tokio_util::sync::CancellationToken;

use sk_core::types::TransportKind;

/// Payload of the TXT acknowledgment answer
const TXT_ACK: &str = "ack";

/// Cancellation polling granularity
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Run the DNS responder until cancelled.
///
/// Binds inside the unit; a port conflict (53 is usually contended) aborts
/// this unit alone.
pub fn run(bind_addr: String, fixed_ip: String, cancel: CancellationToken) {
    let socket = match std::net::UdpSocket::bind(&bind_addr) {
        Ok(socket) => socket,
        Err(e) => {
            tracing::error!("DNS responder failed to bind {}: {}", bind_addr, e);
            return;
        }
    };

    if let Err(e) = socket.set_read_timeout(Some(POLL_INTERVAL)) {
        tracing::error!("DNS responder socket setup failed: {}", e);
        return;
    }

    let fixed_ip: Ipv4Addr = match fixed_ip.parse() {
        Ok(ip) => ip,
        Err(e) => {
            tracing::error!("Invalid DNS fixed IP {:?}: {}", fixed_ip, e);
            return;
        }
    };

    tracing::info!("DNS responder serving on {}", bind_addr);

    let mut buf = [0u8; 512];
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
                tracing::error!("DNS responder receive error: {}", e);
                continue;
            }
        };

        let request = match Message::from_bytes(&buf[..len]) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("Undecodable DNS query from {}: {}", peer, e);
                continue;
            }
        };

        let reply = build_reply(&request, fixed_ip);
        match reply.to_bytes() {
            Ok(bytes) => {
                if let Err(e) = socket.send_to(&bytes, peer) {
                    tracing::error!("DNS responder send error: {}", e);
                }
            }
            Err(e) => tracing::error!("DNS reply serialization failed: {}", e),
        }
    }

    tracing::info!(transport = %TransportKind::Dns, "DNS responder stopped");
}

/// Build the authoritative reply for one query message.
///
/// TXT queries carry agent traffic and get the acknowledgment string; other
/// query types get the fixed A record.
pub fn build_reply(request: &Message, fixed_ip: Ipv4Addr) -> Message {
    let mut header = Header::new();
    header.set_id(request.id());
    header.set_message_type(MessageType::Response);
    header.set_op_code(OpCode::Query);
    header.set_authoritative(true);
    header.set_recursion_available(true);
    header.set_response_code(ResponseCode::NoError);

    let mut reply = Message::new();
    reply.set_header(header);

    for query in request.queries() {
        tracing::debug!(
            name = %query.name(),
            qtype = %query.query_type(),
            "DNS query"
        );
        reply.add_query(query.clone());

        let rdata = match query.query_type() {
            RecordType::TXT => RData::TXT(TXT::new(vec![TXT_ACK.to_string()])),
            _ => RData::A(A(fixed_ip)),
        };
        let mut record = Record::from_rdata(query.name().clone(), 60, rdata);
        record.set_dns_class(DNSClass::IN);
        reply.add_answer(record);
    }

    reply
}
