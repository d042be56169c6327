use std::net::Ipv4Addr;
use std::time::Duration;

use fwdns::{Forwarder, ForwarderSettings, MAX_STANDARD_DNS_MSG_SIZE};
use fwdns_lib::{
    ByteBuf, DnsHeader, DnsPacket, EncodeToBuf as _, FromBuf as _, Question, RData, RecordType,
    ResourceRecord,
};
use tokio::net::UdpSocket;
use tokio::time::timeout;

fn encode(packet: &DnsPacket<'_>) -> Vec<u8> {
    let mut buf = ByteBuf::new_empty(None);
    packet.encode_to_buf(&mut buf).expect("encoding shouldn't fail");
    buf.as_ref().to_vec()
}

fn decode(datagram: &[u8]) -> DnsPacket<'static> {
    let mut reader = ByteBuf::new(&datagram);
    DnsPacket::from_buf(&mut reader).expect("decoding shouldn't fail")
}

/// A single-shot upstream resolver: answers the first query it receives
/// with an A record and echoes the transaction ID.
async fn run_fake_upstream(socket: UdpSocket) {
    let mut recv = vec![0; MAX_STANDARD_DNS_MSG_SIZE];
    let (len, from) = socket.recv_from(&mut recv).await.unwrap();
    let query = decode(&recv[..len]);

    let mut response = DnsPacket::new(DnsHeader::new(query.header.id));
    response.header.flags.is_response = true;
    response.header.flags.recursion_available = true;
    response.questions = query.questions.clone();
    response.answers.push(ResourceRecord::new(
        "www.example.com",
        RData::A {
            address: Ipv4Addr::new(93, 184, 216, 34),
        },
        300,
        None,
    ));

    socket.send_to(&encode(&response), from).await.unwrap();
}

#[tokio::test]
async fn forwards_a_query_and_relays_the_response_back() {
    let upstream_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream_socket.local_addr().unwrap();
    let upstream = tokio::spawn(run_fake_upstream(upstream_socket));

    let forwarder = Forwarder::start(ForwarderSettings {
        local_host: Ipv4Addr::LOCALHOST.into(),
        local_port: 0,
        remote_host: upstream_addr.ip().to_string(),
        remote_port: upstream_addr.port(),
    })
    .await
    .unwrap();

    let mut query = DnsPacket::new(DnsHeader::new(0x1234));
    query.header.flags.recursion_desired = true;
    query
        .questions
        .push(Question::new("www.example.com", RecordType::A, None));

    let requester = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    requester
        .send_to(&encode(&query), forwarder.local_addr())
        .await
        .unwrap();

    let mut recv = vec![0; MAX_STANDARD_DNS_MSG_SIZE];
    let (len, from) = timeout(Duration::from_secs(5), requester.recv_from(&mut recv))
        .await
        .expect("no response within 5s")
        .unwrap();
    assert_eq!(from, forwarder.local_addr());

    let response = decode(&recv[..len]);
    // The transaction ID must come back unchanged, flipped to a response
    assert_eq!(response.header.id, 0x1234);
    assert!(response.header.flags.is_response);
    assert_eq!(response.answers.len(), 1);
    assert_eq!(response.answers[0].ttl, 300);
    assert_eq!(
        response.answers[0].parsed,
        Some(RData::A {
            address: Ipv4Addr::new(93, 184, 216, 34)
        })
    );

    upstream.await.unwrap();
    forwarder.shutdown().await;
}

#[tokio::test]
async fn malformed_datagrams_do_not_disturb_real_queries() {
    let upstream_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream_socket.local_addr().unwrap();
    let upstream = tokio::spawn(run_fake_upstream(upstream_socket));

    let forwarder = Forwarder::start(ForwarderSettings {
        local_host: Ipv4Addr::LOCALHOST.into(),
        local_port: 0,
        remote_host: upstream_addr.ip().to_string(),
        remote_port: upstream_addr.port(),
    })
    .await
    .unwrap();

    let requester = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    requester
        .send_to(&[0xde, 0xad], forwarder.local_addr())
        .await
        .unwrap();

    let mut query = DnsPacket::new(DnsHeader::new(0x77));
    query
        .questions
        .push(Question::new("www.example.com", RecordType::A, None));
    requester
        .send_to(&encode(&query), forwarder.local_addr())
        .await
        .unwrap();

    let mut recv = vec![0; MAX_STANDARD_DNS_MSG_SIZE];
    let (len, _) = timeout(Duration::from_secs(5), requester.recv_from(&mut recv))
        .await
        .expect("no response within 5s")
        .unwrap();
    assert_eq!(decode(&recv[..len]).header.id, 0x77);

    upstream.await.unwrap();
    forwarder.shutdown().await;
}
