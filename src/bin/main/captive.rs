//! Access-point side services: captive DNS and the DHCP server.

use embassy_net::{
    Stack,
    udp::{PacketMetadata, UdpSocket},
};
use embassy_time::Instant;
use inktag_core::{captive_dns, dhcp};
use inktag_hal_esp32s3::network::RadioShared;
use log::{debug, error, warn};

const DNS_FRAME_BYTES: usize = 512;
const DHCP_FRAME_BYTES: usize = 768;

/// Answers every query with the access-point address while the captive
/// DNS is enabled; queries are dropped otherwise.
pub async fn dns_loop(stack: Stack<'_>, shared: &'static RadioShared) -> ! {
    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buffer = [0u8; DNS_FRAME_BYTES];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_buffer = [0u8; DNS_FRAME_BYTES];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );

    if let Err(err) = socket.bind(captive_dns::DNS_PORT) {
        error!("dns: bind failed: {:?}", err);
        core::future::pending::<()>().await;
    }

    let mut query = [0u8; DNS_FRAME_BYTES];
    let mut reply = [0u8; DNS_FRAME_BYTES];
    loop {
        let (len, meta) = match socket.recv_from(&mut query).await {
            Ok(received) => received,
            Err(err) => {
                warn!("dns: receive failed: {:?}", err);
                continue;
            }
        };

        let Some(answer) = shared.dns_answer() else {
            continue;
        };
        let Some(reply_len) = captive_dns::answer(&query[..len], answer, &mut reply) else {
            continue;
        };
        if let Err(err) = socket.send_to(&reply[..reply_len], meta).await {
            warn!("dns: send failed: {:?}", err);
        }
    }
}

/// Hands out addresses from `pool` to access-point clients.
pub async fn dhcp_loop(stack: Stack<'_>, mut pool: dhcp::LeasePool) -> ! {
    let mut rx_meta = [PacketMetadata::EMPTY; 4];
    let mut rx_buffer = [0u8; DHCP_FRAME_BYTES];
    let mut tx_meta = [PacketMetadata::EMPTY; 4];
    let mut tx_buffer = [0u8; DHCP_FRAME_BYTES];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );

    if let Err(err) = socket.bind(dhcp::SERVER_PORT) {
        error!("dhcp: bind failed: {:?}", err);
        core::future::pending::<()>().await;
    }

    let mut frame = [0u8; DHCP_FRAME_BYTES];
    let mut reply = [0u8; DHCP_FRAME_BYTES];
    loop {
        let len = match socket.recv_from(&mut frame).await {
            Ok((len, _)) => len,
            Err(err) => {
                warn!("dhcp: receive failed: {:?}", err);
                continue;
            }
        };

        let Some(message) = dhcp::parse(&frame[..len]) else {
            continue;
        };
        let Some((kind, offered)) = pool.handle(&message, Instant::now().as_millis()) else {
            continue;
        };
        let Some(reply_len) = dhcp::reply(&mut reply, &message, kind, offered, &pool) else {
            warn!("dhcp: reply did not fit");
            continue;
        };

        debug!("dhcp: {:?} -> {}", kind, offered);
        let destination = (pool.broadcast(), dhcp::CLIENT_PORT);
        if let Err(err) = socket.send_to(&reply[..reply_len], destination).await {
            warn!("dhcp: send failed: {:?}", err);
        }
    }
}
