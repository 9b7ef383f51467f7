//! Minimal DHCP server for clients of the access point.
//!
//! Leases come from a small pool right after the access-point address and
//! expire quickly, so portal clients keep refreshing.

use core::net::Ipv4Addr;

use heapless::Vec;

pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;
pub const LEASE_SECS: u32 = 30;
pub const MAX_LEASES: usize = 8;
/// Smallest buffer [`reply`] writes into.
pub const REPLY_MIN_LEN: usize = 300;

const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
const FIXED_LEN: usize = 240;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageType {
    Discover,
    Request,
    Decline,
    Release,
    Inform,
    Other(u8),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Message {
    pub kind: MessageType,
    pub transaction_id: u32,
    pub flags: u16,
    pub client_mac: [u8; 6],
    pub client_ip: Option<Ipv4Addr>,
    pub requested_ip: Option<Ipv4Addr>,
    pub server_id: Option<Ipv4Addr>,
}

/// Parses an Ethernet BOOTREQUEST; anything else is `None`.
pub fn parse(frame: &[u8]) -> Option<Message> {
    if frame.len() < FIXED_LEN || frame[0] != 1 || frame[1] != 1 || frame[2] != 6 {
        return None;
    }
    if frame[236..240] != MAGIC_COOKIE {
        return None;
    }

    let mut kind = None;
    let mut requested_ip = None;
    let mut server_id = None;

    let mut index = FIXED_LEN;
    while index < frame.len() {
        let code = frame[index];
        index += 1;
        match code {
            0 => continue,
            255 => break,
            _ => {}
        }

        let len = *frame.get(index)? as usize;
        index += 1;
        let data = frame.get(index..index + len)?;
        match (code, len) {
            (50, 4) => requested_ip = Some(address(data)),
            (53, 1) => {
                kind = Some(match data[0] {
                    1 => MessageType::Discover,
                    3 => MessageType::Request,
                    4 => MessageType::Decline,
                    7 => MessageType::Release,
                    8 => MessageType::Inform,
                    other => MessageType::Other(other),
                })
            }
            (54, 4) => server_id = Some(address(data)),
            _ => {}
        }
        index += len;
    }

    let client_ip = address(&frame[12..16]);
    let mut client_mac = [0u8; 6];
    client_mac.copy_from_slice(&frame[28..34]);

    Some(Message {
        kind: kind?,
        transaction_id: u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]),
        flags: u16::from_be_bytes([frame[10], frame[11]]),
        client_mac,
        client_ip: (!client_ip.is_unspecified()).then_some(client_ip),
        requested_ip,
        server_id,
    })
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Lease {
    mac: [u8; 6],
    address: Ipv4Addr,
    expires_ms: u64,
}

/// Address pool of the access point.
#[derive(Debug)]
pub struct LeasePool {
    server: Ipv4Addr,
    prefix_len: u8,
    pool_start: Ipv4Addr,
    pool_size: u8,
    leases: Vec<Lease, MAX_LEASES>,
}

impl LeasePool {
    /// Pool of `pool_size` addresses starting right after `server`.
    pub fn new(server: Ipv4Addr, prefix_len: u8, pool_size: u8) -> Self {
        Self {
            server,
            prefix_len,
            pool_start: Ipv4Addr::from_bits(server.to_bits().wrapping_add(1)),
            pool_size,
            leases: Vec::new(),
        }
    }

    pub fn server(&self) -> Ipv4Addr {
        self.server
    }

    pub fn netmask(&self) -> Ipv4Addr {
        let bits = match self.prefix_len {
            0 => 0,
            len => u32::MAX << (32 - len.min(32) as u32),
        };
        Ipv4Addr::from_bits(bits)
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(self.server.to_bits() | !self.netmask().to_bits())
    }

    /// Decides the answer to `message`; `None` means stay silent.
    pub fn handle(&mut self, message: &Message, now_ms: u64) -> Option<(MessageType, Ipv4Addr)> {
        match message.kind {
            MessageType::Request
                if message.server_id.is_some_and(|server| server != self.server) =>
            {
                None
            }
            MessageType::Discover | MessageType::Request => {
                let wanted = message.requested_ip.or(message.client_ip);
                let address = self
                    .lease(message.client_mac, wanted, now_ms)
                    .unwrap_or(self.pool_start);
                Some((message.kind, address))
            }
            MessageType::Decline | MessageType::Release => {
                self.leases.retain(|lease| lease.mac != message.client_mac);
                None
            }
            MessageType::Inform | MessageType::Other(_) => None,
        }
    }

    fn in_pool(&self, address: Ipv4Addr) -> bool {
        let start = self.pool_start.to_bits();
        let value = address.to_bits();
        self.pool_size > 0 && value >= start && value < start + self.pool_size as u32
    }

    fn lease(&mut self, mac: [u8; 6], wanted: Option<Ipv4Addr>, now_ms: u64) -> Option<Ipv4Addr> {
        self.leases.retain(|lease| lease.expires_ms > now_ms);
        let expires_ms = now_ms + LEASE_SECS as u64 * 1_000;

        let wanted = wanted.filter(|address| {
            self.in_pool(*address)
                && self
                    .leases
                    .iter()
                    .all(|lease| lease.mac == mac || lease.address != *address)
        });

        if let Some(existing) = self.leases.iter_mut().find(|lease| lease.mac == mac) {
            if let Some(address) = wanted {
                existing.address = address;
            }
            existing.expires_ms = expires_ms;
            return Some(existing.address);
        }

        let address = wanted.or_else(|| {
            (0..self.pool_size as u32)
                .map(|offset| Ipv4Addr::from_bits(self.pool_start.to_bits() + offset))
                .find(|candidate| self.leases.iter().all(|lease| lease.address != *candidate))
        })?;

        self.leases
            .push(Lease {
                mac,
                address,
                expires_ms,
            })
            .ok()?;
        Some(address)
    }
}

/// Writes an OFFER (for a DISCOVER) or ACK (for a REQUEST) into `out`.
pub fn reply(
    out: &mut [u8],
    request: &Message,
    kind: MessageType,
    offered: Ipv4Addr,
    pool: &LeasePool,
) -> Option<usize> {
    if out.len() < REPLY_MIN_LEN {
        return None;
    }

    out.fill(0);
    out[0] = 2;
    out[1] = 1;
    out[2] = 6;
    out[4..8].copy_from_slice(&request.transaction_id.to_be_bytes());
    out[10..12].copy_from_slice(&request.flags.to_be_bytes());
    out[16..20].copy_from_slice(&offered.octets());
    out[20..24].copy_from_slice(&pool.server.octets());
    out[28..34].copy_from_slice(&request.client_mac);
    out[236..240].copy_from_slice(&MAGIC_COOKIE);

    let server = pool.server.octets();
    let reply_code = match kind {
        MessageType::Discover => 2,
        MessageType::Request => 5,
        MessageType::Decline => 6,
        MessageType::Release => 7,
        MessageType::Inform => 8,
        MessageType::Other(code) => code,
    };

    let mut index = FIXED_LEN;
    index += option(&mut out[index..], 53, &[reply_code])?;
    index += option(&mut out[index..], 54, &server)?;
    index += option(&mut out[index..], 51, &LEASE_SECS.to_be_bytes())?;
    index += option(&mut out[index..], 58, &(LEASE_SECS / 2).to_be_bytes())?;
    index += option(&mut out[index..], 59, &(LEASE_SECS * 7 / 8).to_be_bytes())?;
    index += option(&mut out[index..], 1, &pool.netmask().octets())?;
    index += option(&mut out[index..], 3, &server)?;
    index += option(&mut out[index..], 6, &server)?;
    index += option(&mut out[index..], 28, &pool.broadcast().octets())?;
    *out.get_mut(index)? = 255;

    Some(index + 1)
}

fn option(out: &mut [u8], code: u8, payload: &[u8]) -> Option<usize> {
    let needed = payload.len() + 2;
    let slot = out.get_mut(..needed)?;
    slot[0] = code;
    slot[1] = payload.len() as u8;
    slot[2..].copy_from_slice(payload);
    Some(needed)
}

fn address(bytes: &[u8]) -> Ipv4Addr {
    Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3])
}
