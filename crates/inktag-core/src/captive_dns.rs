//! Captive-portal DNS: every query is answered with the access-point address.

use core::net::Ipv4Addr;

pub const DNS_PORT: u16 = 53;
const HEADER_LEN: usize = 12;
const ANSWER_LEN: usize = 16;
const TTL_SECS: u32 = 60;

/// Builds the response to `query` in `out`; returns its length.
///
/// Returns `None` for packets that are not a single-question standard query
/// or when `out` is too small.
pub fn answer(query: &[u8], address: Ipv4Addr, out: &mut [u8]) -> Option<usize> {
    if query.len() < HEADER_LEN {
        return None;
    }

    let flags = u16::from_be_bytes([query[2], query[3]]);
    let is_response = flags & 0x8000 != 0;
    let opcode = (flags >> 11) & 0x0F;
    let questions = u16::from_be_bytes([query[4], query[5]]);
    if is_response || opcode != 0 || questions != 1 {
        return None;
    }

    let question_end = question_end(query)?;
    let len = question_end + ANSWER_LEN;
    if out.len() < len {
        return None;
    }

    out[..question_end].copy_from_slice(&query[..question_end]);
    // QR + AA, keep RD; RA clear, RCODE 0.
    out[2] = 0x84 | (query[2] & 0x01);
    out[3] = 0x00;
    out[6..8].copy_from_slice(&1u16.to_be_bytes());
    out[8..12].copy_from_slice(&[0, 0, 0, 0]);

    let answer = &mut out[question_end..len];
    // Name: pointer to the question at offset 12.
    answer[0..2].copy_from_slice(&[0xC0, 0x0C]);
    answer[2..4].copy_from_slice(&1u16.to_be_bytes());
    answer[4..6].copy_from_slice(&1u16.to_be_bytes());
    answer[6..10].copy_from_slice(&TTL_SECS.to_be_bytes());
    answer[10..12].copy_from_slice(&4u16.to_be_bytes());
    answer[12..16].copy_from_slice(&address.octets());

    Some(len)
}

/// End offset of the single question (name + type + class).
fn question_end(query: &[u8]) -> Option<usize> {
    let mut cursor = HEADER_LEN;
    loop {
        let label = *query.get(cursor)? as usize;
        if label == 0 {
            cursor += 1;
            break;
        }
        if label & 0xC0 != 0 {
            return None;
        }
        cursor += 1 + label;
    }

    let end = cursor + 4;
    (end <= query.len()).then_some(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(name: &[&str]) -> std::vec::Vec<u8> {
        let mut out = std::vec![0x12, 0x34, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0];
        for label in name {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
        out.extend_from_slice(&[0, 0, 1, 0, 1]);
        out
    }

    #[test]
    fn answers_any_name_with_the_portal_address() {
        let q = query(&["captive", "apple", "com"]);
        let mut out = [0u8; 128];

        let len = answer(&q, Ipv4Addr::new(192, 168, 4, 1), &mut out).unwrap();

        assert_eq!(len, q.len() + 16);
        assert_eq!(&out[0..2], &[0x12, 0x34]);
        assert_eq!(out[2], 0x85);
        assert_eq!(&out[6..8], &[0, 1]);
        assert_eq!(&out[q.len()..q.len() + 2], &[0xC0, 0x0C]);
        assert_eq!(&out[len - 4..len], &[192, 168, 4, 1]);
    }

    #[test]
    fn responses_and_truncated_queries_are_ignored() {
        let mut out = [0u8; 128];
        let mut response = query(&["a"]);
        response[2] |= 0x80;
        assert_eq!(answer(&response, Ipv4Addr::LOCALHOST, &mut out), None);

        let q = query(&["example", "com"]);
        assert_eq!(answer(&q[..q.len() - 2], Ipv4Addr::LOCALHOST, &mut out), None);
        assert_eq!(answer(&q, Ipv4Addr::LOCALHOST, &mut out[..8]), None);
    }
}
