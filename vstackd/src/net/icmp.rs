//! ICMP Time Exceeded construction for the router path.

use super::checksum::internet_checksum;

const TYPE_TIME_EXCEEDED: u8 = 11;
const CODE_TTL_EXCEEDED: u8 = 0;

/// Builds a Time Exceeded (type 11, code 0) ICMP message whose payload is
/// the original IP header followed by the first 8 bytes of its payload,
/// per RFC 792.
pub fn time_exceeded(original_header: &[u8], original_payload: &[u8]) -> Vec<u8> {
    let included_payload_len = original_payload.len().min(8);
    let mut message = Vec::with_capacity(8 + original_header.len() + included_payload_len);

    message.push(TYPE_TIME_EXCEEDED);
    message.push(CODE_TTL_EXCEEDED);
    message.extend_from_slice(&[0, 0]); // checksum placeholder
    message.extend_from_slice(&[0, 0, 0, 0]); // unused ("rest")
    message.extend_from_slice(original_header);
    message.extend_from_slice(&original_payload[..included_payload_len]);

    let cksum = internet_checksum(&message);
    message[2] = (cksum >> 8) as u8;
    message[3] = (cksum & 0xFF) as u8;
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_header_and_first_eight_payload_bytes() {
        let header = [0xAAu8; 20];
        let payload = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let msg = time_exceeded(&header, &payload);
        assert_eq!(msg[0], 11);
        assert_eq!(msg[1], 0);
        assert_eq!(&msg[8..28], &header);
        assert_eq!(&msg[28..36], &payload[..8]);
        assert_eq!(internet_checksum(&msg), 0);
    }
}
