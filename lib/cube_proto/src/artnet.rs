//! Pure ArtNet DMX/Sync PDU encoding. No I/O, no global state: byte-identical
//! output for byte-identical input.

/// The 8-byte ArtNet protocol header shared by every PDU.
const HEADER: &[u8; 8] = b"Art-Net\0";
/// ArtNet protocol version, encoded big-endian.
const PROTOCOL_VERSION: u16 = 0x000E;
/// DMX PDU opcode, encoded little-endian.
const OPCODE_DMX: u16 = 0x5000;
/// Sync PDU opcode, encoded little-endian.
const OPCODE_SYNC: u16 = 0x5200;

/// Maximum number of bytes of DMX payload per PDU (170 RGB pixels).
pub const MAX_DMX_PAYLOAD_BYTES: usize = 510;
/// Number of RGB pixels that fit in one DMX PDU.
pub const MAX_DMX_PAYLOAD_PIXELS: usize = MAX_DMX_PAYLOAD_BYTES / 3;

/// Encodes a DMX PDU carrying `payload` on `universe`.
///
/// # Panics
///
/// Panics if `payload.len() > 510`. Callers (the fan-out) are responsible
/// for pre-slicing raster data into chunks of at most 510 bytes; this
/// function's contract is purely "valid input in, well-formed PDU out".
pub fn encode_dmx(universe: u16, payload: &[u8]) -> Vec<u8> {
    assert!(
        payload.len() <= MAX_DMX_PAYLOAD_BYTES,
        "DMX payload of {} bytes exceeds the {}-byte limit",
        payload.len(),
        MAX_DMX_PAYLOAD_BYTES
    );

    let mut packet = Vec::with_capacity(18 + payload.len());
    packet.extend_from_slice(HEADER);
    packet.extend_from_slice(&OPCODE_DMX.to_le_bytes());
    packet.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    packet.push(0); // sequence, disabled
    packet.push(0); // physical port, ignored
    packet.extend_from_slice(&universe.to_le_bytes());
    packet.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    packet.extend_from_slice(payload);
    packet
}

/// Encodes a Sync PDU, telling receivers to latch all previously buffered
/// universes simultaneously.
pub fn encode_sync() -> Vec<u8> {
    let mut packet = Vec::with_capacity(10);
    packet.extend_from_slice(HEADER);
    packet.extend_from_slice(&OPCODE_SYNC.to_le_bytes());
    packet.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    packet.push(0);
    packet.push(0);
    packet
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dmx_header_and_opcode() {
        let packet = encode_dmx(0, &[1, 2, 3]);
        assert_eq!(&packet[0..8], b"Art-Net\0");
        assert_eq!(&packet[8..10], &[0x00, 0x50]);
    }

    #[test]
    fn sync_header_and_opcode() {
        let packet = encode_sync();
        assert_eq!(&packet[0..8], b"Art-Net\0");
        assert_eq!(&packet[8..10], &[0x00, 0x52]);
    }

    #[test]
    fn dmx_protocol_version_and_sequence_physical() {
        let packet = encode_dmx(42, &[0xFF, 0x00, 0x00]);
        assert_eq!(&packet[10..12], &[0x00, 0x0E]);
        assert_eq!(packet[12], 0); // sequence
        assert_eq!(packet[13], 0); // physical
    }

    #[test]
    fn dmx_universe_is_little_endian() {
        let packet = encode_dmx(0x1234, &[]);
        assert_eq!(&packet[14..16], &[0x34, 0x12]);
    }

    #[test]
    fn dmx_length_is_big_endian() {
        let payload = vec![0u8; 9];
        let packet = encode_dmx(0, &payload);
        assert_eq!(&packet[16..18], &[0x00, 0x09]);
        assert_eq!(&packet[18..], payload.as_slice());
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = encode_dmx(7, &[1, 2, 3, 4, 5, 6]);
        let b = encode_dmx(7, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(a, b);
    }

    #[test]
    #[should_panic]
    fn oversized_payload_panics() {
        let payload = vec![0u8; MAX_DMX_PAYLOAD_BYTES + 1];
        encode_dmx(0, &payload);
    }

    #[test]
    fn scenario_a_first_datagram_layout() {
        // World 20x20x20 scene writes RGB(255,0,0) at (0,0,0): the first DMX
        // datagram's payload starts with 0xFF 0x00 0x00.
        let payload = [0xFFu8, 0x00, 0x00];
        let packet = encode_dmx(0, &payload);
        assert_eq!(packet[18], 0xFF);
        assert_eq!(packet[19], 0x00);
        assert_eq!(packet[20], 0x00);
    }
}
