#![no_main]

use libfuzzer_sys::fuzz_target;
use weft_gossip::GossipPacket;

fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = GossipPacket::decode(data) {
        // Anything that decodes must re-encode to the same bytes
        let encoded = packet.encode();
        assert_eq!(&encoded[..], data);
        assert_eq!(encoded.len(), packet.encoded_len());
    }
});
