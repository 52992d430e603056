#![no_main]

use libfuzzer_sys::fuzz_target;
use weft_model::{MutationCodec, ObjectMutation};

fuzz_target!(|data: &[u8]| {
    if let Ok(mutation) = ObjectMutation::decode(data) {
        let encoded = mutation.encode().expect("decoded mutation re-encodes");
        assert_eq!(&encoded[..], data);
    }
});
