#![no_main]
use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use gatemesh::Message;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    payload: Vec<u8>,
    properties: BTreeMap<String, String>,
}

fuzz_target!(|input: Input| {
    let message = Message::new(input.payload, input.properties);
    let frame = match message.to_bytes() {
        Ok(frame) => frame,
        // NUL в свойствах и слишком большие входы кодек отклоняет.
        Err(_) => return,
    };
    let decoded = Message::from_bytes(&frame).expect("encoded frame decodes");
    assert_eq!(decoded, message);
    assert!(!decoded.ptr_eq(&message));
});
