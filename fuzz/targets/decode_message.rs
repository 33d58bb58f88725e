#![no_main]
use gatemesh::Message;
use libfuzzer_sys::fuzz_target;

// Произвольные байты не должны ронять декодер. Если кадр принят,
// повторное кодирование обязано дать тот же кадр.
fuzz_target!(|data: &[u8]| {
    if let Ok(message) = Message::from_bytes(data) {
        let encoded = message.to_bytes().expect("decoded message re-encodes");
        let again = Message::from_bytes(&encoded).expect("re-encoded frame decodes");
        assert_eq!(again, message);
    }
});
