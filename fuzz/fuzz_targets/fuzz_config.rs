#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let detected = zendyn::ContainerFormat::detect(data);
    let sniffed = zendyn::sniff(data, zendyn::load());
    assert!(sniffed.is_none() || sniffed == detected);

    if let Ok(dims) = zendyn::config(data) {
        assert!(detected.is_some());
        let _ = dims.width.checked_mul(dims.height);
    }
});
