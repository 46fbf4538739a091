#![no_main]

use libfuzzer_sys::fuzz_target;
use zendyn::{JpegFrame, Limits};

fuzz_target!(|data: &[u8]| {
    let limits = Limits::none().with_max_pixels(4096 * 4096);
    if let Ok(frame) = JpegFrame::decode_with(data, None, &limits) {
        let image = frame.image().expect("decoded planes are consistent");
        assert_eq!(image.width(), frame.width());
        assert_eq!(image.format(), frame.format());
    }
});
