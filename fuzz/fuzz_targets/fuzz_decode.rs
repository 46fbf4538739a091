#![no_main]

use libfuzzer_sys::fuzz_target;
use zendyn::{DecodeRequest, Limits};

fuzz_target!(|data: &[u8]| {
    let limits = Limits::none()
        .with_max_width(4096)
        .with_max_height(4096)
        .with_max_pixels(16_000_000);

    if let Ok(decoded) = DecodeRequest::new(data).with_limits(&limits).decode() {
        let image = decoded.image();
        assert_eq!(image.width(), decoded.width());
        assert_eq!(image.height(), decoded.height());
        // touch every row so bad plane geometry faults under ASan
        let mut sum = 0u32;
        for plane in image.planes() {
            for row in plane.rows() {
                sum = sum.wrapping_add(row.iter().map(|&b| u32::from(b)).sum::<u32>());
            }
        }
        std::hint::black_box(sum);
        zendyn::free(decoded);
    }
});
