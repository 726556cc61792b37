#[cfg(test)]
pub(crate) fn with_temp_home<F, R>(func: F) -> R
where
    F: FnOnce(&std::path::Path) -> R,
{
    static HOME_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
    let _guard = HOME_MUTEX.lock().unwrap_or_else(|err| err.into_inner());
    let dir = tempfile::tempdir().expect("tempdir");
    let old_home = std::env::var("HOME").ok();
    // SAFETY: HOME is only mutated under HOME_MUTEX.
    unsafe { std::env::set_var("HOME", dir.path()) };
    let result = func(dir.path());
    match old_home {
        Some(old) => unsafe { std::env::set_var("HOME", old) },
        None => unsafe { std::env::remove_var("HOME") },
    }
    result
}

#[cfg(test)]
pub(crate) fn solid_image(width: u32, height: u32, rgba: [u8; 4]) -> image::RgbaImage {
    image::RgbaImage::from_pixel(width, height, image::Rgba(rgba))
}

#[cfg(test)]
pub(crate) fn encode_png(image: &image::RgbaImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("encode png");
    bytes
}

/// Count and centroid of near-white pixels inside `[x0, x1) x [y0, y1)`.
#[cfg(test)]
pub(crate) fn bright_pixels(image: &image::RgbaImage, x0: u32, y0: u32, x1: u32, y1: u32) -> (usize, f32, f32) {
    let mut count = 0usize;
    let (mut sum_x, mut sum_y) = (0f32, 0f32);
    for (x, y, pixel) in image.enumerate_pixels() {
        if x < x0 || x >= x1 || y < y0 || y >= y1 {
            continue;
        }
        if pixel.0[..3].iter().all(|channel| *channel > 200) {
            count += 1;
            sum_x += x as f32;
            sum_y += y as f32;
        }
    }
    if count == 0 {
        return (0, 0.0, 0.0);
    }
    (count, sum_x / count as f32, sum_y / count as f32)
}
