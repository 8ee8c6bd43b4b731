use fractured_key::stego::{Carrier, LsbCodec};
use fractured_key::FractureError;
use image::{DynamicImage, Rgb, RgbImage};
use tempfile::tempdir;

fn carrier_64() -> Carrier {
    Carrier::from_image(DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, y| {
        Rgb([(x * 4) as u8, (y * 4) as u8, 128])
    })))
}

#[test]
fn capacity_of_64x64_rgb_at_one_bit() {
    assert_eq!(LsbCodec::default().capacity(&carrier_64()), 1536);
}

#[test]
fn hundred_bytes_roundtrip_through_png() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("carrier.png");
    let codec = LsbCodec::default();
    let payload: Vec<u8> = (0..100u8).collect();

    codec.embed(carrier_64(), &payload).unwrap().save(&path).unwrap();

    let reloaded = Carrier::open(&path).unwrap();
    assert_eq!(codec.extract(&reloaded).unwrap(), payload);
}

#[test]
fn two_thousand_bytes_exceed_capacity() {
    let result = LsbCodec::default().embed(carrier_64(), &[0x5A; 2000]);
    assert!(matches!(result, Err(FractureError::CapacityExceeded { .. })));
}

#[test]
fn jpeg_output_is_refused() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("carrier.jpg");
    let stego = LsbCodec::default().embed(carrier_64(), b"hidden").unwrap();

    assert!(matches!(stego.save(&path), Err(FractureError::LossyFormat(_))));
    assert!(!path.exists());
}
