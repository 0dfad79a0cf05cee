use super::*;
use tempfile::NamedTempFile;

#[test]
fn write_read_round_trip() {
    let file = NamedTempFile::new().unwrap();
    let image = Image::from_words(vec![0x001F, 0x1234, 0xbeef, 0]).unwrap();

    write_file(file.path(), &image).unwrap();
    let read_back = read_file(file.path()).unwrap();

    assert_eq!(image, read_back);
}

#[test]
fn pad_to_zero_fills() {
    let mut image = Image::from_words(vec![1, 2]).unwrap();
    image.pad_to(5).unwrap();
    assert_eq!(image.words(), &[1, 2, 0, 0, 0]);
}

#[test]
fn oversized_image_is_rejected() {
    assert!(Image::from_words(vec![0; MAX_WORDS + 1]).is_err());
}
