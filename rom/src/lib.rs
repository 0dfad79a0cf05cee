//! The binary image format (§6): a flat, header-less sequence of
//! big-endian 16-bit words, capped at 32768 words (strictly under 64 KiB).
//! Unlike the original framed container this crate is descended from,
//! there is no data/instruction split and no length prefix — the
//! assembler lays out `.space`/`.org` zero-fill and literal data in the
//! same word stream the decoder reads back.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RomError {
    #[error("program image has {0} words, exceeding the 32768-word limit")]
    TooLarge(usize),
}

pub const MAX_WORDS: usize = 32768;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Image {
    words: Vec<u16>,
}

impl Image {
    pub fn new() -> Image {
        Image::default()
    }

    pub fn from_words(words: Vec<u16>) -> Result<Image, RomError> {
        if words.len() > MAX_WORDS {
            return Err(RomError::TooLarge(words.len()));
        }
        Ok(Image { words })
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Pads with zero words up to `len`, used for `.space`/`.org` gaps.
    /// No-op if the image is already at least that long.
    pub fn pad_to(&mut self, len: usize) -> Result<(), RomError> {
        if len > MAX_WORDS {
            return Err(RomError::TooLarge(len));
        }
        if self.words.len() < len {
            self.words.resize(len, 0);
        }
        Ok(())
    }

    pub fn push(&mut self, word: u16) -> Result<(), RomError> {
        if self.words.len() >= MAX_WORDS {
            return Err(RomError::TooLarge(self.words.len() + 1));
        }
        self.words.push(word);
        Ok(())
    }
}

pub fn read<R: Read>(reader: &mut R) -> std::io::Result<Image> {
    let mut words = Vec::new();
    loop {
        match reader.read_u16::<BigEndian>() {
            Ok(word) => words.push(word),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
    }
    Image::from_words(words).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

pub fn write<W: Write>(writer: &mut W, image: &Image) -> std::io::Result<()> {
    for word in &image.words {
        writer.write_u16::<BigEndian>(*word)?;
    }
    Ok(())
}

pub trait ReadRomExt: Read + Sized {
    fn read_rom(&mut self) -> std::io::Result<Image> {
        read(self)
    }
}

impl<R: Read + Sized> ReadRomExt for R {}

pub trait WriteRomExt: Write + Sized {
    fn write_rom(&mut self, image: &Image) -> std::io::Result<()> {
        write(self, image)
    }
}

impl<W: Write + Sized> WriteRomExt for W {}

pub fn read_file<P: AsRef<Path>>(path: P) -> std::io::Result<Image> {
    BufReader::new(File::open(path)?).read_rom()
}

pub fn write_file<P: AsRef<Path>>(path: P, image: &Image) -> std::io::Result<()> {
    BufWriter::new(File::create(path)?).write_rom(image)
}

#[cfg(test)]
mod test;
