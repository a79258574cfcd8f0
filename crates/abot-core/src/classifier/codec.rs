//! Binary model format.
//!
//! ```text
//! magic    4 bytes  "ABNB"
//! version  u8
//! classes  u32 count, then per class: u32 len + UTF-8 name
//! per class, in class order:
//!   total  u64
//!   words  u32 count, then per word: u32 len + UTF-8 word, u64 count
//! learned  u64
//! seen     u64
//! ```
//!
//! Integers are little-endian. Words are written in sorted order so the
//! same model always encodes to the same bytes. A per-class dump is the
//! same layout with a single class.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::AtomicU64;

use bytes::{Buf, BufMut, BytesMut};
use tracing::debug;

use super::{ClassData, Classifier, ClassifierError, Result};

pub const MAGIC: &[u8; 4] = b"ABNB";
pub const VERSION: u8 = 1;

impl Classifier {
    /// Encode the whole model.
    pub fn to_bytes(&self) -> Vec<u8> {
        let indices: Vec<usize> = (0..self.classes.len()).collect();
        self.encode(&indices)
    }

    /// Decode a model produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        let classes = decode_classes(&mut buf)?;
        if classes.len() < 2 {
            return Err(ClassifierError::Config(format!(
                "model has {} classes, need at least two",
                classes.len()
            )));
        }
        let mut data = Vec::with_capacity(classes.len());
        for class in &classes {
            data.push(decode_class_data(&mut buf, class)?);
        }
        let learned = get_u64(&mut buf)?;
        let seen = get_u64(&mut buf)?;
        if buf.has_remaining() {
            return Err(codec_err(format!("{} trailing bytes", buf.remaining())));
        }
        for (i, class) in classes.iter().enumerate() {
            if classes[..i].contains(class) {
                return Err(ClassifierError::Config(format!("duplicate class: {class}")));
            }
        }
        Ok(Self {
            classes,
            data,
            learned,
            seen: AtomicU64::new(seen),
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.to_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut bytes = Vec::new();
        r.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Encode a single class in the model format.
    pub fn class_to_bytes(&self, class: &str) -> Result<Vec<u8>> {
        let idx = self
            .class_index(class)
            .ok_or_else(|| ClassifierError::UnknownClass(class.to_string()))?;
        Ok(self.encode(&[idx]))
    }

    pub fn write_class_to<W: Write>(&self, class: &str, w: &mut W) -> Result<()> {
        w.write_all(&self.class_to_bytes(class)?)?;
        Ok(())
    }

    /// Replace one class's data with a per-class dump.
    ///
    /// The dump's class must already exist in this model. The dump's
    /// `learned` and `seen` counters are ignored. Returns the class name.
    pub fn read_class_from<R: Read>(&mut self, r: &mut R) -> Result<String> {
        let mut bytes = Vec::new();
        r.read_to_end(&mut bytes)?;
        let mut buf = bytes.as_slice();
        let mut classes = decode_classes(&mut buf)?;
        let class = match classes.len() {
            1 => classes.remove(0),
            n => return Err(codec_err(format!("class dump holds {n} classes"))),
        };
        let idx = self
            .class_index(&class)
            .ok_or_else(|| ClassifierError::UnknownClass(class.clone()))?;
        let data = decode_class_data(&mut buf, &class)?;
        get_u64(&mut buf)?;
        get_u64(&mut buf)?;
        if buf.has_remaining() {
            return Err(codec_err(format!("{} trailing bytes", buf.remaining())));
        }
        self.data[idx] = data;
        Ok(class)
    }

    /// Write the model to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = self.to_bytes();
        std::fs::write(path, &bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "saved classifier model");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    fn encode(&self, indices: &[usize]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_slice(MAGIC);
        buf.put_u8(VERSION);
        buf.put_u32_le(indices.len() as u32);
        for &i in indices {
            put_str(&mut buf, &self.classes[i]);
        }
        for &i in indices {
            let data = &self.data[i];
            buf.put_u64_le(data.total);
            let mut words: Vec<(&String, &u64)> = data.freqs.iter().collect();
            words.sort_unstable_by(|a, b| a.0.cmp(b.0));
            buf.put_u32_le(words.len() as u32);
            for (word, count) in words {
                put_str(&mut buf, word);
                buf.put_u64_le(*count);
            }
        }
        buf.put_u64_le(self.learned);
        buf.put_u64_le(self.seen());
        buf.to_vec()
    }
}

fn codec_err(reason: impl Into<String>) -> ClassifierError {
    ClassifierError::Codec(reason.into())
}

fn put_str(buf: &mut BytesMut, s: &str) {
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn need(buf: &[u8], n: usize) -> Result<()> {
    if buf.remaining() < n {
        return Err(codec_err(format!(
            "truncated: need {n} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}

fn get_u32(buf: &mut &[u8]) -> Result<u32> {
    need(buf, 4)?;
    Ok(buf.get_u32_le())
}

fn get_u64(buf: &mut &[u8]) -> Result<u64> {
    need(buf, 8)?;
    Ok(buf.get_u64_le())
}

fn get_str(buf: &mut &[u8]) -> Result<String> {
    let len = get_u32(buf)? as usize;
    need(buf, len)?;
    let raw = buf[..len].to_vec();
    buf.advance(len);
    String::from_utf8(raw).map_err(|_| codec_err("invalid UTF-8 string"))
}

fn decode_classes(buf: &mut &[u8]) -> Result<Vec<String>> {
    need(buf, MAGIC.len() + 1)?;
    if &buf[..MAGIC.len()] != MAGIC {
        return Err(codec_err("bad magic"));
    }
    buf.advance(MAGIC.len());
    let version = buf.get_u8();
    if version != VERSION {
        return Err(codec_err(format!("unsupported version {version}")));
    }
    let count = get_u32(buf)? as usize;
    // Each name needs at least its 4-byte length prefix.
    need(buf, count.saturating_mul(4))?;
    let mut classes = Vec::with_capacity(count);
    for _ in 0..count {
        classes.push(get_str(buf)?);
    }
    Ok(classes)
}

fn decode_class_data(buf: &mut &[u8], class: &str) -> Result<ClassData> {
    let total = get_u64(buf)?;
    let words = get_u32(buf)? as usize;
    // Each entry is at least a length prefix and a count.
    need(buf, words.saturating_mul(12))?;
    let mut freqs = HashMap::with_capacity(words);
    let mut sum: u64 = 0;
    for _ in 0..words {
        let word = get_str(buf)?;
        let count = get_u64(buf)?;
        sum = sum.saturating_add(count);
        if freqs.insert(word, count).is_some() {
            return Err(codec_err(format!("duplicate word in class {class}")));
        }
    }
    if sum != total {
        return Err(codec_err(format!(
            "class {class}: word counts sum to {sum}, total is {total}"
        )));
    }
    Ok(ClassData { freqs, total })
}
