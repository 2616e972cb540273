//! Constant-pool rewriting for JVM class files.
//!
//! Every symbolic name in a class file (class, field and method names,
//! descriptors, signatures, string literals) lives in a `CONSTANT_Utf8`
//! entry of the constant pool. Rewriting those entries and copying the rest
//! of the file verbatim is enough to relocate a class: nothing after the
//! pool holds byte offsets into it.

use super::matcher::Rewriter;
use std::borrow::Cow;

const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];
const HEADER_LEN: usize = 8;

const TAG_UTF8: u8 = 1;

/// Errors arising from class-file parsing and rewriting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassFileError {
    /// The magic number is wrong.
    #[error("not a class file")]
    BadMagic,

    /// The file ended inside the header or constant pool.
    #[error("class file truncated at offset {offset}")]
    Truncated {
        /// Byte offset where more data was expected.
        offset: usize,
    },

    /// A constant uses a tag this parser does not know.
    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownTag {
        /// The unrecognised tag.
        tag: u8,
        /// Constant pool index.
        index: u32,
    },

    /// A rewritten constant no longer fits the format's 16-bit length.
    #[error("constant #{index} grows to {len} bytes, over the 65535 byte limit")]
    ConstantTooLong {
        /// Constant pool index.
        index: u32,
        /// Length after rewriting.
        len: usize,
    },

    /// A rewritten constant still references a relocated prefix.
    #[error("constant #{index} still references {prefix}")]
    Residual {
        /// Constant pool index.
        index: u32,
        /// The source prefix that survived.
        prefix: String,
    },
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], ClassFileError> {
        let end = self.offset.checked_add(len);
        let slice = end.and_then(|end| self.bytes.get(self.offset..end));
        let slice = slice.ok_or(ClassFileError::Truncated {
            offset: self.offset,
        })?;
        self.offset += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ClassFileError> {
        let offset = self.offset;
        self.take(1)?
            .first()
            .copied()
            .ok_or(ClassFileError::Truncated { offset })
    }

    fn u16(&mut self) -> Result<u16, ClassFileError> {
        match self.take(2)? {
            [high, low] => Ok(u16::from_be_bytes([*high, *low])),
            _ => Err(ClassFileError::Truncated {
                offset: self.offset,
            }),
        }
    }

    fn rest(&self) -> &'a [u8] {
        self.bytes.get(self.offset..).unwrap_or_default()
    }
}

/// Size in bytes of the payload of a non-UTF-8 constant, and how many pool
/// slots it occupies.
fn fixed_constant(tag: u8) -> Option<(usize, u32)> {
    match tag {
        7 | 8 | 16 | 19 | 20 => Some((2, 1)),
        15 => Some((3, 1)),
        3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => Some((4, 1)),
        5 | 6 => Some((8, 2)),
        _ => None,
    }
}

/// Walk the constant pool, letting `visit` replace each UTF-8 constant, and
/// return the re-encoded class file.
fn walk_pool<'a, F>(bytes: &'a [u8], mut visit: F) -> Result<Vec<u8>, ClassFileError>
where
    F: FnMut(u32, &'a [u8]) -> Result<Cow<'a, [u8]>, ClassFileError>,
{
    let mut reader = Reader { bytes, offset: 0 };
    let header = reader.take(HEADER_LEN)?;
    if !header.starts_with(&MAGIC) {
        return Err(ClassFileError::BadMagic);
    }
    let mut output = Vec::with_capacity(bytes.len());
    output.extend_from_slice(header);

    let count = reader.u16()?;
    output.extend_from_slice(&count.to_be_bytes());

    let mut index: u32 = 1;
    while index < u32::from(count) {
        let tag = reader.u8()?;
        output.push(tag);
        if tag == TAG_UTF8 {
            let len = reader.u16()?;
            let raw = reader.take(usize::from(len))?;
            let value = visit(index, raw)?;
            let new_len =
                u16::try_from(value.len()).map_err(|_| ClassFileError::ConstantTooLong {
                    index,
                    len: value.len(),
                })?;
            output.extend_from_slice(&new_len.to_be_bytes());
            output.extend_from_slice(&value);
            index += 1;
            continue;
        }
        let (size, slots) =
            fixed_constant(tag).ok_or(ClassFileError::UnknownTag { tag, index })?;
        output.extend_from_slice(reader.take(size)?);
        index += slots;
    }

    output.extend_from_slice(reader.rest());
    Ok(output)
}

/// Rewrite every UTF-8 constant of `bytes` with `rewriter`.
///
/// # Errors
///
/// Returns [`ClassFileError`] for malformed input, for constants that
/// outgrow the 16-bit length field, and when a rewritten constant still
/// references a relocated prefix.
pub fn rewrite_class(bytes: &[u8], rewriter: &Rewriter) -> Result<Vec<u8>, ClassFileError> {
    walk_pool(bytes, |index, raw| {
        let value = rewriter.rewrite(raw);
        if let Cow::Owned(rewritten) = &value {
            if let Some(rule) = rewriter.find_residual(rewritten) {
                return Err(ClassFileError::Residual {
                    index,
                    prefix: rule.source().to_owned(),
                });
            }
        }
        Ok(value)
    })
}

/// Decode every UTF-8 constant of a class file, lossily.
///
/// # Errors
///
/// Returns [`ClassFileError`] for malformed input.
pub fn utf8_constants(bytes: &[u8]) -> Result<Vec<String>, ClassFileError> {
    let mut constants = Vec::new();
    walk_pool(bytes, |_, raw| {
        constants.push(String::from_utf8_lossy(raw).into_owned());
        Ok(Cow::Borrowed(raw))
    })?;
    Ok(constants)
}
