//! The CBOR head: a major type packed with a 5-bit argument, followed by
//! 0/1/2/4/8 bytes of argument payload. Writes always pick the shortest
//! form; reads optionally enforce it.

use crate::cursor::Reader;
use crate::{CborError, ErrorKind};

pub(crate) const MAJOR_UNSIGNED: u8 = 0;
pub(crate) const MAJOR_NEGATIVE: u8 = 1;
pub(crate) const MAJOR_BYTES: u8 = 2;
pub(crate) const MAJOR_TEXT: u8 = 3;
pub(crate) const MAJOR_ARRAY: u8 = 4;
pub(crate) const MAJOR_MAP: u8 = 5;
pub(crate) const MAJOR_TAG: u8 = 6;
pub(crate) const MAJOR_SIMPLE: u8 = 7;

/// Additional-info value signalling an indefinite length (or, with major
/// type 7, the break marker).
pub(crate) const AI_INDEFINITE: u8 = 31;

/// The break byte closing an indefinite-length container.
pub(crate) const BREAK: u8 = 0xff;

/// Write the shortest head for `(major, arg)`.
pub(crate) fn write_head(out: &mut Vec<u8>, major: u8, arg: u64) {
    debug_assert!(major <= 7);
    if arg < 24 {
        out.push((major << 5) | arg as u8);
    } else if arg <= 0xff {
        out.push((major << 5) | 24);
        out.push(arg as u8);
    } else if arg <= 0xffff {
        out.push((major << 5) | 25);
        out.extend_from_slice(&(arg as u16).to_be_bytes());
    } else if arg <= 0xffff_ffff {
        out.push((major << 5) | 26);
        out.extend_from_slice(&(arg as u32).to_be_bytes());
    } else {
        out.push((major << 5) | 27);
        out.extend_from_slice(&arg.to_be_bytes());
    }
}

/// Write an indefinite-length head for `major`.
pub(crate) fn write_indefinite(out: &mut Vec<u8>, major: u8) {
    out.push((major << 5) | AI_INDEFINITE);
}

/// Length in bytes of the shortest head carrying `arg`.
pub(crate) const fn head_len(arg: u64) -> usize {
    if arg < 24 {
        1
    } else if arg <= 0xff {
        2
    } else if arg <= 0xffff {
        3
    } else if arg <= 0xffff_ffff {
        5
    } else {
        9
    }
}

/// Read the initial byte, split into (major, additional info).
pub(crate) fn read_initial(r: &mut Reader<'_>) -> Result<(u8, u8), CborError> {
    let ib = r.read_u8()?;
    Ok((ib >> 5, ib & 0x1f))
}

/// Read the integer argument selected by additional info `ai`.
///
/// Rejects the reserved values 28..30 and, when `minimal` is set, any
/// argument that is not in its shortest form. Indefinite (31) is rejected
/// here; callers that accept it must check before calling.
pub(crate) fn read_arg(
    r: &mut Reader<'_>,
    ai: u8,
    off: usize,
    minimal: bool,
) -> Result<u64, CborError> {
    match ai {
        0..=23 => Ok(u64::from(ai)),
        24 => {
            let v = u64::from(r.read_u8()?);
            if minimal && v < 24 {
                return Err(CborError::new(ErrorKind::NonMinimalEncoding, off));
            }
            Ok(v)
        }
        25 => {
            let v = u64::from(r.read_be_u16()?);
            if minimal && u8::try_from(v).is_ok() {
                return Err(CborError::new(ErrorKind::NonMinimalEncoding, off));
            }
            Ok(v)
        }
        26 => {
            let v = u64::from(r.read_be_u32()?);
            if minimal && u16::try_from(v).is_ok() {
                return Err(CborError::new(ErrorKind::NonMinimalEncoding, off));
            }
            Ok(v)
        }
        27 => {
            let v = r.read_be_u64()?;
            if minimal && u32::try_from(v).is_ok() {
                return Err(CborError::new(ErrorKind::NonMinimalEncoding, off));
            }
            Ok(v)
        }
        _ => Err(CborError::new(ErrorKind::ReservedAdditionalInfo, off)),
    }
}

/// Read a length argument and narrow it to `usize`.
pub(crate) fn read_len(
    r: &mut Reader<'_>,
    ai: u8,
    off: usize,
    minimal: bool,
) -> Result<usize, CborError> {
    let len = read_arg(r, ai, off, minimal)?;
    usize::try_from(len).map_err(|_| CborError::new(ErrorKind::LengthOverflow, off))
}
