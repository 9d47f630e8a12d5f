//! Raw CFITSIO header access.
//!
//! `fitsio` only reads keywords whose names are known in advance and has no
//! long-string (`CONTINUE`) writer. The two wrappers here cover what the
//! grid header needs, and every `unsafe` call into `fitsio_sys` in the
//! crate lives in this module.
//!
//! Both wrappers act on the current HDU of the file.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};

use fitsio::FitsFile;

use crate::grid::{GridError, HeaderValue};

/// FITS header card length plus the terminating NUL
const CARD_LEN: usize = 81;

/// Significant digits used when writing floating point keywords
const FLOAT_KEY_DIGITS: c_int = -15;

fn check_status(status: c_int, context: impl FnOnce() -> String) -> Result<(), GridError> {
    if status == 0 {
        Ok(())
    } else {
        Err(GridError::FitsStatus {
            status,
            context: context(),
        })
    }
}

fn c_string(value: &str) -> Result<CString, GridError> {
    CString::new(value).map_err(|_| GridError::InvalidString(value.to_string()))
}

/// Every header card of the current HDU, as raw 80-character records.
pub(crate) fn read_cards(f: &mut FitsFile) -> Result<Vec<String>, GridError> {
    let mut status: c_int = 0;
    let mut nexist: c_int = 0;
    let mut nmore: c_int = 0;

    // SAFETY: `f` is borrowed mutably for the whole function, so the
    // pointer stays valid and no other call moves the current HDU.
    let raw = unsafe { f.as_raw() };
    // SAFETY: the out-parameters are live locals.
    unsafe { fitsio_sys::ffghsp(raw, &mut nexist, &mut nmore, &mut status) };
    check_status(status, || "counting header keywords".to_string())?;

    let mut cards = Vec::with_capacity(usize::try_from(nexist).unwrap_or(0));
    let mut buffer: [c_char; CARD_LEN] = [0; CARD_LEN];
    for idx in 1..=nexist {
        // SAFETY: CFITSIO writes at most 80 characters plus NUL, which is
        // exactly CARD_LEN.
        unsafe { fitsio_sys::ffgrec(raw, idx, buffer.as_mut_ptr(), &mut status) };
        check_status(status, || format!("reading header card {idx}"))?;
        // SAFETY: a successful ffgrec leaves a NUL terminated card in buffer.
        let card = unsafe { CStr::from_ptr(buffer.as_ptr()) };
        cards.push(card.to_string_lossy().into_owned());
    }
    Ok(cards)
}

/// Write one keyword to the current HDU.
///
/// Strings longer than a card are split over `CONTINUE` cards. Non-finite
/// floats have no FITS representation and are skipped with a warning.
pub(crate) fn write_keyword(
    f: &mut FitsFile,
    key: &str,
    value: &HeaderValue,
) -> Result<(), GridError> {
    let name = c_string(key)?;
    let comment = c_string("")?;
    let name_ptr = name.as_ptr() as *mut c_char;
    let comment_ptr = comment.as_ptr() as *mut c_char;
    let mut status: c_int = 0;

    // SAFETY: `f` is borrowed mutably for the whole function, so the
    // pointer stays valid. CFITSIO does not write through the name, value
    // or comment pointers, and the CStrings outlive every call below.
    let raw = unsafe { f.as_raw() };
    match value {
        HeaderValue::Str(text) => {
            let text = c_string(text)?;
            unsafe {
                fitsio_sys::ffpkls(
                    raw,
                    name_ptr,
                    text.as_ptr() as *mut c_char,
                    comment_ptr,
                    &mut status,
                )
            };
        }
        HeaderValue::Int(v) => {
            unsafe { fitsio_sys::ffpkyj(raw, name_ptr, *v as _, comment_ptr, &mut status) };
        }
        HeaderValue::Float(v) => {
            if !v.is_finite() {
                log::warn!("Skipping non-finite header value {key}={v}");
                return Ok(());
            }
            unsafe {
                fitsio_sys::ffpkyd(raw, name_ptr, *v, FLOAT_KEY_DIGITS, comment_ptr, &mut status)
            };
        }
        HeaderValue::Bool(v) => {
            unsafe {
                fitsio_sys::ffpkyl(raw, name_ptr, c_int::from(*v), comment_ptr, &mut status)
            };
        }
    }
    check_status(status, || format!("writing header keyword {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fits::parse_cards;
    use tempfile::TempDir;

    #[test]
    fn test_keywords_survive_a_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys.fits");
        let long = (0..12)
            .map(|i| format!("HST_WFC3_F{i}75W"))
            .collect::<Vec<_>>()
            .join(" ");
        assert!(long.len() > 68);

        let mut f = FitsFile::create(&path).open().unwrap();
        write_keyword(&mut f, "FILTERS", &HeaderValue::Str(long.clone())).unwrap();
        write_keyword(&mut f, "NISO", &HeaderValue::Int(-42)).unwrap();
        write_keyword(&mut f, "ZREF", &HeaderValue::Float(0.0152)).unwrap();
        write_keyword(&mut f, "USEDUST", &HeaderValue::Bool(true)).unwrap();
        write_keyword(&mut f, "BAD", &HeaderValue::Float(f64::NAN)).unwrap();

        let cards = read_cards(&mut f).unwrap();
        assert!(cards.iter().any(|card| card.starts_with("CONTINUE")));
        assert!(cards.iter().all(|card| card.len() <= 80));
        assert!(!cards.iter().any(|card| card.starts_with("BAD")));

        let entries = parse_cards(&cards);
        let get = |key: &str| {
            entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(get("FILTERS"), Some(HeaderValue::Str(long)));
        assert_eq!(get("NISO"), Some(HeaderValue::Int(-42)));
        assert_eq!(get("ZREF"), Some(HeaderValue::Float(0.0152)));
        assert_eq!(get("USEDUST"), Some(HeaderValue::Bool(true)));
    }

    #[test]
    fn test_nul_in_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut f = FitsFile::create(dir.path().join("nul.fits")).open().unwrap();
        assert!(matches!(
            write_keyword(&mut f, "BAD\0KEY", &HeaderValue::Int(1)),
            Err(GridError::InvalidString(_))
        ));
    }
}
