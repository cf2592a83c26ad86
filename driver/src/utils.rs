use alloc::vec::Vec;
use wdk_sys::{NTSTATUS, STATUS_INVALID_PARAMETER, UNICODE_STRING};

#[derive(Debug)]
/// A custom error enum for the PrcMon driver
pub enum DriverError {
    EmptyString,
    LengthTooLarge,
}

impl DriverError {
    pub fn status(&self) -> NTSTATUS {
        match self {
            DriverError::EmptyString | DriverError::LengthTooLarge => STATUS_INVALID_PARAMETER,
        }
    }
}

pub trait ToUnicodeString {
    fn to_unicode_string(&self) -> Result<UNICODE_STRING, DriverError>;
}

impl ToUnicodeString for Vec<u16> {
    fn to_unicode_string(&self) -> Result<UNICODE_STRING, DriverError> {
        create_unicode_string(self)
    }
}

/// Creates a Windows API compatible unicode string from a u16 slice.
///
/// The returned UNICODE_STRING points into `s`, so `s` has to outlive it.
///
/// <h1>Returns</h1>
/// Returns an error if the input is empty, or too long to describe in the u16 byte
/// length fields.
pub fn create_unicode_string(s: &[u16]) -> Result<UNICODE_STRING, DriverError> {
    let len = s.len();
    if len == 0 {
        return Err(DriverError::EmptyString);
    }
    if len * 2 > u16::MAX as usize {
        return Err(DriverError::LengthTooLarge);
    }

    // Length excludes the terminating null, MaximumLength covers the whole buffer
    let len_checked = if s[len - 1] == 0 { len - 1 } else { len };

    Ok(UNICODE_STRING {
        Length: (len_checked * 2) as u16,
        MaximumLength: (len * 2) as u16,
        Buffer: s.as_ptr() as *mut u16,
    })
}

pub trait ToU16Vec {
    fn to_u16_vec(&self) -> Vec<u16>;
}

impl ToU16Vec for &str {
    fn to_u16_vec(&self) -> Vec<u16> {
        // reserve space for null terminator
        let mut buf = Vec::with_capacity(self.len() + 1);
        buf.extend(self.encode_utf16());
        buf.push(0); // add null terminator
        buf
    }
}

/// Borrows the text of a UNICODE_STRING as UTF-16 units.
///
/// # Safety
///
/// `input` must be null or point to a valid UNICODE_STRING, and the slice must not be used
/// after that string is freed. For strings handed to a notify routine that means not past
/// the end of the callback.
pub unsafe fn unicode_as_slice<'a>(input: *const UNICODE_STRING) -> Option<&'a [u16]> {
    if input.is_null() {
        return None;
    }

    let unicode = &*input;
    if unicode.Buffer.is_null() || unicode.Length == 0 {
        return None;
    }

    Some(core::slice::from_raw_parts(unicode.Buffer, unicode.Length as usize / 2))
}
