//! Minimal netpbm header probing for archive listings.

/// Header fields of a PPM/PGM/PBM image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PpmHeader {
    /// Magic number digit: `6` for binary PPM, `3` for ASCII PPM, and so on.
    pub kind: u8,
    pub width: u32,
    pub height: u32,
    pub max_value: u32,
    /// Byte offset of the first pixel.
    pub data_offset: usize,
}

impl PpmHeader {
    /// Parses the header at the start of `bytes`.
    ///
    /// Returns `None` when the bytes do not start with a well-formed netpbm
    /// header; comments (`#` to end of line) between fields are skipped.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 2 || bytes[0] != b'P' || !(b'1'..=b'6').contains(&bytes[1]) {
            return None;
        }
        let kind = bytes[1] - b'0';
        let mut cursor = 2;

        let width = next_field(bytes, &mut cursor)?;
        let height = next_field(bytes, &mut cursor)?;
        let max_value = if matches!(kind, 1 | 4) {
            1
        } else {
            next_field(bytes, &mut cursor)?
        };

        // Exactly one whitespace byte separates the header from the raster.
        match bytes.get(cursor) {
            Some(byte) if byte.is_ascii_whitespace() => cursor += 1,
            Some(_) => return None,
            None => {}
        }

        Some(Self {
            kind,
            width,
            height,
            max_value,
            data_offset: cursor,
        })
    }

    /// Bytes per pixel for binary color images, if known.
    pub fn channels(&self) -> Option<u32> {
        match self.kind {
            3 | 6 => Some(3),
            2 | 5 => Some(1),
            _ => None,
        }
    }
}

fn next_field(bytes: &[u8], cursor: &mut usize) -> Option<u32> {
    loop {
        match bytes.get(*cursor)? {
            b'#' => {
                while *bytes.get(*cursor)? != b'\n' {
                    *cursor += 1;
                }
            }
            byte if byte.is_ascii_whitespace() => *cursor += 1,
            _ => break,
        }
    }

    let start = *cursor;
    while bytes.get(*cursor).is_some_and(u8::is_ascii_digit) {
        *cursor += 1;
    }
    if start == *cursor {
        return None;
    }
    std::str::from_utf8(&bytes[start..*cursor]).ok()?.parse().ok()
}
