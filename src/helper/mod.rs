use std::ops::BitAnd;

pub fn has_flag<U, T: Into<U>>(value: U, flag: T) -> bool
    where U: BitAnd<Output = U> + PartialEq + Copy {
    let flag = flag.into();

    value & flag == flag
}

/// Decodes the "modified UTF-8" used by class files into UTF-16 code units.
///
/// NUL is encoded on two bytes and supplementary characters arrive as surrogate
/// pairs, each pair half on three bytes, so the result maps 1:1 onto a `char[]`.
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<Vec<u16>> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let a = bytes[i] as u16;
        if a & 0x80 == 0 {
            if a == 0 {
                return None;
            }
            units.push(a);
            i += 1;
        } else if a & 0xE0 == 0xC0 {
            let b = *bytes.get(i + 1)? as u16;
            if b & 0xC0 != 0x80 {
                return None;
            }
            units.push(((a & 0x1F) << 6) | (b & 0x3F));
            i += 2;
        } else if a & 0xF0 == 0xE0 {
            let b = *bytes.get(i + 1)? as u16;
            let c = *bytes.get(i + 2)? as u16;
            if b & 0xC0 != 0x80 || c & 0xC0 != 0x80 {
                return None;
            }
            units.push(((a & 0x0F) << 12) | ((b & 0x3F) << 6) | (c & 0x3F));
            i += 3;
        } else {
            return None;
        }
    }

    Some(units)
}

pub fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());

    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }

    out
}

/// Internal names use '/', the host facing side uses '.'.
pub fn to_internal_name(name: &str) -> String {
    name.replace('.', "/")
}

pub fn to_binary_name(name: &str) -> String {
    name.replace('/', ".")
}

#[cfg(test)]
mod test {
    use crate::helper::{decode_modified_utf8, encode_modified_utf8, has_flag};

    #[test]
    fn flags() {
        assert!(has_flag(0x0009u16, 0x0008u16));
        assert!(!has_flag(0x0001u16, 0x0008u16));
    }

    #[test]
    fn modified_utf8_nul_and_surrogates() {
        let s = "a\u{0}b\u{1F600}";
        let bytes = encode_modified_utf8(s);

        // NUL takes two bytes, the emoji two three-byte surrogate halves
        assert_eq!(&bytes[1..3], &[0xC0, 0x80]);
        assert_eq!(bytes.len(), 1 + 2 + 1 + 6);

        let units = decode_modified_utf8(&bytes).unwrap();
        assert_eq!(String::from_utf16(&units).unwrap(), s);
    }

    #[test]
    fn rejects_raw_nul_and_truncation() {
        assert_eq!(decode_modified_utf8(&[0x41, 0x00]), None);
        assert_eq!(decode_modified_utf8(&[0xE0, 0x80]), None);
    }
}
