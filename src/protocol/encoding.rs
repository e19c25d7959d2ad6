//! Text encoding used on the control connection.

use serde::Deserialize;

/// Character set used to decode reply lines and encode commands.
///
/// Any FTP server that follows RFC 2640 speaks UTF-8; Latin-1 is kept for
/// older servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum TextEncoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8", alias = "UTF-8")]
    Utf8,
    #[serde(rename = "latin-1", alias = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl TextEncoding {
    /// Decode bytes into a string, replacing anything that cannot be
    /// represented.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }

    /// Encode a string into bytes. Characters outside Latin-1 become `?`.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_round_trip() {
        let bytes = TextEncoding::Latin1.encode("caf\u{e9}");
        assert_eq!(bytes, vec![b'c', b'a', b'f', 0xe9]);
        assert_eq!(TextEncoding::Latin1.decode(&bytes), "caf\u{e9}");
    }

    #[test]
    fn test_latin1_replaces_wide_chars() {
        assert_eq!(TextEncoding::Latin1.encode("\u{263a}"), b"?".to_vec());
    }

    #[test]
    fn test_utf8_lossy_decode() {
        assert_eq!(TextEncoding::Utf8.decode(&[b'o', b'k', 0xff]), "ok\u{fffd}");
    }
}
