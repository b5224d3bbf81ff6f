//! Subject export file format.
//!
//! # Responsibility
//! - Encode one subject and its ordered notes into the export byte format.
//! - Decode export bytes, decrypting the note block when needed.
//!
//! # Format
//! The whole file is zlib (DEFLATE) compressed. Decompressed, all integers
//! big-endian:
//!
//! ```text
//! u32 title_len | title | i32 sort_order | u8 flag
//!   flag = 0: note list
//!   flag = 1: u32 key_iterations | u32 block_len | sealed(note list)
//! note list := u32 count | count x (str title | str content | u8 has_color [str color])
//! str       := u32 len | utf-8 bytes
//! ```
//!
//! # Invariants
//! - Note order in the file is the subject's display order.
//! - Trailing bytes after the last field are rejected.
//! - The export key's PBKDF2 iteration count travels in the file, so
//!   decoding never depends on local settings.

use crate::crypto::{cipher, CryptoError};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{Read, Write};

mod wire;

use wire::{WireReader, WireWriter};

const FLAG_PLAIN: u8 = 0;
const FLAG_ENCRYPTED: u8 = 1;
/// Upper bound on the key iterations a file may request.
const MAX_KEY_ITERATIONS: u32 = 10_000_000;
/// Upper bound on decompressed size, guarding against zip bombs.
const MAX_DECOMPRESSED_BYTES: u64 = 64 * 1024 * 1024;

/// Note as carried in an export file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedNote {
    pub title: String,
    pub content: String,
    pub color: Option<String>,
}

/// Decoded export file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedSubject {
    pub title: String,
    pub sort_order: i32,
    pub encrypted: bool,
    pub notes: Vec<ExportedNote>,
}

/// Tunables for encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// PBKDF2 iterations for the export key, recorded in the file.
    pub key_iterations: u32,
    /// zlib level, 0..=9.
    pub compression_level: u32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            key_iterations: crate::crypto::password::DEFAULT_HASH_ITERATIONS,
            compression_level: 6,
        }
    }
}

#[derive(Debug)]
pub enum ExportError {
    Io(std::io::Error),
    /// Input does not follow the export layout.
    Malformed(String),
    /// File is encrypted and no password was supplied.
    PasswordRequired,
    /// Wrong password or tampered ciphertext.
    Decryption,
    Crypto(CryptoError),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "export i/o failed: {err}"),
            Self::Malformed(message) => write!(f, "malformed export file: {message}"),
            Self::PasswordRequired => write!(f, "export file is encrypted; password required"),
            Self::Decryption => write!(f, "export file could not be decrypted"),
            Self::Crypto(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Crypto(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<CryptoError> for ExportError {
    fn from(value: CryptoError) -> Self {
        match value {
            CryptoError::DecryptionFailed => Self::Decryption,
            CryptoError::TruncatedBlock => {
                Self::Malformed("encrypted block is truncated".to_string())
            }
            other => Self::Crypto(other),
        }
    }
}

/// Encodes a subject into export bytes.
///
/// A `Some` non-empty password encrypts the note list; `None` or an empty
/// password writes it in plain form.
pub fn encode_export(
    title: &str,
    sort_order: i32,
    notes: &[ExportedNote],
    password: Option<&str>,
    options: ExportOptions,
) -> Result<Vec<u8>, ExportError> {
    let mut body = WireWriter::new();
    body.put_str(title)?;
    body.put_i32(sort_order);

    let note_list = encode_note_list(notes)?;
    match password.filter(|value| !value.is_empty()) {
        Some(password) => {
            let iterations = options.key_iterations.clamp(1, MAX_KEY_ITERATIONS);
            let sealed = cipher::seal(password, &note_list, iterations)?;
            body.put_u8(FLAG_ENCRYPTED);
            body.put_u32(iterations);
            body.put_bytes(&sealed)?;
        }
        None => {
            body.put_u8(FLAG_PLAIN);
            body.put_raw(&note_list);
        }
    }

    let mut encoder = ZlibEncoder::new(
        Vec::new(),
        Compression::new(options.compression_level.min(9)),
    );
    encoder.write_all(&body.into_inner())?;
    Ok(encoder.finish()?)
}

/// Decodes export bytes.
///
/// # Errors
/// - `PasswordRequired` when the file is encrypted and `password` is `None`.
/// - `Decryption` on a wrong password.
/// - `Malformed` on truncated, oversized or trailing data, or an
///   out-of-range key iteration count.
pub fn decode_export(bytes: &[u8], password: Option<&str>) -> Result<ExportedSubject, ExportError> {
    let body = decompress(bytes)?;
    let mut reader = WireReader::new(&body);
    let title = reader.get_str()?;
    let sort_order = reader.get_i32()?;
    let flag = reader.get_u8()?;

    let (encrypted, notes) = match flag {
        FLAG_PLAIN => (false, decode_note_list(&mut reader)?),
        FLAG_ENCRYPTED => {
            let iterations = reader.get_u32()?;
            if !(1..=MAX_KEY_ITERATIONS).contains(&iterations) {
                return Err(ExportError::Malformed(format!(
                    "key iteration count {iterations} out of range"
                )));
            }
            let sealed = reader.get_bytes()?;
            let password = password
                .filter(|value| !value.is_empty())
                .ok_or(ExportError::PasswordRequired)?;
            let plain = cipher::open(password, sealed, iterations)?;
            let mut inner = WireReader::new(&plain);
            let notes = decode_note_list(&mut inner)?;
            inner.finish()?;
            (true, notes)
        }
        other => {
            return Err(ExportError::Malformed(format!(
                "unknown encryption flag {other}"
            )))
        }
    };
    reader.finish()?;

    Ok(ExportedSubject {
        title,
        sort_order,
        encrypted,
        notes,
    })
}

/// Returns whether export bytes carry an encrypted note list.
pub fn is_encrypted_export(bytes: &[u8]) -> Result<bool, ExportError> {
    let body = decompress(bytes)?;
    let mut reader = WireReader::new(&body);
    reader.get_str()?;
    reader.get_i32()?;
    match reader.get_u8()? {
        FLAG_PLAIN => Ok(false),
        FLAG_ENCRYPTED => Ok(true),
        other => Err(ExportError::Malformed(format!(
            "unknown encryption flag {other}"
        ))),
    }
}

fn encode_note_list(notes: &[ExportedNote]) -> Result<Vec<u8>, ExportError> {
    let mut writer = WireWriter::new();
    writer.put_len(notes.len())?;
    for note in notes {
        writer.put_str(&note.title)?;
        writer.put_str(&note.content)?;
        match &note.color {
            Some(color) => {
                writer.put_u8(1);
                writer.put_str(color)?;
            }
            None => writer.put_u8(0),
        }
    }
    Ok(writer.into_inner())
}

fn decode_note_list(reader: &mut WireReader<'_>) -> Result<Vec<ExportedNote>, ExportError> {
    let count = reader.get_u32()? as usize;
    // Each note needs at least 9 bytes; cap preallocation by remaining input.
    let mut notes = Vec::with_capacity(count.min(reader.remaining() / 9));
    for _ in 0..count {
        let title = reader.get_str()?;
        let content = reader.get_str()?;
        let color = match reader.get_u8()? {
            0 => None,
            1 => Some(reader.get_str()?),
            other => {
                return Err(ExportError::Malformed(format!(
                    "invalid color marker {other}"
                )))
            }
        };
        notes.push(ExportedNote {
            title,
            content,
            color,
        });
    }
    Ok(notes)
}

fn decompress(bytes: &[u8]) -> Result<Vec<u8>, ExportError> {
    let mut decoder = ZlibDecoder::new(bytes).take(MAX_DECOMPRESSED_BYTES + 1);
    let mut body = Vec::new();
    decoder
        .read_to_end(&mut body)
        .map_err(|err| ExportError::Malformed(format!("decompression failed: {err}")))?;
    if body.len() as u64 > MAX_DECOMPRESSED_BYTES {
        return Err(ExportError::Malformed(
            "decompressed export exceeds size limit".to_string(),
        ));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::{
        decode_export, encode_export, is_encrypted_export, ExportError, ExportOptions,
        ExportedNote,
    };
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn options() -> ExportOptions {
        ExportOptions {
            key_iterations: 1_000,
            compression_level: 6,
        }
    }

    fn sample_notes() -> Vec<ExportedNote> {
        vec![
            ExportedNote {
                title: "Kinematics".to_string(),
                content: "v = u + at".to_string(),
                color: Some("#ff0000".to_string()),
            },
            ExportedNote {
                title: "Dynamics".to_string(),
                content: "F = ma".to_string(),
                color: None,
            },
        ]
    }

    fn zlib(raw: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(raw).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn plain_header_layout_is_big_endian() {
        let bytes = encode_export("Ab", 3, &[], None, options()).unwrap();
        let raw = super::decompress(&bytes).unwrap();
        assert_eq!(
            raw,
            vec![0, 0, 0, 2, b'A', b'b', 0, 0, 0, 3, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn encrypted_export_requires_password() {
        let bytes =
            encode_export("Physics", 0, &sample_notes(), Some("password1"), options()).unwrap();
        assert!(is_encrypted_export(&bytes).unwrap());
        assert!(matches!(
            decode_export(&bytes, None),
            Err(ExportError::PasswordRequired)
        ));
        assert!(matches!(
            decode_export(&bytes, Some("password2")),
            Err(ExportError::Decryption)
        ));

        let decoded = decode_export(&bytes, Some("password1")).unwrap();
        assert!(decoded.encrypted);
        assert_eq!(decoded.notes, sample_notes());
    }

    #[test]
    fn encrypted_export_opens_regardless_of_local_iterations() {
        let strong = ExportOptions {
            key_iterations: 20_000,
            compression_level: 6,
        };
        let bytes =
            encode_export("Physics", 0, &sample_notes(), Some("password1"), strong).unwrap();

        let raw = super::decompress(&bytes).unwrap();
        // title(4 + 7) | sort_order(4) | flag(1) | key_iterations(4)
        assert_eq!(raw[15], 1);
        assert_eq!(&raw[16..20], &20_000u32.to_be_bytes());

        let decoded = decode_export(&bytes, Some("password1")).unwrap();
        assert_eq!(decoded.notes, sample_notes());
    }

    #[test]
    fn zero_key_iterations_are_rejected() {
        let mut raw = vec![0, 0, 0, 0, 0, 0, 0, 0, 1];
        raw.extend_from_slice(&0u32.to_be_bytes());
        raw.extend_from_slice(&[0, 0, 0, 0]);
        let err = decode_export(&zlib(&raw), Some("password1")).unwrap_err();
        assert!(err.to_string().contains("key iteration count 0"));
    }

    #[test]
    fn empty_password_writes_plain_export() {
        let bytes = encode_export("Physics", 0, &sample_notes(), Some(""), options()).unwrap();
        assert!(!is_encrypted_export(&bytes).unwrap());
    }

    #[test]
    fn truncated_body_is_malformed() {
        let err = decode_export(&zlib(&[0, 0, 0, 9, b'x']), None).unwrap_err();
        assert!(matches!(err, ExportError::Malformed(_)));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let raw = vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff];
        let err = decode_export(&zlib(&raw), None).unwrap_err();
        assert!(matches!(err, ExportError::Malformed(_)));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let raw = vec![0, 0, 0, 0, 0, 0, 0, 0, 7];
        let err = decode_export(&zlib(&raw), None).unwrap_err();
        assert!(err.to_string().contains("unknown encryption flag 7"));
    }

    #[test]
    fn non_zlib_input_is_malformed() {
        let err = decode_export(b"definitely not zlib", None).unwrap_err();
        assert!(matches!(err, ExportError::Malformed(_)));
    }
}
