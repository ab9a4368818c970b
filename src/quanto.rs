/// Signature codec: translation between ASCII-armored OpenPGP signatures and
/// the compact single-line "Quanto" form, plus repair of malformed armor.
///
/// A Quanto signature is `<fingerprint>_<HASH>_<base64 payload + CRC24>`.
/// The two forms are lossless with respect to each other: payload bytes,
/// CRC, fingerprint and hash algorithm all round-trip.
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{Result, SignerError};

const SIG_HEADER: &str = "-----BEGIN PGP SIGNATURE-----";
const SIG_FOOTER: &str = "-----END PGP SIGNATURE-----";

const CRC24_INIT: u32 = 0xb704ce;
const CRC24_POLY: u32 = 0x1864cfb;

/// OpenPGP CRC-24 checksum (RFC 4880, section 6.1).
pub fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;
    for b in data {
        crc ^= (*b as u32) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x1000000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }
    crc & 0xffffff
}

fn crc24_armor_line(data: &[u8]) -> String {
    let crc = crc24(data);
    let bytes = [(crc >> 16) as u8, (crc >> 8) as u8, crc as u8];
    format!("={}", BASE64.encode(bytes))
}

/// Converts a Quanto signature to ASCII armor. Returns an empty string on
/// malformed input: wrong field count, or a payload that does not decode as
/// base64 under either the 5-char (`=XXXX`) or bare 4-char CRC split.
pub fn quanto_to_armored(signature: &str) -> String {
    let mut fields: Vec<&str> = signature.split('$').collect();
    if fields.len() != 3 {
        fields = signature.split('_').collect();
    }
    if fields.len() != 3 {
        return String::new();
    }

    let payload = fields[2];
    if payload.len() < 5 {
        return String::new();
    }

    // The checksum tail is either 5 chars ("=XXXX") or a bare 4 chars;
    // probe by decoding the remainder.
    let (body, checksum) = if BASE64.decode(&payload[..payload.len() - 5]).is_ok() {
        payload.split_at(payload.len() - 5)
    } else if BASE64.decode(&payload[..payload.len() - 4]).is_ok() {
        payload.split_at(payload.len() - 4)
    } else {
        return String::new();
    };

    let mut sig = format!("{SIG_HEADER}\nVersion: Quanto\n");
    for (i, c) in body.bytes().enumerate() {
        if i % 64 == 0 {
            sig.push('\n');
        }
        sig.push(c as char);
    }
    sig.push('\n');
    sig.push_str(checksum);
    sig.push('\n');
    sig.push_str(SIG_FOOTER);
    sig
}

/// Converts an ASCII-armored signature to the Quanto form. The armor headers
/// up to the first blank line are stripped and the base64 body (trailing CRC
/// included) is joined into a single line.
pub fn armored_to_quanto(signature: &str, fingerprint: &str, hash: &str) -> String {
    let hash_name = hash.to_uppercase();
    let trimmed = signature.trim_matches([' ', '\r', '\n']);
    let lines = broken_macos_fix(
        trimmed.split('\n').map(str::to_string).collect(),
        true,
    );

    let mut payload = String::new();
    let mut save = false;
    for line in lines.iter().take(lines.len().saturating_sub(1)).skip(1) {
        if !save {
            // Wait for the blank line that ends the armor headers.
            if line.is_empty() {
                save = true;
            }
        } else {
            payload.push_str(line);
        }
    }

    format!("{fingerprint}_{hash_name}_{payload}")
}

/// Inserts the blank header line missing from signatures produced by broken
/// macOS clients. The heuristic is the absence of any blank line in the body.
fn broken_macos_fix(mut lines: Vec<String>, include_head: bool) -> Vec<String> {
    if include_head {
        let broken = !lines
            .iter()
            .take(lines.len().saturating_sub(1))
            .skip(1)
            .any(|l| l.is_empty());
        if broken {
            lines.insert(1.min(lines.len()), String::new());
        }
    } else {
        let broken = !lines
            .iter()
            .take(lines.len().saturating_sub(1))
            .any(|l| l.is_empty());
        if broken {
            lines.insert(0, String::new());
        }
    }
    lines
}

/// Normalizes a possibly malformed armored signature: re-wraps the base64 at
/// 64 columns, restores the blank header line and recomputes the CRC24 line
/// when it is absent. Input without an armor frame is returned unchanged.
pub fn signature_fix(sig: &str) -> Result<String> {
    let Some(start) = sig.find(SIG_HEADER) else {
        return Ok(sig.to_string());
    };
    let after_header = start + SIG_HEADER.len();
    if !sig[after_header..].starts_with('\n') {
        return Ok(sig.to_string());
    }
    let body_start = after_header + 1;
    let Some(end) = sig[body_start..].rfind(SIG_FOOTER) else {
        return Ok(sig.to_string());
    };
    let inner = &sig[body_start..body_start + end];

    let data = broken_macos_fix(
        inner
            .trim_matches(' ')
            .split('\n')
            .map(str::to_string)
            .collect(),
        false,
    );

    let mut payload = String::new();
    let mut embedded_crc = false;
    if data.len() == 1 {
        payload = data[0].clone();
    } else {
        let mut save = false;
        for line in &data {
            if !save {
                if line.is_empty() {
                    save = true;
                }
            } else if !line.is_empty() && !line.starts_with('=') && line.len() != 5 {
                payload.push_str(line);
                if line.len() == 4 {
                    embedded_crc = true;
                }
            }
        }
    }

    let decoded = BASE64
        .decode(&payload)
        .map_err(|e| SignerError::InvalidSignatureFormat(format!("broken base64: {e}")))?;

    let mut fixed = String::from(SIG_HEADER);
    fixed.push('\n');
    for (i, c) in payload.bytes().enumerate() {
        if i % 64 == 0 {
            fixed.push('\n');
        }
        fixed.push(c as char);
    }
    fixed.push('\n');
    if !embedded_crc {
        fixed.push_str(&crc24_armor_line(&decoded));
    }
    fixed.push('\n');
    fixed.push_str(SIG_FOOTER);
    Ok(fixed)
}
