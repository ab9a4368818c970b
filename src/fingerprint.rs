/// Fingerprint and identifier string handling.
///
/// The canonical lookup key throughout the service is the uppercase trailing
/// 16 hex characters of a key fingerprint ("fp16"). Comparison between
/// fingerprints of different lengths is suffix-tolerant.
use rand::Rng;

/// fp16 of a raw fingerprint (SHA-1 or SHA-256 of the public key packet).
pub fn fp16_from_bytes(raw: &[u8]) -> String {
    let fp = hex::encode_upper(raw);
    if fp.len() <= 16 {
        fp
    } else {
        fp[fp.len() - 16..].to_string()
    }
}

/// Maps an OpenPGP issuer key id to its fp16 form, zero-padded to 16 chars.
pub fn issuer_key_id_to_fp16(issuer_key_id: u64) -> String {
    format!("{issuer_key_id:016X}")
}

/// Suffix-tolerant fingerprint comparison. Two fingerprints match when one
/// is a suffix of the other; an empty side never matches.
pub fn compare_fingerprint(fp_a: &str, fp_b: &str) -> bool {
    if fp_a.is_empty() || fp_b.is_empty() {
        return false;
    }
    if fp_a.len() == fp_b.len() {
        return fp_a == fp_b;
    }
    if fp_a.len() > fp_b.len() {
        return fp_a.ends_with(fp_b);
    }
    fp_b.ends_with(fp_a)
}

/// Splits a key identifier of the form `Name <email>` into its fields.
/// Identifiers without an email part come back with an empty email.
pub fn extract_identifier_fields(identifier: &str) -> (String, String) {
    if let (Some(open), true) = (identifier.find('<'), identifier.ends_with('>')) {
        let name = identifier[..open].trim().to_string();
        let email = identifier[open + 1..identifier.len() - 1].trim().to_string();
        if !email.is_empty() {
            return (name, email);
        }
    }
    (identifier.to_string(), String::new())
}

const PASSWORD_BYTES: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890";
const DEFAULT_PASSWORD_LENGTH: usize = 14;

/// Generates an alphanumeric operator password.
pub fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    (0..DEFAULT_PASSWORD_LENGTH)
        .map(|_| PASSWORD_BYTES[rng.gen_range(0..PASSWORD_BYTES.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issuer_key_id_to_fp16() {
        assert_eq!(issuer_key_id_to_fp16(0xFFFF0000FFFF0000), "FFFF0000FFFF0000");
        assert_eq!(issuer_key_id_to_fp16(0xFFFF0000), "00000000FFFF0000");
    }

    #[test]
    fn test_compare_fingerprint() {
        assert!(!compare_fingerprint("", "auisiehuase"));
        assert!(!compare_fingerprint("asuieha", ""));
        assert!(!compare_fingerprint("", ""));

        assert!(compare_fingerprint("ABCDEFHG", "ABCDEFHG"));

        assert!(compare_fingerprint("1234567890", "4567890"));
        assert!(!compare_fingerprint("1234567890", "4569990"));
        assert!(compare_fingerprint("4567890", "1234567890"));
        assert!(!compare_fingerprint("4569990", "1234567890"));
    }

    #[test]
    fn test_fp16_from_bytes() {
        let raw: Vec<u8> = (0u8..20).collect();
        let fp16 = fp16_from_bytes(&raw);
        assert_eq!(fp16.len(), 16);
        assert_eq!(fp16, "0C0D0E0F10111213");
    }

    #[test]
    fn test_extract_identifier_fields() {
        let (name, email) = extract_identifier_fields("Remote Signer <signer@example.com>");
        assert_eq!(name, "Remote Signer");
        assert_eq!(email, "signer@example.com");

        let (name, email) = extract_identifier_fields("Benchmark Test");
        assert_eq!(name, "Benchmark Test");
        assert_eq!(email, "");
    }

    #[test]
    fn test_generate_password() {
        let p = generate_password();
        assert_eq!(p.len(), 14);
        assert!(p.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_password(), generate_password());
    }
}
