/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::{rngs::OsRng, Rng};
use trc::{AuthEvent, EventBuilder};

pub const PASSWORD_LEN: usize = 24;
const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!#%+-=?@^_~";

// Verified against when the username does not exist so that rejects take
// as long as a real verification.
const DUMMY_HASH: &str = "$argon2id$v=19$m=65536,t=3,p=1$c29tZXNhbHRzb21lc2FsdA$\
                          L1Z6Y0N5b72rVMDRnZ4mXZVzgHcrmpilWTbLVmJBQXY";

fn kdf() -> Argon2<'static> {
    // 64 MiB, 3 passes; around 100ms on current server hardware.
    Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        Params::new(64 * 1024, 3, 1, None).expect("static argon2 params"),
    )
}

/// CSPRNG password over a ~70 character alphabet.
pub fn generate_password() -> String {
    let mut rng = OsRng;
    (0..PASSWORD_LEN)
        .map(|_| PASSWORD_ALPHABET[rng.gen_range(0..PASSWORD_ALPHABET.len())] as char)
        .collect()
}

pub fn hash_password(password: &str) -> trc::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    kdf()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| {
            trc::EventType::Auth(AuthEvent::Failed)
                .reason(err)
                .details("password hashing failed")
        })
}

/// Verifies `password` against a stored secret, dispatching on the
/// detected scheme. Unknown usernames must call this with [`DUMMY_HASH`]
/// via [`verify_dummy`] so both paths do comparable work.
pub fn verify_password(password: &str, stored: &str) -> bool {
    // Dovecot-style {SCHEME} prefixes may wrap either format.
    let stored = stored
        .strip_prefix("{ARGON2ID}")
        .or_else(|| stored.strip_prefix("{ARGON2}"))
        .or_else(|| stored.strip_prefix("{CRYPT}"))
        .unwrap_or(stored);

    if stored.starts_with("$argon2") {
        PasswordHash::new(stored)
            .map(|hash| kdf().verify_password(password.as_bytes(), &hash).is_ok())
            .unwrap_or(false)
    } else if stored.starts_with('$') {
        pwhash::unix::verify(password, stored)
    } else {
        false
    }
}

pub fn verify_dummy(password: &str) {
    let _ = verify_password(password, DUMMY_HASH);
}

/// Preferred username is the routed address itself; mailboxes without an
/// alias fall back to a derived form with a random suffix.
pub fn derive_username(alias: Option<&str>, domain: &str) -> String {
    match alias {
        Some(alias) if !alias.is_empty() => {
            format!("{}@{}", alias, domain.to_lowercase())
        }
        _ => {
            let normalized: String = domain
                .to_lowercase()
                .replace('.', "-")
                .chars()
                .filter(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || *ch == '-')
                .collect();
            format!("encimap-{}-{}", normalized, utils::rand_suffix(6))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_shape() {
        let password = generate_password();
        assert_eq!(password.len(), PASSWORD_LEN);
        assert!(password
            .bytes()
            .all(|byte| PASSWORD_ALPHABET.contains(&byte)));
        assert_ne!(password, generate_password());
    }

    #[test]
    fn username_forms() {
        assert_eq!(
            derive_username(Some("cat"), "Call.Autoroad.LV"),
            "cat@call.autoroad.lv"
        );
        let fallback = derive_username(None, "call.autoroad.lv");
        assert!(fallback.starts_with("encimap-call-autoroad-lv-"));
        assert_eq!(fallback.len(), "encimap-call-autoroad-lv-".len() + 6);
    }

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("s3cr3tp4ss").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("s3cr3tp4ss", &hash));
        assert!(!verify_password("wrongpass", &hash));
        assert!(verify_password(
            "s3cr3tp4ss",
            &format!("{{ARGON2ID}}{hash}")
        ));
    }

    #[test]
    fn crypt_scheme_verify() {
        let hash = pwhash::sha512_crypt::hash("mypassword").unwrap();
        assert!(verify_password("mypassword", &hash));
        assert!(!verify_password("other", &hash));
    }

    #[test]
    fn plaintext_is_never_accepted() {
        assert!(!verify_password("letmein", "letmein"));
    }
}
