/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use aes::{
    cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit},
    Aes256,
};
use rand::{rngs::OsRng, RngCore};
use rasn::types::{Any, ObjectIdentifier, OctetString, SetOf};
use rasn_cms::{
    AlgorithmIdentifier, EncryptedContentInfo, EnvelopedData, IssuerAndSerialNumber,
    KeyTransRecipientInfo, RecipientIdentifier, RecipientInfo, CONTENT_DATA,
    CONTENT_ENVELOPED_DATA,
};
use rsa::{pkcs1::DecodeRsaPublicKey, Pkcs1v15Encrypt, RsaPublicKey};
use sha2::{Digest, Sha256};
use trc::{EventBuilder, IntakeEvent};

const AES256_CBC_OID: &[u32] = &[2, 16, 840, 1, 101, 3, 4, 1, 42];
const RSA_ENCRYPTION_OID: &[u32] = &[1, 2, 840, 113549, 1, 1, 1];

pub const SMIME_ALG: &str = "smime-aes256";

/// A recipient certificate, parsed once: the DER is kept for the
/// fingerprint, the decoded form for key transport.
pub struct Recipient {
    pub der: Vec<u8>,
    pub fingerprint: String,
    certificate: rasn_pkix::Certificate,
    public_key: RsaPublicKey,
}

impl Recipient {
    pub fn from_pem(pem_text: &str) -> trc::Result<Self> {
        let block = pem::parse(pem_text).map_err(|err| {
            trc::EventType::Intake(IntakeEvent::InvalidCertificate).reason(err)
        })?;
        Self::from_der(block.contents().to_vec())
    }

    pub fn from_der(der: Vec<u8>) -> trc::Result<Self> {
        let certificate = rasn::der::decode::<rasn_pkix::Certificate>(&der).map_err(|err| {
            trc::EventType::Intake(IntakeEvent::InvalidCertificate).reason(err)
        })?;
        let public_key = RsaPublicKey::from_pkcs1_der(
            certificate
                .tbs_certificate
                .subject_public_key_info
                .subject_public_key
                .as_raw_slice(),
        )
        .map_err(|err| {
            trc::EventType::Intake(IntakeEvent::InvalidCertificate)
                .reason(err)
                .details("certificate key is not RSA")
        })?;

        Ok(Recipient {
            fingerprint: fingerprint(&der),
            der,
            certificate,
            public_key,
        })
    }
}

/// SHA-256 over the certificate DER, lowercase hex.
pub fn fingerprint(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Builds an RFC 5652 EnvelopedData over `message`: a fresh AES-256 key
/// encrypts the content in CBC mode, and the key is transported to every
/// recipient with PKCS#1 v1.5 RSA. Recipient order follows the caller.
pub fn encrypt(recipients: &[Recipient], message: &[u8]) -> trc::Result<Vec<u8>> {
    let mut rng = OsRng;
    let mut key = [0u8; 32];
    let mut iv = [0u8; 16];
    rng.fill_bytes(&mut key);
    rng.fill_bytes(&mut iv);

    let encrypted_content =
        cbc::Encryptor::<Aes256>::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(message);

    let mut recipient_infos = SetOf::new();
    for recipient in recipients {
        let encrypted_key = recipient
            .public_key
            .encrypt(&mut rng, Pkcs1v15Encrypt, &key[..])
            .map_err(|err| {
                trc::EventType::Intake(IntakeEvent::EncryptError)
                    .reason(err)
                    .details("RSA key transport failed")
            })?;
        recipient_infos.insert(RecipientInfo::KeyTransRecipientInfo(KeyTransRecipientInfo {
            version: 0.into(),
            rid: RecipientIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                issuer: recipient.certificate.tbs_certificate.issuer.clone(),
                serial_number: recipient.certificate.tbs_certificate.serial_number.clone(),
            }),
            key_encryption_algorithm: AlgorithmIdentifier {
                algorithm: ObjectIdentifier::new_unchecked(RSA_ENCRYPTION_OID.into()),
                parameters: Some(Any::new(encode_null())),
            },
            encrypted_key: encrypted_key.into(),
        }));
    }

    let enveloped = rasn::der::encode(&EnvelopedData {
        version: 0.into(),
        originator_info: None,
        recipient_infos,
        encrypted_content_info: EncryptedContentInfo {
            content_type: CONTENT_DATA.into(),
            content_encryption_algorithm: AlgorithmIdentifier {
                algorithm: ObjectIdentifier::new_unchecked(AES256_CBC_OID.into()),
                parameters: Some(Any::new(
                    rasn::der::encode(&OctetString::from(iv.to_vec())).unwrap_or_default(),
                )),
            },
            encrypted_content: Some(encrypted_content.into()),
        },
        unprotected_attrs: None,
    })
    .map_err(|err| {
        trc::EventType::Intake(IntakeEvent::EncryptError)
            .reason(err)
            .details("EnvelopedData encoding failed")
    })?;

    rasn::der::encode(&rasn_cms::pkcs7_compat::EncapsulatedContentInfo {
        content_type: CONTENT_ENVELOPED_DATA.into(),
        content: Some(Any::new(enveloped)),
    })
    .map_err(|err| {
        trc::EventType::Intake(IntakeEvent::EncryptError)
            .reason(err)
            .details("ContentInfo encoding failed")
    })
}

/// Wraps the DER ciphertext in the message the IMAP client sees. The
/// original message, headers included, is the protected content; the
/// outer headers carry only the S/MIME envelope.
pub fn wrap_mime(pkcs7: &[u8]) -> Vec<u8> {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let encoded = STANDARD.encode(pkcs7);
    let mut out = Vec::with_capacity(encoded.len() + encoded.len() / 76 + 256);
    out.extend_from_slice(b"MIME-Version: 1.0\r\n");
    out.extend_from_slice(
        b"Content-Type: application/x-pkcs7-mime; smime-type=enveloped-data; name=\"smime.p7m\"\r\n",
    );
    out.extend_from_slice(b"Content-Transfer-Encoding: base64\r\n");
    out.extend_from_slice(b"Content-Disposition: attachment; filename=\"smime.p7m\"\r\n\r\n");
    for chunk in encoded.as_bytes().chunks(76) {
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    out
}

fn encode_null() -> Vec<u8> {
    rasn::der::encode(&()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::{
        pkcs8::EncodePrivateKey, traits::PublicKeyParts, RsaPrivateKey,
    };

    fn test_recipient() -> (RsaPrivateKey, Recipient) {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let pkcs8 = private_key.to_pkcs8_der().unwrap();
        let key_pair = rcgen::KeyPair::try_from(pkcs8.as_bytes()).unwrap();
        let mut params = rcgen::CertificateParams::new(Vec::new()).unwrap();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "cat@call.autoroad.lv");
        let cert = params.self_signed(&key_pair).unwrap();
        let recipient = Recipient::from_der(cert.der().to_vec()).unwrap();
        (private_key, recipient)
    }

    fn decrypt(private_key: &RsaPrivateKey, pkcs7: &[u8]) -> Vec<u8> {
        use aes::cipher::{block_padding::Pkcs7 as Pad, BlockDecryptMut};

        let content_info = rasn::der::decode::<rasn_cms::pkcs7_compat::EncapsulatedContentInfo>(
            pkcs7,
        )
        .unwrap();
        let enveloped =
            rasn::der::decode::<EnvelopedData>(content_info.content.unwrap().as_bytes()).unwrap();

        let encrypted_key = match enveloped.recipient_infos.first().unwrap() {
            RecipientInfo::KeyTransRecipientInfo(info) => info.encrypted_key.to_vec(),
            _ => panic!("unexpected recipient info"),
        };
        let key = private_key
            .decrypt(Pkcs1v15Encrypt, &encrypted_key)
            .unwrap();

        let iv = rasn::der::decode::<OctetString>(
            enveloped
                .encrypted_content_info
                .content_encryption_algorithm
                .parameters
                .as_ref()
                .unwrap()
                .as_bytes(),
        )
        .unwrap();
        let ciphertext = enveloped
            .encrypted_content_info
            .encrypted_content
            .unwrap()
            .to_vec();

        let key: [u8; 32] = key.as_slice().try_into().unwrap();
        let iv: [u8; 16] = iv.as_ref().try_into().unwrap();
        cbc::Decryptor::<Aes256>::new(&key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pad>(&ciphertext)
            .unwrap()
    }

    #[test]
    fn round_trip_single_recipient() {
        let (private_key, recipient) = test_recipient();
        let message = b"From: x@gmail.com\r\nTo: cat@call.autoroad.lv\r\nSubject: T\r\n\r\nhi";
        let pkcs7 = encrypt(std::slice::from_ref(&recipient), message).unwrap();
        assert_eq!(decrypt(&private_key, &pkcs7), message.to_vec());
    }

    #[test]
    fn multiple_recipients_receive_the_same_content() {
        let (key_a, recipient_a) = test_recipient();
        let (key_b, recipient_b) = test_recipient();
        let message = b"Subject: shared\r\n\r\npayload";
        let pkcs7 = encrypt(&[recipient_a, recipient_b], message).unwrap();
        assert_eq!(decrypt(&key_a, &pkcs7), message.to_vec());
        assert_eq!(decrypt(&key_b, &pkcs7), message.to_vec());
    }

    #[test]
    fn fingerprint_is_sha256_of_der() {
        let (_, recipient) = test_recipient();
        let digest = Sha256::digest(&recipient.der);
        assert_eq!(recipient.fingerprint.len(), 64);
        assert!(recipient
            .fingerprint
            .starts_with(&format!("{:02x}", digest[0])));
        let _ = recipient.public_key.n();
    }

    #[test]
    fn mime_wrapper_shape() {
        let body = wrap_mime(b"\x30\x03\x02\x01\x01");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("MIME-Version: 1.0\r\n"));
        assert!(text.contains("Content-Type: application/x-pkcs7-mime"));
        assert!(text.contains("smime-type=enveloped-data"));
        assert!(text.ends_with("\r\n"));
    }
}
