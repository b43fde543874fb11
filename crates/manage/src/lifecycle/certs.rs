/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs Ltd <hello@stalw.art>
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

use std::future::Future;

use common::Server;
use intake::smime;
use rsa::{pkcs8::EncodePrivateKey, RsaPrivateKey};
use store::certificate::{Certificate, NewCertificate};
use trc::{AddContext, EventBuilder, ManageEvent};

#[derive(Debug, Clone)]
pub struct GeneratedCertificate {
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub fingerprint: String,
}

/// Self-signed S/MIME certificate: RSA-2048 so the key transport in the
/// intake path works, email protection EKU, subject alt name on the
/// address.
pub async fn generate_self_signed(
    common_name: String,
    email: String,
    organization: Option<String>,
) -> trc::Result<GeneratedCertificate> {
    tokio::task::spawn_blocking(move || {
        let mut rng = rand::rngs::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048).map_err(generation_error)?;
        let pkcs8 = private_key.to_pkcs8_der().map_err(generation_error)?;
        let key_pair = rcgen::KeyPair::try_from(pkcs8.as_bytes()).map_err(generation_error)?;

        let mut params = rcgen::CertificateParams::new(Vec::new()).map_err(generation_error)?;
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, common_name.as_str());
        if let Some(organization) = &organization {
            params
                .distinguished_name
                .push(rcgen::DnType::OrganizationName, organization.as_str());
        }
        if let Ok(san) = email.clone().try_into() {
            params.subject_alt_names.push(rcgen::SanType::Rfc822Name(san));
        }
        params
            .extended_key_usages
            .push(rcgen::ExtendedKeyUsagePurpose::EmailProtection);

        let certificate = params.self_signed(&key_pair).map_err(generation_error)?;
        let private_key_pem = private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(generation_error)?
            .to_string();

        Ok(GeneratedCertificate {
            fingerprint: smime::fingerprint(certificate.der()),
            certificate_pem: certificate.pem(),
            private_key_pem,
        })
    })
    .await
    .map_err(|err| trc::EventType::Server(trc::ServerEvent::ThreadError).reason(err))?
}

fn generation_error(err: impl std::fmt::Display) -> trc::Error {
    trc::EventType::Manage(ManageEvent::Error)
        .reason(err)
        .details("certificate generation failed")
}

pub trait CertificateOps: Sync + Send {
    fn upload_certificate(
        &self,
        vaultbox_id: i64,
        label: Option<String>,
        public_cert_pem: String,
    ) -> impl Future<Output = trc::Result<Certificate>> + Send;

    fn list_certificates(
        &self,
        vaultbox_id: i64,
    ) -> impl Future<Output = trc::Result<Vec<Certificate>>> + Send;

    fn delete_certificate(
        &self,
        vaultbox_id: i64,
        certificate_id: i64,
    ) -> impl Future<Output = trc::Result<()>> + Send;
}

impl CertificateOps for Server {
    async fn upload_certificate(
        &self,
        vaultbox_id: i64,
        label: Option<String>,
        public_cert_pem: String,
    ) -> trc::Result<Certificate> {
        // Rejects anything the intake worker could not encrypt to.
        let recipient = smime::Recipient::from_pem(&public_cert_pem).map_err(|err| {
            trc::EventType::Manage(ManageEvent::InvalidParameter)
                .details("certificate is not usable for encryption")
                .ctx(trc::Key::Reason, err.description())
        })?;

        let client = self.core.storage.client().await.caused_by(trc::location!())?;
        store::certificate::insert(
            &**client,
            &NewCertificate {
                id: self.generate_id(),
                vaultbox_id,
                label,
                public_cert_pem,
                fingerprint: recipient.fingerprint,
            },
        )
        .await
        .caused_by(trc::location!())
    }

    async fn list_certificates(&self, vaultbox_id: i64) -> trc::Result<Vec<Certificate>> {
        let client = self.core.storage.client().await.caused_by(trc::location!())?;
        store::certificate::find_by_vaultbox(&**client, vaultbox_id)
            .await
            .caused_by(trc::location!())
    }

    async fn delete_certificate(&self, vaultbox_id: i64, certificate_id: i64) -> trc::Result<()> {
        let client = self.core.storage.client().await.caused_by(trc::location!())?;
        if store::certificate::delete(&**client, certificate_id, vaultbox_id)
            .await
            .caused_by(trc::location!())?
        {
            Ok(())
        } else {
            Err(trc::EventType::Manage(ManageEvent::NotFound).into_err())
        }
    }
}

/// ZIP bundle of PEM material, AES-encrypted when a password is given.
pub fn bundle_zip(
    pem_key: &str,
    pem_cert: &str,
    password: &str,
    friendly_name: Option<&str>,
) -> trc::Result<Vec<u8>> {
    use std::io::Write;
    use zip::{write::SimpleFileOptions, AesMode, ZipWriter};

    let name = friendly_name.unwrap_or("encimap");
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = if password.is_empty() {
        SimpleFileOptions::default()
    } else {
        SimpleFileOptions::default().with_aes_encryption(AesMode::Aes256, password)
    };

    let result: Result<(), Box<dyn std::error::Error + Send + Sync>> = (|| {
        writer.start_file(format!("{name}-key.pem"), options)?;
        writer.write_all(pem_key.as_bytes())?;
        writer.start_file(format!("{name}-cert.pem"), options)?;
        writer.write_all(pem_cert.as_bytes())?;
        Ok(())
    })();
    result.map_err(|err| {
        trc::EventType::Manage(ManageEvent::Error)
            .reason(err)
            .details("bundle packaging failed")
    })?;

    writer
        .finish()
        .map(|cursor| cursor.into_inner())
        .map_err(|err| {
            trc::EventType::Manage(ManageEvent::Error)
                .reason(err)
                .details("bundle packaging failed")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generated_certificate_is_encryptable() {
        let generated = generate_self_signed(
            "cat@call.autoroad.lv".to_string(),
            "cat@call.autoroad.lv".to_string(),
            Some("Autoroad".to_string()),
        )
        .await
        .unwrap();

        assert!(generated.certificate_pem.contains("BEGIN CERTIFICATE"));
        assert!(generated.private_key_pem.contains("BEGIN PRIVATE KEY"));
        assert_eq!(generated.fingerprint.len(), 64);

        let recipient = smime::Recipient::from_pem(&generated.certificate_pem).unwrap();
        assert_eq!(recipient.fingerprint, generated.fingerprint);
        smime::encrypt(&[recipient], b"Subject: welcome\r\n\r\nhello").unwrap();
    }

    #[test]
    fn bundle_contains_both_files() {
        let bytes = bundle_zip("KEY", "CERT", "", Some("cat")).unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"cat-key.pem".to_string()));
        assert!(names.contains(&"cat-cert.pem".to_string()));
    }
}
