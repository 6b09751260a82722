use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use super::credential::SecurityError;

// Characters left alone by form URL encoding
const FORM_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'*');

pub(crate) fn url_encode(value: &str) -> String {
    utf8_percent_encode(value, FORM_COMPONENT).to_string()
}

/// Resource the SAS token grants access to
pub(crate) fn token_scope(scope_id: &str, registration_id: &str) -> String {
    url_encode(&format!("{scope_id}/registrations/{registration_id}"))
}

/// Unix time `ttl` from now, in seconds
pub(crate) fn expiry_from_now(ttl: Duration) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now + ttl).as_secs()
}

/// Build a SAS token for the registration, valid until `expiry`
/// (seconds since the Unix epoch).
///
/// `sign` computes the signature over the token scope and the expiry
/// separated by a newline.
pub fn build_sas_token<F>(
    scope_id: &str,
    registration_id: &str,
    expiry: u64,
    sign: F,
) -> Result<String, SecurityError>
where
    F: FnOnce(&[u8]) -> Result<Vec<u8>, SecurityError>,
{
    let scope = token_scope(scope_id, registration_id);
    let signature = sign(format!("{scope}\n{expiry}").as_bytes())?;
    let signature = url_encode(&STANDARD.encode(signature));

    Ok(format!(
        "SharedAccessSignature sr={scope}&sig={signature}&se={expiry}&skn="
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{DeviceKey, KeySecurity, SymmetricKeySecurity};

    #[test]
    fn scope_is_form_encoded() {
        assert_eq!(
            token_scope("0ne00000001", "dev1"),
            "0ne00000001%2Fregistrations%2Fdev1"
        );
        assert_eq!(url_encode("a b+c=d-e.f_g*h~"), "a%20b%2Bc%3Dd-e.f_g*h%7E");
    }

    #[test]
    fn it_builds_a_signed_token() {
        const EXPECTED: &str = "SharedAccessSignature sr=0ne00000001%2Fregistrations%2Fdev1\
             &sig=N74Nr1mm8EajaoSX6P8v3qtoB7JRpf4Ko1tg3BO8pK0%3D\
             &se=1700000000&skn=";

        // "Jefe"
        let key = DeviceKey::from_base64("SmVmZQ==").unwrap();
        let token =
            build_sas_token("0ne00000001", "dev1", 1_700_000_000, |data| key.sign(data)).unwrap();
        assert_eq!(token, EXPECTED);

        let security = SymmetricKeySecurity::new("dev1", "SmVmZQ==", vec![], vec![]).unwrap();
        let token = build_sas_token("0ne00000001", "dev1", 1_700_000_000, |data| {
            security.sign(data)
        })
        .unwrap();
        assert_eq!(token, EXPECTED);
    }

    #[test]
    fn expiry_is_in_the_future() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let expiry = expiry_from_now(Duration::from_secs(3600));
        assert!(expiry >= now + 3600);
        assert!(expiry <= now + 3601);
    }
}
