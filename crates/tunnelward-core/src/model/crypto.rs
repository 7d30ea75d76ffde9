// ── IKEv2 cryptography suite ──
//
// Six independent parameters, each with a baseline default. Names are the
// literal element values the document uses.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::document::Element;

macro_rules! crypto_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident, { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
        )]
        #[strum(ascii_case_insensitive)]
        pub enum $name {
            $(
                #[strum(serialize = $text)]
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }
    };
}

crypto_enum!(AuthenticationTransform, default = Gcmaes128, {
    Md596 => "MD596",
    Sha196 => "SHA196",
    Sha256128 => "SHA256128",
    Gcmaes128 => "GCMAES128",
    Gcmaes192 => "GCMAES192",
    Gcmaes256 => "GCMAES256",
});

crypto_enum!(CipherTransform, default = Gcmaes128, {
    Des => "DES",
    Des3 => "DES3",
    Aes128 => "AES128",
    Aes192 => "AES192",
    Aes256 => "AES256",
    Gcmaes128 => "GCMAES128",
    Gcmaes192 => "GCMAES192",
    Gcmaes256 => "GCMAES256",
});

crypto_enum!(EncryptionMethod, default = AesGcm128, {
    Des => "DES",
    Des3 => "DES3",
    Aes128 => "AES128",
    Aes192 => "AES192",
    Aes256 => "AES256",
    AesGcm128 => "AES_GCM_128",
    AesGcm256 => "AES_GCM_256",
});

crypto_enum!(IntegrityCheckMethod, default = Sha256, {
    Md5 => "MD5",
    Sha196 => "SHA196",
    Sha256 => "SHA256",
    Sha384 => "SHA384",
});

crypto_enum!(DhGroup, default = Ecp256, {
    Group1 => "Group1",
    Group2 => "Group2",
    Group14 => "Group14",
    Ecp256 => "ECP256",
    Ecp384 => "ECP384",
    Group24 => "Group24",
});

crypto_enum!(PfsGroup, default = Ecp256, {
    Pfs1 => "PFS1",
    Pfs2 => "PFS2",
    Pfs2048 => "PFS2048",
    Ecp256 => "ECP256",
    Ecp384 => "ECP384",
    PfsMm => "PFSMM",
    Pfs24 => "PFS24",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptographySuite {
    pub authentication_transform: AuthenticationTransform,
    pub cipher_transform: CipherTransform,
    pub encryption_method: EncryptionMethod,
    pub integrity_check_method: IntegrityCheckMethod,
    pub dh_group: DhGroup,
    pub pfs_group: PfsGroup,
}

const AUTH: &str = "AuthenticationTransformConstants";
const CIPHER: &str = "CipherTransformConstants";
const ENCRYPTION: &str = "EncryptionMethod";
const INTEGRITY: &str = "IntegrityCheckMethod";
const DH: &str = "DHGroup";
const PFS: &str = "PfsGroup";

fn read<T: std::str::FromStr + Default>(
    element: &Element,
    name: &str,
    errors: &mut Vec<String>,
) -> T {
    match element.child_text(name) {
        Some(text) => text.parse().unwrap_or_else(|_| {
            errors.push(format!("unknown {name} '{text}'"));
            T::default()
        }),
        None => T::default(),
    }
}

impl CryptographySuite {
    /// Parse a `<CryptographySuite>` element. Unknown values fall back to
    /// the baseline and are reported in `errors`.
    pub fn from_element(element: &Element, errors: &mut Vec<String>) -> Self {
        Self {
            authentication_transform: read(element, AUTH, errors),
            cipher_transform: read(element, CIPHER, errors),
            encryption_method: read(element, ENCRYPTION, errors),
            integrity_check_method: read(element, INTEGRITY, errors),
            dh_group: read(element, DH, errors),
            pfs_group: read(element, PFS, errors),
        }
    }

    pub fn to_element(&self) -> Element {
        Element::new("CryptographySuite")
            .with(Element::text(AUTH, self.authentication_transform.to_string()))
            .with(Element::text(CIPHER, self.cipher_transform.to_string()))
            .with(Element::text(ENCRYPTION, self.encryption_method.to_string()))
            .with(Element::text(INTEGRITY, self.integrity_check_method.to_string()))
            .with(Element::text(DH, self.dh_group.to_string()))
            .with(Element::text(PFS, self.pfs_group.to_string()))
    }
}
