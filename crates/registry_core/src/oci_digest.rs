//! Digest parsing and validation (C2).
//!
//! <https://github.com/opencontainers/image-spec/blob/main/descriptor.md#digests>
use digest::{Digest, DynDigest};
use serde::{Deserialize, Serialize};

use sha2::Sha256;
use sha2::Sha512;

use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OciDigest {
    algorithm: RegisteredImageSpecAlgorithm,
    encoded: String,
}

impl TryFrom<&str> for OciDigest {
    type Error = Error;
    fn try_from(s: &str) -> Result<Self> {
        let i = match s.find(':') {
            Some(i) => i,
            None => return Err(Error::InvalidDigest(s.to_string())),
        };
        let algo: &str = match s.get(..i) {
            Some(a) => a,
            None => return Err(Error::InvalidDigest(s.to_string())),
        };
        let encoded: &str = match s.get(i + 1..) {
            Some(e) if !e.is_empty() => e,
            _ => return Err(Error::InvalidDigest(s.to_string())),
        };
        let algorithm = RegisteredImageSpecAlgorithm::try_from(algo)
            .map_err(|_| Error::InvalidDigest(s.to_string()))?;

        if encoded.len() != algorithm.hex_len() || !encoded.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(Error::InvalidDigest(s.to_string()));
        }

        Ok(Self {
            algorithm,
            encoded: encoded.to_string(),
        })
    }
}

impl TryFrom<&[u8]> for OciDigest {
    type Error = Error;
    fn try_from(bs: &[u8]) -> Result<Self> {
        let mut hasher = Sha256::new();
        Digest::update(&mut hasher, bs);
        let s = hasher.finalize();

        Ok(Self {
            algorithm: RegisteredImageSpecAlgorithm::Sha256,
            encoded: format!("{:x}", s),
        })
    }
}

impl From<OciDigest> for String {
    fn from(d: OciDigest) -> String {
        format!("{}:{}", String::from(&d.algorithm), d.encoded)
    }
}

impl From<&OciDigest> for String {
    fn from(d: &OciDigest) -> String {
        format!("{}:{}", String::from(&d.algorithm), d.encoded)
    }
}

impl std::fmt::Display for OciDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", String::from(&self.algorithm), self.encoded)
    }
}

impl OciDigest {
    pub fn digester(&self) -> Digester {
        match self.algorithm {
            RegisteredImageSpecAlgorithm::Sha256 => {
                Digester::new(Box::new(Sha256::new()), RegisteredImageSpecAlgorithm::Sha256)
            }
            RegisteredImageSpecAlgorithm::Sha512 => {
                Digester::new(Box::new(Sha512::new()), RegisteredImageSpecAlgorithm::Sha512)
            }
        }
    }

    /// The registry-relative path component under which a blob addressed by this
    /// digest lives, per the persisted state layout in §6: `<alg>/<alg>:<hex>`.
    pub fn blob_path_component(&self) -> String {
        format!("{}/{}", String::from(&self.algorithm), self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum RegisteredImageSpecAlgorithm {
    Sha256,
    Sha512,
}

impl RegisteredImageSpecAlgorithm {
    fn hex_len(&self) -> usize {
        match self {
            RegisteredImageSpecAlgorithm::Sha256 => 64,
            RegisteredImageSpecAlgorithm::Sha512 => 128,
        }
    }
}

impl TryFrom<&str> for RegisteredImageSpecAlgorithm {
    type Error = Error;

    fn try_from(a: &str) -> Result<Self> {
        match a {
            "sha512" => Ok(RegisteredImageSpecAlgorithm::Sha512),
            "sha256" => Ok(RegisteredImageSpecAlgorithm::Sha256),
            s => Err(Error::UnsupportedDigestAlgorithm(String::from(s))),
        }
    }
}

impl From<&RegisteredImageSpecAlgorithm> for String {
    fn from(a: &RegisteredImageSpecAlgorithm) -> String {
        match a {
            RegisteredImageSpecAlgorithm::Sha512 => String::from("sha512"),
            RegisteredImageSpecAlgorithm::Sha256 => String::from("sha256"),
        }
    }
}

/// Streaming digest calculation: `update()` is called once per chunk of a body as it
/// passes through, `finalize()` consumes the digester and returns the resulting
/// `OciDigest` plus the byte count, without ever buffering the whole payload (C2's
/// `CalculateDigest`).
pub struct Digester {
    digester: Box<dyn DynDigest + 'static + Send>,
    algorithm: RegisteredImageSpecAlgorithm,
    bytes: u64,
}

impl Digester {
    fn new(digester: Box<dyn DynDigest + 'static + Send>, algorithm: RegisteredImageSpecAlgorithm) -> Self {
        Self {
            digester,
            algorithm,
            bytes: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digester.update(data);
        self.bytes += data.len() as u64;
    }

    #[inline]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Consume the digester, returning the digest computed over everything fed to
    /// `update()` so far.
    pub fn finalize(self) -> OciDigest {
        let encoded = hex::encode(self.digester.finalize());
        OciDigest {
            algorithm: self.algorithm,
            encoded,
        }
    }
}

impl Default for Digester {
    fn default() -> Self {
        Self::new(Box::new(Sha256::new()), RegisteredImageSpecAlgorithm::Sha256)
    }
}

impl From<Digester> for DigestState {
    fn from(d: Digester) -> DigestState {
        DigestState { bytes: d.bytes }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DigestState {
    bytes: u64,
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::valid_sha256(
        "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        true
    )]
    #[case::valid_sha512("sha512:cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3", true)]
    #[case::wrong_algorithm("sha666:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85", false)]
    #[case::no_colon("sha256e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85", false)]
    #[case::empty_encoded("sha256:", false)]
    #[case::empty_algorithm(":e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85", false)]
    #[case::too_short_63("sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85", false)]
    #[case::too_long_65(
        "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b8555",
        false
    )]
    #[case::non_hex("sha256:zzzzz44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85", false)]
    fn validate_try_from(#[case] input: &str, #[case] expect_ok: bool) {
        let actual: Result<OciDigest> = input.try_into();
        assert_eq!(actual.is_ok(), expect_ok, "input: {input}, result: {actual:?}");
    }

    #[test]
    fn digest_of_empty_bytes_is_well_known() {
        let d: OciDigest = (&b""[..]).try_into().unwrap();
        assert_eq!(
            String::from(&d),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn streaming_digester_matches_oneshot() {
        let mut digester = Digester::default();
        digester.update(b"hello");
        digester.update(b"world");
        let streamed = digester.finalize();

        let oneshot: OciDigest = (&b"helloworld"[..]).try_into().unwrap();
        assert_eq!(String::from(&streamed), String::from(&oneshot));
    }
}
