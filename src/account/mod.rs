//! Deterministic account derivation for both address spaces
//!
//! Accounts are pure functions of (seed phrase, derivation index, native
//! chain id). Each index yields two independently-derived keypairs from
//! distinct well-known paths: one for the native space and one for the
//! EVM-compatible space. A reserved path produces the faucet account,
//! distinguished by a sentinel index so it can never collide with a user
//! account. No network or disk I/O.

use crate::error::{AddressSpace, DevnetError, Result};
use hmac::{Hmac, Mac};
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use serde::Serialize;
use sha2::{Digest, Sha256, Sha512};
use sha3::Keccak256;
use zeroize::Zeroize;

type HmacSha512 = Hmac<Sha512>;

/// Sentinel index reserved for the faucet account
pub const FAUCET_INDEX: u32 = u32::MAX;

/// SLIP-44 coin type for the native space
pub const NATIVE_COIN_TYPE: u32 = 503;

/// SLIP-44 coin type for the EVM space
pub const EVM_COIN_TYPE: u32 = 60;

/// PBKDF2 rounds for seed stretching (BIP39)
const SEED_ROUNDS: u32 = 2048;

const HARDENED: u32 = 0x8000_0000;

/// A derived or imported account with keys for both address spaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountInfo {
    /// Ordinal index; `FAUCET_INDEX` marks the faucet account
    pub index: u32,
    /// Native-space private key (0x-prefixed hex)
    pub native_private_key: String,
    /// Native-space address (bech32)
    pub native_address: String,
    /// EVM-space private key (0x-prefixed hex)
    pub evm_private_key: String,
    /// EVM-space address (0x-prefixed hex)
    pub evm_address: String,
    /// Originating seed phrase; `None` for imported accounts
    pub mnemonic: Option<String>,
    /// Native-space derivation path; `None` for imported accounts
    pub native_derivation_path: Option<String>,
    /// EVM-space derivation path; `None` for imported accounts
    pub evm_derivation_path: Option<String>,
}

impl AccountInfo {
    /// Whether this is the reserved faucet account
    pub fn is_faucet(&self) -> bool {
        self.index == FAUCET_INDEX
    }
}

/// Derive `count` accounts with sequential indices starting at `start_index`
pub fn derive_accounts(
    mnemonic: &str,
    count: u32,
    start_index: u32,
    native_chain_id: u32,
) -> Result<Vec<AccountInfo>> {
    validate_mnemonic(mnemonic)?;
    (start_index..start_index + count)
        .map(|index| derive_account(mnemonic, index, native_chain_id))
        .collect()
}

/// Derive the account at `index`
pub fn derive_account(mnemonic: &str, index: u32, native_chain_id: u32) -> Result<AccountInfo> {
    validate_mnemonic(mnemonic)?;
    let native_path = format!("m/44'/{}'/0'/0/{}", NATIVE_COIN_TYPE, index);
    let evm_path = format!("m/44'/{}'/0'/0/{}", EVM_COIN_TYPE, index);
    derive_account_at(mnemonic, index, &native_path, &evm_path, native_chain_id)
}

/// Derive the reserved faucet account
///
/// Uses a separate hardened account level so the faucet key is never on
/// the user-account path, whatever index range callers pick.
pub fn derive_faucet_account(mnemonic: &str, native_chain_id: u32) -> Result<AccountInfo> {
    validate_mnemonic(mnemonic)?;
    let native_path = format!("m/44'/{}'/1'/0/0", NATIVE_COIN_TYPE);
    let evm_path = format!("m/44'/{}'/1'/0/0", EVM_COIN_TYPE);
    derive_account_at(mnemonic, FAUCET_INDEX, &native_path, &evm_path, native_chain_id)
}

/// Build an account from an imported private key
///
/// The same secret backs both address spaces; the addresses differ by each
/// space's hashing scheme. No mnemonic or path is recorded.
pub fn account_from_private_key(
    private_key: &str,
    index: u32,
    native_chain_id: u32,
) -> Result<AccountInfo> {
    let secp = Secp256k1::new();
    let bytes = parse_private_key(private_key)?;
    let secret = SecretKey::from_slice(&bytes).map_err(|e| DevnetError::InvalidMnemonic {
        reason: format!("invalid private key: {}", e),
    })?;
    let public = PublicKey::from_secret_key(&secp, &secret);
    let key_hex = format!("0x{}", hex::encode(secret.secret_bytes()));

    Ok(AccountInfo {
        index,
        native_private_key: key_hex.clone(),
        native_address: native_address_from_public_key(&public, native_chain_id),
        evm_private_key: key_hex,
        evm_address: evm_address_from_public_key(&public),
        mnemonic: None,
        native_derivation_path: None,
        evm_derivation_path: None,
    })
}

fn derive_account_at(
    mnemonic: &str,
    index: u32,
    native_path: &str,
    evm_path: &str,
    native_chain_id: u32,
) -> Result<AccountInfo> {
    let secp = Secp256k1::new();
    let mut seed = mnemonic_to_seed(mnemonic);

    let result = (|| {
        let native_secret = derive_path_secret(&secp, &seed, native_path)?;
        let evm_secret = derive_path_secret(&secp, &seed, evm_path)?;
        let native_public = PublicKey::from_secret_key(&secp, &native_secret);
        let evm_public = PublicKey::from_secret_key(&secp, &evm_secret);

        Ok(AccountInfo {
            index,
            native_private_key: format!("0x{}", hex::encode(native_secret.secret_bytes())),
            native_address: native_address_from_public_key(&native_public, native_chain_id),
            evm_private_key: format!("0x{}", hex::encode(evm_secret.secret_bytes())),
            evm_address: evm_address_from_public_key(&evm_public),
            mnemonic: Some(mnemonic.to_string()),
            native_derivation_path: Some(native_path.to_string()),
            evm_derivation_path: Some(evm_path.to_string()),
        })
    })();

    seed.zeroize();
    result
}

/// Stretch a seed phrase into a 64-byte seed (PBKDF2-HMAC-SHA512, BIP39)
fn mnemonic_to_seed(mnemonic: &str) -> [u8; 64] {
    // One 64-byte output block: U1 = HMAC(phrase, salt || INT(1))
    let mut salted = Vec::with_capacity(12);
    salted.extend_from_slice(b"mnemonic");
    salted.extend_from_slice(&1u32.to_be_bytes());

    let mut u = hmac_sha512(mnemonic.as_bytes(), &salted);
    let mut seed = u;
    for _ in 1..SEED_ROUNDS {
        u = hmac_sha512(mnemonic.as_bytes(), &u);
        for (s, b) in seed.iter_mut().zip(u.iter()) {
            *s ^= *b;
        }
    }
    seed
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    // HMAC accepts keys of any length
    let mut mac = HmacSha512::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    let mut out = [0u8; 64];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

struct ExtendedKey {
    secret: SecretKey,
    chain_code: [u8; 32],
}

/// Derive the secret key at a `m/44'/...` style path from a 64-byte seed
fn derive_path_secret(
    secp: &Secp256k1<secp256k1::All>,
    seed: &[u8; 64],
    path: &str,
) -> Result<SecretKey> {
    let mut key = master_key(seed)?;
    for index in parse_derivation_path(path)? {
        key = child_key(secp, &key, index, path)?;
    }
    Ok(key.secret)
}

fn master_key(seed: &[u8; 64]) -> Result<ExtendedKey> {
    let out = hmac_sha512(b"Bitcoin seed", seed);
    let secret = SecretKey::from_slice(&out[..32]).map_err(|e| DevnetError::InvalidMnemonic {
        reason: format!("seed produced an invalid master key: {}", e),
    })?;
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&out[32..]);
    Ok(ExtendedKey { secret, chain_code })
}

fn child_key(
    secp: &Secp256k1<secp256k1::All>,
    parent: &ExtendedKey,
    index: u32,
    path: &str,
) -> Result<ExtendedKey> {
    let mut mac = HmacSha512::new_from_slice(&parent.chain_code)
        .expect("HMAC accepts any key length");
    if index >= HARDENED {
        mac.update(&[0u8]);
        mac.update(&parent.secret.secret_bytes());
    } else {
        mac.update(&PublicKey::from_secret_key(secp, &parent.secret).serialize());
    }
    mac.update(&index.to_be_bytes());
    let out = mac.finalize().into_bytes();

    let tweak =
        Scalar::from_be_bytes(out[..32].try_into().expect("HMAC output is 64 bytes")).map_err(
            |_| DevnetError::InvalidMnemonic {
                reason: format!("derivation at {} produced an out-of-range key", path),
            },
        )?;
    let secret = parent
        .secret
        .add_tweak(&tweak)
        .map_err(|e| DevnetError::InvalidMnemonic {
            reason: format!("derivation at {} failed: {}", path, e),
        })?;
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&out[32..]);
    Ok(ExtendedKey { secret, chain_code })
}

fn parse_derivation_path(path: &str) -> Result<Vec<u32>> {
    let mut components = Vec::new();
    for (i, segment) in path.split('/').enumerate() {
        if i == 0 {
            if segment != "m" {
                return Err(DevnetError::InvalidMnemonic {
                    reason: format!("derivation path must start with 'm': {}", path),
                });
            }
            continue;
        }
        let (digits, hardened) = match segment.strip_suffix('\'') {
            Some(d) => (d, true),
            None => (segment, false),
        };
        let index: u32 = digits.parse().map_err(|_| DevnetError::InvalidMnemonic {
            reason: format!("invalid derivation path segment '{}' in {}", segment, path),
        })?;
        components.push(if hardened { index | HARDENED } else { index });
    }
    Ok(components)
}

/// Compute the native-space address for a public key
///
/// The payload is a version byte plus the first 20 bytes of the SHA-256 of
/// the compressed public key, bech32m-encoded with a chain-id HRP.
pub fn native_address_from_public_key(public: &PublicKey, native_chain_id: u32) -> String {
    let hash = Sha256::digest(public.serialize());
    encode_native_address(
        hash[..20].try_into().expect("SHA-256 output is 32 bytes"),
        native_chain_id,
    )
}

/// Encode a 20-byte account id as a native-space address
pub fn encode_native_address(id: &[u8; 20], native_chain_id: u32) -> String {
    use bech32::ToBase32;
    let mut payload = Vec::with_capacity(21);
    payload.push(0u8); // address version
    payload.extend_from_slice(id);
    bech32::encode(
        &format!("net{}", native_chain_id),
        payload.to_base32(),
        bech32::Variant::Bech32m,
    )
    .expect("HRP is valid ASCII")
}

/// Parse and validate a native-space address, returning the 20-byte id
pub fn parse_native_address(address: &str) -> Result<[u8; 20]> {
    use bech32::FromBase32;
    let invalid = || DevnetError::InvalidAddress {
        space: AddressSpace::Native,
        address: address.to_string(),
    };
    let (hrp, data, variant) = bech32::decode(address).map_err(|_| invalid())?;
    if variant != bech32::Variant::Bech32m || !hrp.starts_with("net") {
        return Err(invalid());
    }
    let payload = Vec::<u8>::from_base32(&data).map_err(|_| invalid())?;
    if payload.len() != 21 || payload[0] != 0 {
        return Err(invalid());
    }
    let mut id = [0u8; 20];
    id.copy_from_slice(&payload[1..]);
    Ok(id)
}

/// Compute the EVM-space address for a public key (Keccak-256 of the
/// uncompressed key, last 20 bytes)
pub fn evm_address_from_public_key(public: &PublicKey) -> String {
    let uncompressed = public.serialize_uncompressed();
    let hash = Keccak256::digest(&uncompressed[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Parse and validate an EVM-space address, returning the 20-byte id
pub fn parse_evm_address(address: &str) -> Result<[u8; 20]> {
    let invalid = || DevnetError::InvalidAddress {
        space: AddressSpace::Evm,
        address: address.to_string(),
    };
    let digits = address.strip_prefix("0x").ok_or_else(invalid)?;
    if digits.len() != 40 {
        return Err(invalid());
    }
    let bytes = hex::decode(digits).map_err(|_| invalid())?;
    let mut id = [0u8; 20];
    id.copy_from_slice(&bytes);
    Ok(id)
}

fn parse_private_key(private_key: &str) -> Result<[u8; 32]> {
    let digits = private_key.strip_prefix("0x").unwrap_or(private_key);
    let bytes = hex::decode(digits).map_err(|e| DevnetError::InvalidMnemonic {
        reason: format!("invalid private key hex: {}", e),
    })?;
    bytes.try_into().map_err(|_| DevnetError::InvalidMnemonic {
        reason: "private key must be 32 bytes".to_string(),
    })
}

/// Validate a seed phrase
///
/// Checks word count and character set. Checksum-grade validation is the
/// wallet tooling's concern, not this crate's.
pub fn validate_mnemonic(mnemonic: &str) -> Result<()> {
    let words: Vec<&str> = mnemonic.split_whitespace().collect();
    if ![12, 15, 18, 21, 24].contains(&words.len()) {
        return Err(DevnetError::InvalidMnemonic {
            reason: format!("expected 12-24 words, got {}", words.len()),
        });
    }
    for word in words {
        if !word.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(DevnetError::InvalidMnemonic {
                reason: format!("word '{}' contains non-lowercase characters", word),
            });
        }
    }
    Ok(())
}

/// Generate a fresh 12-word seed phrase
pub fn generate_mnemonic() -> String {
    use rand::seq::SliceRandom;
    let mut rng = rand::thread_rng();
    (0..12)
        .map(|_| *WORDLIST.choose(&mut rng).expect("wordlist is non-empty"))
        .collect::<Vec<_>>()
        .join(" ")
}

const WORDLIST: &[&str] = &[
    "abandon", "ability", "able", "about", "above", "absent", "absorb", "abstract", "absurd",
    "abuse", "access", "accident", "account", "accuse", "achieve", "acid", "acoustic", "acquire",
    "across", "act", "action", "actor", "actress", "actual", "adapt", "add", "addict", "address",
    "adjust", "admit", "adult", "advance", "advice", "aerobic", "affair", "afford", "afraid",
    "again", "age", "agent", "agree", "ahead", "aim", "air", "airport", "aisle", "alarm", "album",
    "alcohol", "alert", "alien", "all", "alley", "allow", "almost", "alone", "alpha", "already",
    "also", "alter", "always", "amateur", "amazing", "among",
];

#[cfg(test)]
mod tests {
    use super::*;

    const MNEMONIC: &str =
        "legal winner thank year wave sausage worth useful legal winner thank yellow";

    #[test]
    fn test_derivation_is_deterministic() {
        let first = derive_accounts(MNEMONIC, 5, 0, 2029).unwrap();
        let second = derive_accounts(MNEMONIC, 5, 0, 2029).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sequential_indices() {
        let accounts = derive_accounts(MNEMONIC, 3, 0, 2029).unwrap();
        let indices: Vec<u32> = accounts.iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_spaces_use_distinct_keys() {
        let account = derive_account(MNEMONIC, 0, 2029).unwrap();
        assert_ne!(account.native_private_key, account.evm_private_key);
        assert!(account.native_address.starts_with("net2029"));
        assert!(account.evm_address.starts_with("0x"));
        assert_eq!(account.evm_address.len(), 42);
    }

    #[test]
    fn test_paths_are_recorded() {
        let account = derive_account(MNEMONIC, 7, 2029).unwrap();
        assert_eq!(
            account.native_derivation_path.as_deref(),
            Some("m/44'/503'/0'/0/7")
        );
        assert_eq!(
            account.evm_derivation_path.as_deref(),
            Some("m/44'/60'/0'/0/7")
        );
        assert_eq!(account.mnemonic.as_deref(), Some(MNEMONIC));
    }

    #[test]
    fn test_faucet_account_is_reserved() {
        let faucet = derive_faucet_account(MNEMONIC, 2029).unwrap();
        assert_eq!(faucet.index, FAUCET_INDEX);
        assert!(faucet.is_faucet());

        // Faucet key must differ from every user-path key, including the
        // one whose numeric index would collide with the sentinel.
        let user = derive_account(MNEMONIC, 0, 2029).unwrap();
        assert_ne!(faucet.native_address, user.native_address);
        assert_ne!(faucet.evm_address, user.evm_address);

        let again = derive_faucet_account(MNEMONIC, 2029).unwrap();
        assert_eq!(faucet, again);
    }

    #[test]
    fn test_different_indices_differ() {
        let a = derive_account(MNEMONIC, 0, 2029).unwrap();
        let b = derive_account(MNEMONIC, 1, 2029).unwrap();
        assert_ne!(a.native_address, b.native_address);
        assert_ne!(a.evm_address, b.evm_address);
    }

    #[test]
    fn test_invalid_mnemonic_rejected() {
        assert!(matches!(
            derive_account("not enough words", 0, 2029),
            Err(DevnetError::InvalidMnemonic { .. })
        ));
        assert!(validate_mnemonic("Legal Winner Thank Year Wave Sausage Worth Useful Legal Winner Thank Yellow").is_err());
    }

    #[test]
    fn test_generated_mnemonic_is_valid() {
        let mnemonic = generate_mnemonic();
        assert!(validate_mnemonic(&mnemonic).is_ok());
        assert_eq!(mnemonic.split_whitespace().count(), 12);
    }

    #[test]
    fn test_native_address_roundtrip() {
        let account = derive_account(MNEMONIC, 0, 2029).unwrap();
        let id = parse_native_address(&account.native_address).unwrap();
        assert_eq!(encode_native_address(&id, 2029), account.native_address);
    }

    #[test]
    fn test_address_space_validation() {
        let account = derive_account(MNEMONIC, 0, 2029).unwrap();
        // An EVM address is not a native address and vice versa
        assert!(parse_native_address(&account.evm_address).is_err());
        assert!(parse_evm_address(&account.native_address).is_err());
        assert!(parse_evm_address(&account.evm_address).is_ok());
        assert!(parse_native_address(&account.native_address).is_ok());
    }

    #[test]
    fn test_account_from_private_key() {
        let account = derive_account(MNEMONIC, 0, 2029).unwrap();
        let imported =
            account_from_private_key(&account.native_private_key, 42, 2029).unwrap();
        assert_eq!(imported.index, 42);
        assert_eq!(imported.native_address, account.native_address);
        assert!(imported.mnemonic.is_none());
        assert!(imported.native_derivation_path.is_none());
    }

    #[test]
    fn test_chain_id_changes_native_address_only() {
        let a = derive_account(MNEMONIC, 0, 2029).unwrap();
        let b = derive_account(MNEMONIC, 0, 1111).unwrap();
        assert_ne!(a.native_address, b.native_address);
        assert_eq!(a.evm_address, b.evm_address);
        assert_eq!(a.native_private_key, b.native_private_key);
    }
}
