//! `CRYPTO`: UUIDs, password hashing, digests and Base64.
//!
//! Password hashes look like `$sha256i$<rounds>$<salt base64>$<digest hex>`:
//! the salt is prepended to the password and the digest is re-hashed
//! `rounds` times.

use crate::eval::EvalError;
use crate::extension::{arg_str, check_args, ExtensionObject};
use crate::value::Value;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};
use sha3::Sha3_256;

const ROUNDS: u32 = 10_000;
const SCHEME: &str = "sha256i";

pub struct CryptoObject;

fn stretch(password: &str, salt: &[u8], rounds: u32) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    let mut digest = hasher.finalize();
    for _ in 1..rounds {
        digest = Sha256::digest(digest);
    }
    digest.to_vec()
}

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = stretch(password, &salt, ROUNDS);
    format!("${}${}${}${}", SCHEME, ROUNDS, STANDARD.encode(salt), hex::encode(digest))
}

/// False for malformed hashes as well as wrong passwords.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let parts: Vec<&str> = encoded.split('$').collect();
    let [_, scheme, rounds, salt, digest] = parts.as_slice() else {
        return false;
    };
    if *scheme != SCHEME {
        return false;
    }
    let (Ok(rounds), Ok(salt), Ok(expected)) =
        (rounds.parse::<u32>(), STANDARD.decode(salt), hex::decode(digest))
    else {
        return false;
    };
    if rounds == 0 {
        return false;
    }
    let actual = stretch(password, &salt, rounds);
    actual.len() == expected.len()
        && actual.iter().zip(&expected).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

impl ExtensionObject for CryptoObject {
    fn type_name(&self) -> &str {
        "CRYPTO"
    }

    fn call_method(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        let one = |args: &[Value]| check_args(name, args, 1, 1).map(|_| arg_str(args, 0));
        match name.to_ascii_uppercase().as_str() {
            "UUID" => Ok(Value::String(uuid::Uuid::new_v4().to_string())),
            "HASHPASSWORD" | "HASH" => Ok(Value::String(hash_password(&one(args)?))),
            "VERIFYPASSWORD" | "VERIFY" => {
                check_args(name, args, 2, 2)?;
                Ok(Value::Boolean(verify_password(&arg_str(args, 0), &arg_str(args, 1))))
            }
            "SHA256" => Ok(Value::String(hex::encode(Sha256::digest(one(args)?.as_bytes())))),
            "SHA512" => Ok(Value::String(hex::encode(Sha512::digest(one(args)?.as_bytes())))),
            "SHA3" => Ok(Value::String(hex::encode(Sha3_256::digest(one(args)?.as_bytes())))),
            "BASE64ENCODE" => Ok(Value::String(STANDARD.encode(one(args)?.as_bytes()))),
            "BASE64DECODE" => {
                let bytes = STANDARD
                    .decode(one(args)?.trim())
                    .map_err(|e| EvalError::InvalidProcedureCall(format!("Base64Decode: {}", e)))?;
                Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            }
            _ => Err(EvalError::NotSupported(format!("CRYPTO.{}", name))),
        }
    }
}
