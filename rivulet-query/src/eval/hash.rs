//! Hash built-ins: MD5, SHA1, SHA256, SHA384, SHA512.

use crate::error::{QueryError, Result};
use md5::{Digest, Md5};
use rivulet_core::vocab::xsd;
use rivulet_core::Term;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

fn simple_literal(args: &[Term]) -> Result<&str> {
    match args {
        [Term::Literal(lit)]
            if lit.language.is_none() && lit.datatype.as_ref() == xsd::STRING =>
        {
            Ok(&lit.value)
        }
        _ => Err(QueryError::expression(
            "hash functions expect one simple literal",
        )),
    }
}

/// Strict hash built-ins; results are lowercase hex simple literals.
pub fn call(name: &str, args: &[Term]) -> Result<Term> {
    let input = simple_literal(args)?;
    let digest = match name {
        "md5" => hex::encode(Md5::digest(input.as_bytes())),
        "sha1" => hex::encode(Sha1::digest(input.as_bytes())),
        "sha256" => hex::encode(Sha256::digest(input.as_bytes())),
        "sha384" => hex::encode(Sha384::digest(input.as_bytes())),
        "sha512" => hex::encode(Sha512::digest(input.as_bytes())),
        other => {
            return Err(QueryError::expression(format!(
                "unknown hash function `{other}`"
            )))
        }
    };
    Ok(Term::literal(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let result = call("sha256", &[Term::literal("abc")]).unwrap();
        assert_eq!(
            result,
            Term::literal("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn test_language_tagged_input_rejected() {
        assert!(call("md5", &[Term::lang_literal("abc", "en")]).is_err());
    }
}
