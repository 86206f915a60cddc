use std::path::{Component, Path};

use solana_sdk::signature::{read_keypair, read_keypair_file, Keypair};

use crate::error::{GaslessError, Result};

/// Where a request's signing key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerSource<'a> {
    /// Inline keypair, as the JSON byte array `solana-keygen` writes.
    Inline(&'a str),
    /// Name of a keypair file inside the configured key directory.
    Reference(&'a str),
}

pub fn load_keypair(source: &SignerSource<'_>, key_dir: &Path) -> Result<Keypair> {
    match source {
        SignerSource::Inline(raw) => read_keypair(&mut raw.trim().as_bytes())
            .map_err(|e| GaslessError::Signer(format!("inline key: {e}"))),
        SignerSource::Reference(name) => {
            let path = Path::new(name);
            let plain = path
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
            if name.is_empty() || !plain {
                return Err(GaslessError::Signer(format!(
                    "signer ref `{name}` must be a plain file name"
                )));
            }

            read_keypair_file(key_dir.join(path))
                .map_err(|e| GaslessError::Signer(format!("signer ref `{name}`: {e}")))
        }
    }
}
