use crate::error::WalletError;
use async_trait::async_trait;
use eth_keystore::decrypt_key;
use rpassword::prompt_password;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{
        Keypair,
        Signer,
        read_keypair_file,
    },
    signer::keypair::keypair_from_seed,
    transaction::Transaction,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

/// Signing half of a connected wallet. Key custody stays on the other side.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    /// Sign with the transaction's own recent blockhash. A user declining the
    /// request is `WalletError::Rejected`.
    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, WalletError>;
}

pub struct KeypairWallet {
    keypair: Keypair,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn from_file(path: &Path) -> Result<Self, WalletError> {
        read_keypair_file(path)
            .map(Self::new)
            .map_err(|e| WalletError::Load(format!("{}: {e}", path.display())))
    }
}

#[async_trait]
impl WalletSigner for KeypairWallet {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transaction(
        &self,
        mut tx: Transaction,
    ) -> Result<Transaction, WalletError> {
        let blockhash = tx.message.recent_blockhash;
        tx.try_sign(&[&self.keypair], blockhash)
            .map_err(|e| WalletError::Signing(e.to_string()))?;
        Ok(tx)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletFileKind {
    /// Plain `solana-keygen` JSON byte array.
    Keypair,
    /// Password-protected keystore.
    Keystore,
}

#[derive(Clone, Debug)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub kind: WalletFileKind,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf, kind: WalletFileKind) -> Self {
        Self {
            name: name.into(),
            path,
            kind,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf, WalletError> {
    let home = std::env::var("HOME")
        .map_err(|_| WalletError::Load("HOME environment variable not set".into()))?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("solana")
        .join("wallets"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf, WalletError> {
    match dir {
        Some(raw) => Ok(expand_path(raw)),
        None => default_wallet_dir(),
    }
}

pub fn expand_path(raw: &str) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    PathBuf::from(expanded.into_owned())
}

pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>, WalletError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir)
        .map_err(|e| WalletError::Load(format!("failed to read wallet directory: {e}")))?;
    let mut wallets = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| WalletError::Load(format!("failed to read wallet entry: {e}")))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let kind = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => WalletFileKind::Keypair,
            Some("wallet") => WalletFileKind::Keystore,
            _ => continue,
        };
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| WalletError::Load(format!("invalid wallet filename {path:?}")))?
            .to_owned();
        wallets.push(WalletDescriptor::new(name, path, kind));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor, WalletError> {
    list_wallets(dir)?
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| {
            WalletError::Load(format!(
                "wallet '{name}' not found in {}",
                dir.to_string_lossy()
            ))
        })
}

pub fn unlock_wallet(descriptor: &WalletDescriptor) -> Result<KeypairWallet, WalletError> {
    match descriptor.kind {
        WalletFileKind::Keypair => KeypairWallet::from_file(&descriptor.path),
        WalletFileKind::Keystore => {
            let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
            let password = prompt_password(prompt)
                .map_err(|e| WalletError::Load(format!("failed to read password: {e}")))?;
            unlock_keystore(descriptor, &password)
        }
    }
}

pub fn unlock_keystore(
    descriptor: &WalletDescriptor,
    password: &str,
) -> Result<KeypairWallet, WalletError> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes()).map_err(|_| {
        WalletError::Load(format!("invalid password for wallet '{}'", descriptor.name))
    })?;
    keypair_from_secret(&secret)
        .map(KeypairWallet::new)
        .ok_or_else(|| {
            WalletError::Load(format!(
                "wallet '{}' contained unsupported key material",
                descriptor.name
            ))
        })
}

/// Accepts a 64-byte `secret || public` keypair or a 32-byte ed25519 seed.
fn keypair_from_secret(secret: &[u8]) -> Option<Keypair> {
    match secret.len() {
        64 => Keypair::from_bytes(secret).ok(),
        32 => keypair_from_seed(secret).ok(),
        _ => None,
    }
}
