//! BaseBadge Crypto Library
//!
//! EIP-712 helpers for BaseBadge score cards. The backend signs each card
//! over the `ScoreCard` typed-data struct; the client only transports that
//! signature, but can rebuild the digest to check who issued it before
//! paying the submission fee.

use basebadge_types::SignedScoreCard;
use ethers::abi::{self, Token};
use ethers::signers::LocalWallet;
use ethers::types::transaction::eip712::EIP712Domain;
use ethers::types::{Address, Signature, H256, U256};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::str::FromStr;

/// EIP-712 type string of the score card struct
pub const SCORE_CARD_TYPE: &str = "ScoreCard(address user,uint256 totalScore,uint256 baseScore,\
uint256 securityScore,uint256 numberOfTransactions,uint256 currentStreak,uint256 maxStreak,\
uint256 currentBalance,uint256 avgBalanceLastMonth,uint256 gasPaid,uint256 suspiciousTokens,\
uint256 suspiciousContracts,uint256 dangerousInteractions,uint256 suspiciousOilCompanies,\
uint256 issuedAt,uint256 nonce)";

/// EIP-712 domain the score-card signer uses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreCardDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl ScoreCardDomain {
    /// Domain of the ScoreChecker deployed at `verifying_contract`
    pub fn new(chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            name: "BaseBadgeScore".to_string(),
            version: "1".to_string(),
            chain_id,
            verifying_contract,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Signing error: {0}")]
    SigningError(String),
    #[error("Unexpected signer: expected {expected:?}, recovered {recovered:?}")]
    UnexpectedSigner { expected: Address, recovered: Address },
}

/// Prefix a hex signature with `0x` if the backend left it off
pub fn normalize_signature(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex_part) => format!("0x{}", hex_part),
        None => format!("0x{}", trimmed),
    }
}

/// Decode a (possibly unprefixed) 65-byte hex signature
pub fn signature_bytes(raw: &str) -> Result<Vec<u8>, CryptoError> {
    let normalized = normalize_signature(raw);
    let bytes = hex::decode(&normalized[2..])
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    if bytes.len() != 65 {
        return Err(CryptoError::InvalidSignature(format!(
            "expected 65 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn keccak(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Score card digest computation and signer recovery
#[derive(Clone)]
pub struct ScoreCardCrypto {
    domain: EIP712Domain,
}

impl ScoreCardCrypto {
    pub fn new(domain: ScoreCardDomain) -> Self {
        let eip712_domain = EIP712Domain {
            name: Some(domain.name),
            version: Some(domain.version),
            chain_id: Some(domain.chain_id.into()),
            verifying_contract: Some(domain.verifying_contract),
            salt: None,
        };

        Self {
            domain: eip712_domain,
        }
    }

    /// Struct hash of a card issued to `user`
    pub fn struct_hash(&self, user: Address, card: &SignedScoreCard) -> [u8; 32] {
        let mut tokens = Vec::with_capacity(17);
        tokens.push(Token::FixedBytes(keccak(SCORE_CARD_TYPE.as_bytes()).to_vec()));
        tokens.push(Token::Address(user));
        tokens.extend(card.fields().iter().map(|v| Token::Uint(U256::from(*v))));
        keccak(&abi::encode(&tokens))
    }

    /// Final `\x19\x01 || domainSeparator || structHash` digest
    pub fn digest(&self, user: Address, card: &SignedScoreCard) -> H256 {
        let domain_separator = self.domain.separator();
        let struct_hash = self.struct_hash(user, card);
        let digest_input = [
            b"\x19\x01".as_slice(),
            domain_separator.as_slice(),
            struct_hash.as_slice(),
        ]
        .concat();
        H256::from(keccak(&digest_input))
    }

    /// Recover the address that signed `card` for `user`
    pub fn recover_signer(
        &self,
        user: Address,
        card: &SignedScoreCard,
    ) -> Result<Address, CryptoError> {
        let signature = Signature::from_str(&normalize_signature(&card.signature))
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        signature
            .recover(self.digest(user, card))
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }

    /// Check that `card` was issued by `expected`
    pub fn verify_signer(
        &self,
        user: Address,
        card: &SignedScoreCard,
        expected: Address,
    ) -> Result<(), CryptoError> {
        let recovered = self.recover_signer(user, card)?;
        if recovered != expected {
            return Err(CryptoError::UnexpectedSigner {
                expected,
                recovered,
            });
        }
        Ok(())
    }

    /// Sign `card` for `user` the way the backend signer does.
    ///
    /// Used by local tooling and tests; production cards come from the
    /// backend.
    pub fn sign_card(
        &self,
        wallet: &LocalWallet,
        user: Address,
        card: &SignedScoreCard,
    ) -> Result<String, CryptoError> {
        let signature = wallet
            .sign_hash(self.digest(user, card))
            .map_err(|e| CryptoError::SigningError(e.to_string()))?;
        Ok(format!("0x{}", hex::encode(signature.to_vec())))
    }
}
