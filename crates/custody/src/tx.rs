use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_rlp::{BufMut, Decodable, EMPTY_STRING_CODE, Encodable, Header, length_of_length};

use crate::error::SignerError;
use crate::signing::RecoverableSignature;

/// Pre-EIP-2718 transaction, the nine field RLP list. Unsigned payloads
/// carry zero `v`, `r` and `s`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    /// `None` creates a contract and encodes as the empty string.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub v: U256,
    pub r: U256,
    pub s: U256,
}

impl LegacyTransaction {
    fn to_length(&self) -> usize {
        match self.to {
            Some(to) => to.length(),
            None => 1,
        }
    }

    fn encode_to(&self, out: &mut dyn BufMut) {
        match self.to {
            Some(to) => to.encode(out),
            None => out.put_u8(EMPTY_STRING_CODE),
        }
    }

    fn fields_len(&self) -> usize {
        self.nonce.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + self.to_length()
            + self.value.length()
            + self.data.length()
            + self.v.length()
            + self.r.length()
            + self.s.length()
    }

    fn encode_fields(&self, out: &mut dyn BufMut) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        self.encode_to(out);
        self.value.encode(out);
        self.data.encode(out);
        self.v.encode(out);
        self.r.encode(out);
        self.s.encode(out);
    }

    /// Keccak-256 digest the sender signs, per EIP-155: the unsigned
    /// fields followed by `(chain_id, 0, 0)`.
    pub fn signing_hash(&self, chain_id: U256) -> B256 {
        let payload_length = self.nonce.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + self.to_length()
            + self.value.length()
            + self.data.length()
            + chain_id.length()
            + 2;
        let mut out = Vec::with_capacity(payload_length + length_of_length(payload_length));
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.nonce.encode(&mut out);
        self.gas_price.encode(&mut out);
        self.gas_limit.encode(&mut out);
        self.encode_to(&mut out);
        self.value.encode(&mut out);
        self.data.encode(&mut out);
        chain_id.encode(&mut out);
        0u8.encode(&mut out);
        0u8.encode(&mut out);
        keccak256(&out)
    }

    /// Copy of the transaction carrying the EIP-155 encoded signature.
    pub fn with_signature(&self, signature: &RecoverableSignature, chain_id: U256) -> Self {
        let mut tx = self.clone();
        tx.v = signature.v_eip155(chain_id);
        tx.r = U256::from_be_slice(signature.r_bytes());
        tx.s = U256::from_be_slice(signature.s_bytes());
        tx
    }

    pub fn encoded(&self) -> Vec<u8> {
        alloy_rlp::encode(self)
    }

    /// Decodes a transaction that must span the whole payload. Trailing
    /// bytes mean a corrupt or concatenated payload and are rejected.
    pub fn decode_payload(mut payload: &[u8]) -> Result<Self, SignerError> {
        let buf = &mut payload;
        let tx =
            Self::decode(buf).map_err(|err| SignerError::InvalidTransaction(err.to_string()))?;
        if !buf.is_empty() {
            return Err(SignerError::InvalidTransaction(format!(
                "{} trailing bytes after transaction list",
                buf.len()
            )));
        }
        Ok(tx)
    }
}

impl Encodable for LegacyTransaction {
    fn encode(&self, out: &mut dyn BufMut) {
        Header {
            list: true,
            payload_length: self.fields_len(),
        }
        .encode(out);
        self.encode_fields(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.fields_len();
        payload_length + length_of_length(payload_length)
    }
}

impl Decodable for LegacyTransaction {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString);
        }
        let remaining = buf.len();
        let tx = Self {
            nonce: Decodable::decode(buf)?,
            gas_price: Decodable::decode(buf)?,
            gas_limit: Decodable::decode(buf)?,
            to: decode_to(buf)?,
            value: Decodable::decode(buf)?,
            data: Decodable::decode(buf)?,
            v: Decodable::decode(buf)?,
            r: Decodable::decode(buf)?,
            s: Decodable::decode(buf)?,
        };
        let consumed = remaining - buf.len();
        if consumed != header.payload_length {
            return Err(alloy_rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: consumed,
            });
        }
        Ok(tx)
    }
}

fn decode_to(buf: &mut &[u8]) -> alloy_rlp::Result<Option<Address>> {
    match buf.first() {
        Some(&EMPTY_STRING_CODE) => {
            *buf = &buf[1..];
            Ok(None)
        }
        _ => Ok(Some(Address::decode(buf)?)),
    }
}

/// Strips an optional `0x` prefix and decodes the hex text callers put on
/// the wire.
pub fn decode_hex_payload(text: &str) -> Result<Vec<u8>, SignerError> {
    let trimmed = text.trim();
    let bare = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(bare).map_err(|err| SignerError::InvalidTransaction(err.to_string()))
}
