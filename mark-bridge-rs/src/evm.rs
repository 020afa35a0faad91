//! Hand-rolled calldata builders for the handful of fixed-shape calls the
//! adapters make. Arguments are pre-encoded 32-byte words.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn address_word(address: Address) -> B256 {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_slice());
    B256::from(word)
}

pub fn amount_word(amount: U256) -> B256 {
    B256::from(amount.to_be_bytes::<32>())
}

pub fn u64_word(value: u64) -> B256 {
    amount_word(U256::from(value))
}

/// `selector ++ words`, the layout of every static call the adapters issue.
pub fn encode_call(signature: &str, words: &[B256]) -> Bytes {
    let mut data = Vec::with_capacity(4 + 32 * words.len());
    data.extend_from_slice(&selector(signature));
    for word in words {
        data.extend_from_slice(word.as_slice());
    }
    data.into()
}

/// Encode a call taking exactly two dynamic `bytes` arguments.
pub fn encode_two_bytes_call(signature: &str, first: &[u8], second: &[u8]) -> Bytes {
    fn padded(data: &[u8]) -> Vec<u8> {
        let mut out = amount_word(U256::from(data.len())).to_vec();
        out.extend_from_slice(data);
        out.resize(32 + data.len().div_ceil(32) * 32, 0);
        out
    }
    let first = padded(first);
    let second = padded(second);
    let mut data = Vec::with_capacity(4 + 64 + first.len() + second.len());
    data.extend_from_slice(&selector(signature));
    data.extend_from_slice(amount_word(U256::from(64)).as_slice());
    data.extend_from_slice(amount_word(U256::from(64 + first.len())).as_slice());
    data.extend_from_slice(&first);
    data.extend_from_slice(&second);
    data.into()
}

pub fn erc20_approve(spender: Address, amount: U256) -> Bytes {
    encode_call("approve(address,uint256)", &[address_word(spender), amount_word(amount)])
}

/// Wrapped-native `deposit()`; the native amount rides in the tx value.
pub fn wrapped_native_deposit() -> Bytes {
    selector("deposit()").to_vec().into()
}

pub fn wrapped_native_withdraw(amount: U256) -> Bytes {
    encode_call("withdraw(uint256)", &[amount_word(amount)])
}
