//! Shared submission helper. When a chain is configured with a
//! scoped-execution wallet the prepared call is rewrapped through the roles
//! module; otherwise it goes out as-is.

use alloy_primitives::{Bytes, U256};
use mark_bridge_rs::evm;
use mark_rs::{
    chain::{ChainError, ChainService},
    config::{Config, ScopedExecutionConfig},
    types::{SubmittedTransaction, TransactionRequest},
};
use std::sync::Arc;

const EXEC_WITH_ROLE_SIGNATURE: &str =
    "execTransactionWithRole(address,uint256,bytes,uint8,bytes32,bool)";

#[derive(Clone)]
pub struct TransactionSubmitter {
    config: Arc<Config>,
    chain: Arc<dyn ChainService>,
}

impl TransactionSubmitter {
    pub fn new(config: Arc<Config>, chain: Arc<dyn ChainService>) -> Self {
        Self { config, chain }
    }

    /// Submit a prepared transaction on `chain_id` and wait for its receipt.
    /// Chain-service failure kinds propagate unchanged.
    pub async fn submit(
        &self,
        chain_id: u64,
        request: TransactionRequest,
    ) -> Result<SubmittedTransaction, ChainError> {
        let request = match self
            .config
            .chain(chain_id)
            .and_then(|chain| chain.scoped_execution.as_ref())
        {
            Some(scoped) => rewrap_scoped(scoped, request),
            None => request,
        };
        tracing::debug!(chain_id, to = %request.to, func_sig = ?request.func_sig, "submitting");
        self.chain.submit_and_monitor(chain_id, request).await
    }
}

/// Re-dispatch a call through the scoped-execution module under the
/// configured role. `operation` 0 is a plain CALL.
fn rewrap_scoped(scoped: &ScopedExecutionConfig, request: TransactionRequest) -> TransactionRequest {
    let data = encode_exec_with_role(scoped, &request);
    TransactionRequest {
        to: scoped.module,
        data,
        value: U256::ZERO,
        from: request.from,
        func_sig: Some(EXEC_WITH_ROLE_SIGNATURE.to_string()),
    }
}

fn encode_exec_with_role(scoped: &ScopedExecutionConfig, request: &TransactionRequest) -> Bytes {
    let inner = &request.data;
    let padded_len = inner.len().div_ceil(32) * 32;
    let mut data = Vec::with_capacity(4 + 7 * 32 + padded_len);
    data.extend_from_slice(&evm::selector(EXEC_WITH_ROLE_SIGNATURE));
    data.extend_from_slice(evm::address_word(request.to).as_slice());
    data.extend_from_slice(evm::amount_word(request.value).as_slice());
    // offset of the dynamic `bytes` argument within the argument block
    data.extend_from_slice(evm::amount_word(U256::from(6 * 32)).as_slice());
    data.extend_from_slice(evm::amount_word(U256::ZERO).as_slice());
    data.extend_from_slice(scoped.role.as_slice());
    data.extend_from_slice(evm::amount_word(U256::from(1)).as_slice());
    data.extend_from_slice(evm::amount_word(U256::from(inner.len())).as_slice());
    data.extend_from_slice(inner);
    data.resize(4 + 7 * 32 + padded_len, 0);
    data.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};

    #[test]
    fn rewrap_targets_the_module_and_embeds_the_call() {
        let scoped = ScopedExecutionConfig {
            module: Address::repeat_byte(0x11),
            role: B256::repeat_byte(0x22),
            safe: Address::repeat_byte(0x33),
        };
        let inner = TransactionRequest {
            to: Address::repeat_byte(0x44),
            data: vec![0xde, 0xad, 0xbe, 0xef].into(),
            value: U256::from(7),
            from: None,
            func_sig: Some("deposit()".to_string()),
        };
        let wrapped = rewrap_scoped(&scoped, inner.clone());
        assert_eq!(wrapped.to, scoped.module);
        assert_eq!(wrapped.value, U256::ZERO);
        assert_eq!(&wrapped.data[..4], &evm::selector(EXEC_WITH_ROLE_SIGNATURE));
        // target address sits in the first argument word
        assert_eq!(&wrapped.data[16..36], inner.to.as_slice());
        // role key rides in the fifth argument word
        assert_eq!(&wrapped.data[4 + 4 * 32..4 + 5 * 32], scoped.role.as_slice());
        // the inner calldata is carried in the dynamic tail
        let tail = &wrapped.data[4 + 7 * 32..];
        assert_eq!(&tail[..4], &[0xde, 0xad, 0xbe, 0xef]);
    }
}
