//! Test helpers for Cadence.
//!
//! Provides a mock transaction with a fixed wire format, its codec, and a
//! deterministic state-transition function that meters gas and records how
//! often it was invoked.
//!
//! # Wire format
//!
//! ```text
//! [u16 sender_len][sender][u64 gas_limit][u32 payload_len][payload]
//! ```
//!
//! All integers are big-endian. Any bytes after the payload are a decode
//! error, so appending garbage to a valid transaction makes it undecodable.

use bytes::{Buf, BufMut};
use cadence_engine::{BlockContext, BranchedState, ExecutionError, StateTransition};
use cadence_types::{
    codes, BlockResponse, ConsensusParams, DecodeError, Event, Hash, Transaction, TxCodec,
    TxResult, ValidatorUpdate,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Actor the mock state-transition function writes under.
pub const MOCK_ACTOR: &[u8] = b"cookies";

/// Gas charged for every transaction.
pub const TX_BASE_GAS: u64 = 100;

/// Gas charged per payload byte.
pub const GAS_PER_BYTE: u64 = 1;

/// Encoded size of [`mock_tx`].
pub const MOCK_TX_SIZE: usize = 128;

/// Gas limit of [`mock_tx`].
pub const MOCK_TX_GAS: u64 = 100_000;

const HEADER_LEN: usize = 2 + 8 + 4;

/// A mock transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTx {
    sender: Vec<u8>,
    payload: Vec<u8>,
    gas_limit: u64,
    priority: u64,
    bytes: Vec<u8>,
    hash: Hash,
}

impl MockTx {
    /// Build and encode a transaction.
    pub fn new(sender: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>, gas_limit: u64) -> Self {
        let sender = sender.into();
        let payload = payload.into();

        let mut bytes = Vec::with_capacity(HEADER_LEN + sender.len() + payload.len());
        bytes.put_u16(sender.len() as u16);
        bytes.put_slice(&sender);
        bytes.put_u64(gas_limit);
        bytes.put_u32(payload.len() as u32);
        bytes.put_slice(&payload);

        let hash = Hash::from_bytes(&bytes);
        Self {
            sender,
            payload,
            gas_limit,
            priority: 0,
            bytes,
            hash,
        }
    }

    /// Set the mempool priority. Not part of the wire format.
    pub fn with_priority(mut self, priority: u64) -> Self {
        self.priority = priority;
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Gas this transaction consumes when executed.
    pub fn gas_cost(&self) -> u64 {
        TX_BASE_GAS + self.payload.len() as u64 * GAS_PER_BYTE
    }
}

impl Transaction for MockTx {
    fn hash(&self) -> Hash {
        self.hash
    }

    fn sender(&self) -> &[u8] {
        &self.sender
    }

    fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn priority(&self) -> u64 {
        self.priority
    }
}

/// The standard 128-byte transaction with a 100k gas limit.
pub fn mock_tx() -> MockTx {
    let payload_len = MOCK_TX_SIZE - HEADER_LEN - b"sender".len();
    MockTx::new("sender", vec![1u8; payload_len], MOCK_TX_GAS)
}

/// A transaction whose zero gas limit makes it run out of gas.
pub fn out_of_gas_tx() -> MockTx {
    MockTx::new("sender", b"payload".to_vec(), 0)
}

/// A numbered transaction, distinct from its siblings.
pub fn numbered_tx(n: u64, gas_limit: u64) -> MockTx {
    MockTx::new(format!("sender-{n}"), n.to_be_bytes().to_vec(), gas_limit)
}

/// Bytes of [`mock_tx`] with garbage appended, which fail to decode.
pub fn undecodable_tx_bytes() -> Vec<u8> {
    let mut bytes = mock_tx().bytes().to_vec();
    bytes.extend_from_slice(b"bad");
    bytes
}

/// Codec for [`MockTx`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MockTxCodec;

impl MockTxCodec {
    fn take(buf: &mut &[u8], len: usize) -> Result<Vec<u8>, DecodeError> {
        if buf.remaining() < len {
            return Err(DecodeError::Truncated {
                needed: len - buf.remaining(),
            });
        }
        let out = buf[..len].to_vec();
        buf.advance(len);
        Ok(out)
    }

    fn need(buf: &[u8], len: usize) -> Result<(), DecodeError> {
        if buf.remaining() < len {
            return Err(DecodeError::Truncated {
                needed: len - buf.remaining(),
            });
        }
        Ok(())
    }
}

impl TxCodec<MockTx> for MockTxCodec {
    fn decode(&self, bytes: &[u8]) -> Result<MockTx, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let mut buf = bytes;
        Self::need(buf, 2)?;
        let sender_len = buf.get_u16() as usize;
        let sender = Self::take(&mut buf, sender_len)?;
        Self::need(buf, 8)?;
        let gas_limit = buf.get_u64();
        Self::need(buf, 4)?;
        let payload_len = buf.get_u32() as usize;
        let payload = Self::take(&mut buf, payload_len)?;

        if buf.has_remaining() {
            return Err(DecodeError::TrailingBytes(buf.remaining()));
        }
        if sender.is_empty() {
            return Err(DecodeError::Malformed("empty sender".to_string()));
        }

        Ok(MockTx::new(sender, payload, gas_limit))
    }
}

/// Deterministic state-transition function for tests.
///
/// Each successful transaction writes `sender -> payload` under
/// [`MOCK_ACTOR`]. A transaction whose gas limit is below its cost fails with
/// [`codes::OUT_OF_GAS`] and leaves no writes.
#[derive(Debug, Default)]
pub struct MockStf {
    calls: AtomicUsize,
    fail_with: Mutex<Option<String>>,
    delay: Option<Duration>,
    validator_updates: Vec<ValidatorUpdate>,
    param_updates: Mutex<Option<ConsensusParams>>,
}

impl MockStf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every block with `message`.
    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.fail_with.lock() = Some(message.into());
        self
    }

    /// Stop failing blocks.
    pub fn clear_failure(&self) {
        *self.fail_with.lock() = None;
    }

    /// Hold every block for `delay`, honouring cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Return these validator updates from every block.
    pub fn with_validator_updates(mut self, updates: Vec<ValidatorUpdate>) -> Self {
        self.validator_updates = updates;
        self
    }

    /// Return `params` as a param update from the next block.
    pub fn schedule_param_update(&self, params: ConsensusParams) {
        *self.param_updates.lock() = Some(params);
    }

    /// Number of `deliver_block` invocations so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn run_tx(&self, tx: &MockTx, gas_limit: u64, state: &mut BranchedState) -> TxResult {
        let cost = tx.gas_cost();
        if cost > gas_limit {
            return TxResult {
                code: codes::OUT_OF_GAS,
                codespace: "sdk".to_string(),
                log: format!("out of gas: limit {gas_limit}, needed {cost}"),
                gas_wanted: tx.gas_limit(),
                gas_used: gas_limit,
                ..Default::default()
            };
        }

        let mut tx_state = state.clone();
        tx_state.set(MOCK_ACTOR, tx.sender().to_vec(), tx.payload().to_vec());
        *state = tx_state;

        TxResult {
            events: vec![Event::new("message")
                .with_attribute("sender", String::from_utf8_lossy(tx.sender()).into_owned())],
            ..TxResult::ok(tx.gas_limit(), cost)
        }
    }

    fn hold(&self, ctx: &BlockContext) -> Result<(), ExecutionError> {
        let Some(delay) = self.delay else {
            return Ok(());
        };
        let deadline = Instant::now() + delay;
        while Instant::now() < deadline {
            if ctx.is_cancelled() {
                return Err(ctx.cancelled());
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }
}

impl StateTransition<MockTx> for MockStf {
    fn init_genesis(
        &self,
        _ctx: &BlockContext,
        app_state: &[u8],
        state: &mut BranchedState,
    ) -> Result<Vec<ValidatorUpdate>, ExecutionError> {
        if !app_state.is_empty() {
            state.set(MOCK_ACTOR, b"genesis".to_vec(), app_state.to_vec());
        }
        Ok(self.validator_updates.clone())
    }

    fn deliver_block(
        &self,
        ctx: &BlockContext,
        txs: &[MockTx],
        state: &mut BranchedState,
    ) -> Result<BlockResponse, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hold(ctx)?;

        if let Some(message) = self.fail_with.lock().clone() {
            return Err(ExecutionError::Execution(message));
        }

        let mut tx_results = Vec::with_capacity(txs.len());
        for tx in txs {
            if ctx.is_cancelled() {
                return Err(ctx.cancelled());
            }
            tx_results.push(self.run_tx(tx, tx.gas_limit(), state));
        }

        Ok(BlockResponse {
            tx_results,
            events: vec![Event::new("end_block").with_attribute("height", ctx.height.to_string())],
            validator_updates: self.validator_updates.clone(),
            consensus_param_updates: self.param_updates.lock().take(),
        })
    }

    fn validate_tx(&self, tx: &MockTx, gas_limit: u64, state: &mut BranchedState) -> TxResult {
        self.run_tx(tx, tx.gas_limit().min(gas_limit), state)
    }

    fn simulate(&self, tx: &MockTx, gas_limit: u64, state: &mut BranchedState) -> TxResult {
        self.run_tx(tx, tx.gas_limit().min(gas_limit), state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_engine::StateSnapshot;

    #[test]
    fn test_mock_tx_is_128_bytes() {
        let tx = mock_tx();
        assert_eq!(tx.bytes().len(), MOCK_TX_SIZE);
        assert_eq!(tx.gas_limit(), MOCK_TX_GAS);
    }

    #[test]
    fn test_codec_roundtrip_and_rejections() {
        let codec = MockTxCodec;
        let tx = mock_tx();
        assert_eq!(codec.decode(tx.bytes()).unwrap(), tx);

        assert_eq!(codec.decode(&[]), Err(DecodeError::Empty));
        assert_eq!(
            codec.decode(&undecodable_tx_bytes()),
            Err(DecodeError::TrailingBytes(3))
        );
        assert!(matches!(
            codec.decode(&tx.bytes()[..20]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_out_of_gas_leaves_no_writes() {
        let stf = MockStf::new();
        let mut state = BranchedState::new(StateSnapshot::empty());

        let result = stf.validate_tx(&out_of_gas_tx(), 1_000_000, &mut state);
        assert_eq!(result.code, codes::OUT_OF_GAS);
        assert!(!state.is_dirty());

        let result = stf.validate_tx(&mock_tx(), 1_000_000, &mut state);
        assert!(result.is_ok());
        assert!(state.contains(MOCK_ACTOR, b"sender"));
    }
}
