//! In-memory ledger emulating a CTF setup contract and its vulnerable wallet

#![allow(dead_code)]

pub mod explorer;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_dyn_abi::DynSolValue;
use anyhow::{bail, Result};

use pry::config;
use pry::infrastructure::{LedgerClient, Receipt};
use pry::runner::{ExploitPlan, Finality};

pub const GAS_USED: u64 = 30_000;
pub const GAS_PRICE: u128 = 1_000_000_000;

/// ERC-20 contract the caller holds a balance of
pub const TOKEN: Address = Address::repeat_byte(0x70);
pub const TOKEN_DECIMALS: u8 = 6;

pub fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(1_000_000_000_000_000_000u128)
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// How the wallet guards `setOwner()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimGuard {
    /// Anyone may claim (the vulnerability)
    Open,
    /// The node refuses the transaction during gas estimation
    RejectOnEstimate,
    /// The transaction is mined and reverts
    RevertOnChain,
}

/// Everything the ledger saw, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Call { to: Address, selector: [u8; 4] },
    Send { to: Address, selector: [u8; 4], tx_hash: B256 },
    ReceiptPoll { tx_hash: B256, found: bool },
    Balance(Address),
    Storage(Address, U256),
}

pub struct Scenario {
    pub setup: Address,
    pub wallet: Address,
    pub caller: Address,
    pub wallet_balance: U256,
    pub caller_balance: U256,
    pub guard: ClaimGuard,
    /// Number of polls before a receipt becomes visible
    pub receipt_delay_polls: u32,
    pub never_finalize: bool,
    /// Successful balance reads before every further one fails
    pub fail_balance_after: Option<u32>,
    pub fail_storage: bool,
    /// Receipt queries error instead of answering
    pub receipt_lookup_error: bool,
    /// `isSolved()` answers with empty return data
    pub solved_returns_empty: bool,
    /// Caller's balance of [`TOKEN`], in base units
    pub token_balance: U256,
    /// Whether [`TOKEN`] implements `decimals()` and `symbol()`
    pub token_metadata: bool,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            setup: Address::repeat_byte(0x5e),
            wallet: Address::repeat_byte(0x3a),
            caller: Address::repeat_byte(0xca),
            wallet_balance: ether(10),
            caller_balance: ether(1),
            guard: ClaimGuard::Open,
            receipt_delay_polls: 0,
            never_finalize: false,
            fail_balance_after: None,
            fail_storage: false,
            receipt_lookup_error: false,
            solved_returns_empty: false,
            token_balance: U256::from(2_500_000u64),
            token_metadata: true,
        }
    }
}

struct State {
    balances: HashMap<Address, U256>,
    owner: Address,
    nonce: u64,
    block: u64,
    balance_reads: u32,
    receipts: HashMap<B256, (Receipt, u32)>,
    events: Vec<Event>,
}

pub struct MockLedger {
    scenario: Scenario,
    state: Mutex<State>,
}

impl MockLedger {
    pub fn new(scenario: Scenario) -> Self {
        let mut balances = HashMap::new();
        balances.insert(scenario.wallet, scenario.wallet_balance);
        balances.insert(scenario.caller, scenario.caller_balance);
        Self {
            scenario,
            state: Mutex::new(State {
                balances,
                owner: Address::ZERO,
                nonce: 0,
                block: 100,
                balance_reads: 0,
                receipts: HashMap::new(),
                events: Vec::new(),
            }),
        }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn balance(&self, address: Address) -> U256 {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    pub fn owner(&self) -> Address {
        self.state.lock().unwrap().owner
    }

    /// Hashes of every submitted write, in submission order
    pub fn sent(&self) -> Vec<([u8; 4], B256)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Send { selector, tx_hash, .. } => Some((selector, tx_hash)),
                _ => None,
            })
            .collect()
    }

    /// Plan matching this scenario, with fast finalization polling
    pub fn plan(&self) -> ExploitPlan {
        let config = config::parse("").unwrap();
        let setup = self.scenario.setup.to_string();
        let mut plan = ExploitPlan::from_config(&config, Some(setup.as_str())).unwrap();
        plan.finality =
            Finality::new(Duration::from_millis(200), Duration::from_millis(5)).unwrap();
        plan
    }

    fn execute(&self, state: &mut State, to: Address, input: &[u8]) -> bool {
        let sc = &self.scenario;
        if to != sc.wallet || input.len() < 4 {
            return false;
        }
        let sel = [input[0], input[1], input[2], input[3]];

        if sel == selector("setOwner()") {
            if sc.guard != ClaimGuard::Open {
                return false;
            }
            state.owner = sc.caller;
            true
        } else if sel == selector("withdraw(address)") {
            if state.owner != sc.caller || input.len() < 36 {
                return false;
            }
            let recipient = Address::from_slice(&input[16..36]);
            let amount = state.balances.insert(sc.wallet, U256::ZERO).unwrap_or_default();
            *state.balances.entry(recipient).or_default() += amount;
            true
        } else {
            false
        }
    }
}

impl MockLedger {
    fn token_call(&self, sel: [u8; 4], input: &[u8]) -> Result<Bytes> {
        let sc = &self.scenario;
        if sel == selector("balanceOf(address)") && input.len() >= 36 {
            let holder = Address::from_slice(&input[16..36]);
            let amount = if holder == sc.caller { sc.token_balance } else { U256::ZERO };
            return Ok(DynSolValue::Uint(amount, 256).abi_encode().into());
        }
        if sc.token_metadata {
            if sel == selector("decimals()") {
                return Ok(DynSolValue::Uint(U256::from(TOKEN_DECIMALS), 8).abi_encode().into());
            }
            if sel == selector("symbol()") {
                return Ok(DynSolValue::Tuple(vec![DynSolValue::String("TKN".into())])
                    .abi_encode_params()
                    .into());
            }
        }
        bail!("execution reverted: unknown selector 0x{}", hex::encode(sel))
    }
}

#[async_trait::async_trait]
impl LedgerClient for MockLedger {
    fn identity(&self) -> Option<Address> {
        Some(self.scenario.caller)
    }

    fn endpoint_name(&self) -> String {
        "mock".to_string()
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(31337)
    }

    async fn get_balance(&self, address: Address) -> Result<U256> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Balance(address));
        let reads = state.balance_reads;
        state.balance_reads += 1;
        if self.scenario.fail_balance_after.is_some_and(|limit| reads >= limit) {
            bail!("connection reset while reading balance of {}", address);
        }
        Ok(state.balances.get(&address).copied().unwrap_or_default())
    }

    async fn get_storage_at(&self, address: Address, slot: U256) -> Result<B256> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Storage(address, slot));
        if self.scenario.fail_storage {
            bail!("missing trie node for {}", address);
        }
        if address == self.scenario.wallet && slot.is_zero() {
            Ok(state.owner.into_word())
        } else {
            Ok(B256::ZERO)
        }
    }

    async fn get_code(&self, address: Address) -> Result<Bytes> {
        if address == self.scenario.wallet || address == self.scenario.setup || address == TOKEN {
            Ok(Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52]))
        } else {
            Ok(Bytes::new())
        }
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64> {
        let state = self.state.lock().unwrap();
        Ok(if address == self.scenario.caller { state.nonce } else { 0 })
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes> {
        let mut state = self.state.lock().unwrap();
        if input.len() < 4 {
            bail!("execution reverted: calldata too short");
        }
        let sel = [input[0], input[1], input[2], input[3]];
        state.events.push(Event::Call { to, selector: sel });

        if to == TOKEN {
            return self.token_call(sel, &input);
        }
        if to != self.scenario.setup {
            bail!("execution reverted: no code at {}", to);
        }
        if sel == selector("wallet()") {
            Ok(DynSolValue::Address(self.scenario.wallet).abi_encode().into())
        } else if sel == selector("isSolved()") {
            if self.scenario.solved_returns_empty {
                return Ok(Bytes::new());
            }
            let drained = state
                .balances
                .get(&self.scenario.wallet)
                .copied()
                .unwrap_or_default()
                .is_zero();
            Ok(DynSolValue::Bool(drained).abi_encode().into())
        } else {
            bail!("execution reverted: unknown selector 0x{}", hex::encode(sel))
        }
    }

    async fn send_transaction(&self, to: Address, input: Bytes) -> Result<B256> {
        let mut state = self.state.lock().unwrap();
        if input.len() < 4 {
            bail!("execution reverted: calldata too short");
        }
        let sel = [input[0], input[1], input[2], input[3]];

        if sel == selector("setOwner()") && self.scenario.guard == ClaimGuard::RejectOnEstimate {
            bail!("server returned an error response: error code 3: execution reverted: not owner");
        }

        let nonce = state.nonce;
        state.nonce += 1;
        let mut seed = self.scenario.caller.to_vec();
        seed.extend_from_slice(&nonce.to_be_bytes());
        let tx_hash = keccak256(&seed);
        state.events.push(Event::Send {
            to,
            selector: sel,
            tx_hash,
        });

        let success = self.execute(&mut state, to, &input);
        let fee = U256::from(GAS_USED) * U256::from(GAS_PRICE);
        let caller = self.scenario.caller;
        let entry = state.balances.entry(caller).or_default();
        *entry = entry.saturating_sub(fee);

        state.block += 1;
        let receipt = Receipt {
            tx_hash,
            block_number: Some(state.block),
            from: caller,
            to: Some(to),
            gas_used: GAS_USED,
            effective_gas_price: GAS_PRICE,
            success,
        };
        let delay = self.scenario.receipt_delay_polls;
        state.receipts.insert(tx_hash, (receipt, delay));
        Ok(tx_hash)
    }

    async fn get_receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        let mut state = self.state.lock().unwrap();
        if self.scenario.receipt_lookup_error {
            state.events.push(Event::ReceiptPoll {
                tx_hash: hash,
                found: false,
            });
            bail!("server returned an error response: error code -32000: header not found");
        }
        let never = self.scenario.never_finalize;
        let found = match state.receipts.get_mut(&hash) {
            Some(_) if never => None,
            Some((_, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                None
            }
            Some((receipt, _)) => Some(receipt.clone()),
            None => None,
        };
        state.events.push(Event::ReceiptPoll {
            tx_hash: hash,
            found: found.is_some(),
        });
        Ok(found)
    }
}
