//! The transaction-processing servant and its façade.

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use super::ActiveProxy;
use crate::consts::{DEFAULT_PROCESSING_TIME, format_number};
use crate::invocation::{Pending, Priority};
use crate::scheduler::Scheduler;

/// Record of one processed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_id: String,
    pub amount: u64,
    /// 1-based position in processing order.
    pub position: usize,
}

impl Receipt {
    pub fn message(&self) -> String {
        format!(
            "Transaction {} completed for ${}.",
            self.transaction_id,
            format_number(self.amount)
        )
    }
}

/// Servant: processes transactions one at a time and keeps a ledger.
#[derive(Debug)]
pub struct TransactionProcessor {
    processing_time: Duration,
    ledger: Vec<Receipt>,
}

impl Default for TransactionProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESSING_TIME)
    }
}

impl TransactionProcessor {
    /// `processing_time` is simulated work per transaction.
    pub fn new(processing_time: Duration) -> Self {
        Self {
            processing_time,
            ledger: Vec::new(),
        }
    }

    pub fn process_transaction(&mut self, transaction_id: &str, amount: u64) -> Result<String> {
        if amount == 0 {
            bail!("transaction {transaction_id} has no amount");
        }
        if self
            .ledger
            .iter()
            .any(|r| r.transaction_id == transaction_id)
        {
            bail!("transaction {transaction_id} was already processed");
        }

        tracing::info!(transaction_id, amount, "processing transaction");
        if !self.processing_time.is_zero() {
            thread::sleep(self.processing_time);
        }

        let receipt = Receipt {
            transaction_id: transaction_id.to_string(),
            amount,
            position: self.ledger.len() + 1,
        };
        let message = receipt.message();
        self.ledger.push(receipt);
        Ok(message)
    }

    pub fn processed_count(&self) -> usize {
        self.ledger.len()
    }

    pub fn ledger(&self) -> &[Receipt] {
        &self.ledger
    }
}

/// A transaction to submit, as given on the command line:
/// `ID:AMOUNT[:PRIORITY]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub id: String,
    pub amount: u64,
    pub priority: Priority,
}

impl TransactionRequest {
    pub fn new(id: impl Into<String>, amount: u64, priority: impl Into<Priority>) -> Self {
        Self {
            id: id.into(),
            amount,
            priority: priority.into(),
        }
    }
}

impl FromStr for TransactionRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let id = parts.next().map(str::trim).unwrap_or_default();
        if id.is_empty() {
            return Err(format!("missing transaction id in `{s}`"));
        }
        let amount = parts
            .next()
            .ok_or_else(|| format!("missing amount in `{s}` (expected ID:AMOUNT[:PRIORITY])"))?
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid amount in `{s}`: {e}"))?;
        let priority = match parts.next() {
            Some(p) => p
                .trim()
                .parse::<i32>()
                .map_err(|e| format!("invalid priority in `{s}`: {e}"))?,
            None => Priority::DEFAULT.value(),
        };
        if parts.next().is_some() {
            return Err(format!("too many fields in `{s}`"));
        }
        Ok(Self::new(id, amount, priority))
    }
}

impl fmt::Display for TransactionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.id, self.amount, self.priority)
    }
}

/// Façade over a [`TransactionProcessor`]. Every method returns at once.
#[derive(Debug, Clone)]
pub struct TransactionProxy {
    inner: ActiveProxy<TransactionProcessor>,
}

impl TransactionProxy {
    pub fn new(scheduler: Scheduler, processor: TransactionProcessor) -> Self {
        Self {
            inner: ActiveProxy::new(scheduler, processor),
        }
    }

    pub fn process_transaction(
        &self,
        transaction_id: impl Into<String>,
        amount: u64,
    ) -> Pending<String> {
        self.process_transaction_with_priority(transaction_id, amount, Priority::DEFAULT)
    }

    pub fn process_transaction_with_priority(
        &self,
        transaction_id: impl Into<String>,
        amount: u64,
        priority: impl Into<Priority>,
    ) -> Pending<String> {
        let transaction_id = transaction_id.into();
        self.inner
            .call_with_priority("process_transaction", priority, move |processor| {
                processor.process_transaction(&transaction_id, amount)
            })
    }

    pub fn submit(&self, request: &TransactionRequest) -> Pending<String> {
        self.process_transaction_with_priority(request.id.clone(), request.amount, request.priority)
    }

    pub fn processed_count(&self) -> Pending<usize> {
        self.inner.call("processed_count", |processor| Ok(processor.processed_count()))
    }

    /// Receipts in processing order.
    pub fn ledger(&self) -> Pending<Vec<Receipt>> {
        self.inner.call("ledger", |processor| Ok(processor.ledger().to_vec()))
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.inner.scheduler()
    }
}
